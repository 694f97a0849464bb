//! HTTP routers.
//!
//! The metadata router serves `/`, `/{version}`, and `/{version}/{path…}`
//! with content-negotiated bodies and the long-poll query. The reload
//! router is a separate loopback surface exposing `POST /v1/reload`.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::{debug, info};

use hostmeta_answers::LATEST_TAG;

use crate::content::{negotiate, respond_error, respond_success};
use crate::state::AppState;

/// Build the metadata lookup router.
pub fn build_metadata_router(state: AppState) -> Router {
    Router::new()
        .route("/favicon.ico", get(|| async { StatusCode::NOT_FOUND }))
        .route("/", get(root))
        .route("/{version}", get(version_root))
        .route("/{version}/{*path}", get(metadata))
        .with_state(state)
}

/// Build the loopback reload router.
pub fn build_reload_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/reload", post(reload))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LookupQuery {
    /// Block until the value changes.
    wait: bool,
    /// The value the client already has, in its string form.
    value: String,
    /// Long-poll cap in seconds.
    max_wait: u64,
}

/// `GET /` — known version tags and their URLs; `latest` always listed.
async fn root(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let snapshot = state.controller.snapshot();

    let mut listing = serde_json::Map::new();
    for tag in snapshot.tags() {
        listing.insert(tag.to_string(), serde_json::Value::String(format!("/{tag}")));
    }
    listing
        .entry(LATEST_TAG.to_string())
        .or_insert_with(|| serde_json::Value::String(format!("/{LATEST_TAG}")));

    respond_success(negotiate(&headers), &serde_json::Value::Object(listing))
}

/// `GET /{version}` — the root of that version's tree.
async fn version_root(
    state: State<AppState>,
    Path(version): Path<String>,
    query: Query<LookupQuery>,
    peer: PeerAddr,
    headers: HeaderMap,
) -> Response {
    lookup(state, version, String::new(), query, peer, headers).await
}

/// `GET /{version}/{path…}`.
async fn metadata(
    state: State<AppState>,
    Path((version, path)): Path<(String, String)>,
    query: Query<LookupQuery>,
    peer: PeerAddr,
    headers: HeaderMap,
) -> Response {
    lookup(state, version, path, query, peer, headers).await
}

async fn lookup(
    State(state): State<AppState>,
    version: String,
    path: String,
    Query(query): Query<LookupQuery>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
) -> Response {
    let content = negotiate(&headers);
    let client = client_ip(&state, &headers, peer);

    let snapshot = state.controller.snapshot();
    let Some(version) = snapshot.resolve_tag(&version).map(str::to_string) else {
        return respond_error(content, "Invalid version", StatusCode::NOT_FOUND);
    };

    let segments: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    let display_path = format!("/{}", segments.join("/"));
    debug!(%version, %client, "searching for {display_path}");

    let value = state
        .controller
        .lookup_answer(
            query.wait,
            &query.value,
            &version,
            &client,
            &segments,
            Duration::from_secs(query.max_wait),
        )
        .await;

    match value {
        Some(value) => {
            info!(%version, %client, "OK: {display_path}");
            respond_success(content, &value)
        }
        None => {
            info!(%version, %client, "not found: {display_path}");
            respond_error(content, "Not found", StatusCode::NOT_FOUND)
        }
    }
}

/// `POST /v1/reload` — reload the local sources.
async fn reload(State(state): State<AppState>) -> Response {
    info!("reload requested");
    match state.controller.reload_local() {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// The TCP peer, when the listener was built with connect info.
struct PeerAddr(Option<SocketAddr>);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for PeerAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

/// The caller's identity: `X-Forwarded-For` when enabled, else the TCP
/// peer address.
fn client_ip(state: &AppState, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if state.xff {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
        {
            if !forwarded.is_empty() {
                return forwarded.to_string();
            }
        }
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
