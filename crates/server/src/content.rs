//! Content negotiation and response rendering.
//!
//! Bodies are negotiated from `Accept` with plain text as the preferred
//! (and default) offer. The text form renders one line per child for
//! interior nodes so shell clients can walk the tree with nothing but
//! HTTP and string splitting:
//!
//! ```text
//! $ curl host/2016-07-29/self/container
//! name
//! ports/
//! $ curl host/2016-07-29/containers
//! 0=web-1
//! 1=web-2
//! ```

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Number, Value};

use hostmeta_answers::MAGIC_LOOKUP_KEYS;

/// Response body formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
    Json,
    Yaml,
}

/// Negotiate the body format from the `Accept` header.
///
/// Plain text wins ties and is the fallback for absent or unrecognized
/// headers.
pub fn negotiate(headers: &HeaderMap) -> ContentType {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let mut best = ContentType::Text;
    let mut best_q = -1.0f32;

    for entry in accept.split(',') {
        let mut parts = entry.split(';');
        let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let quality = parts
            .filter_map(|param| param.trim().strip_prefix("q="))
            .find_map(|q| q.parse::<f32>().ok())
            .unwrap_or(1.0);

        // q=0 marks a media type as not acceptable.
        if quality <= 0.0 {
            continue;
        }

        let offer = match media.as_str() {
            "text/plain" | "text/*" | "*/*" => ContentType::Text,
            "application/json" => ContentType::Json,
            "application/yaml" | "application/x-yaml" | "text/yaml" | "text/x-yaml" => {
                ContentType::Yaml
            }
            _ => continue,
        };

        if quality > best_q || (quality == best_q && offer == ContentType::Text) {
            best = offer;
            best_q = quality;
        }
    }

    best
}

/// Render a success body in the negotiated format, with the CORS header
/// every metadata response carries.
pub fn respond_success(content: ContentType, value: &Value) -> Response {
    let response = match content {
        ContentType::Text => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            render_text(value),
        )
            .into_response(),
        ContentType::Json => match serde_json::to_string(value) {
            Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
            Err(err) => respond_error(
                content,
                &format!("Error serializing to JSON: {err}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        },
        ContentType::Yaml => match serde_yaml::to_string(value) {
            Ok(body) => ([(header::CONTENT_TYPE, "application/yaml")], body).into_response(),
            Err(err) => respond_error(
                content,
                &format!("Error serializing to YAML: {err}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        },
    };
    with_cors(response)
}

/// Render the typed error body `{message, type, code}` in the negotiated
/// format.
pub fn respond_error(content: ContentType, message: &str, status: StatusCode) -> Response {
    let response = match content {
        ContentType::Text => (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{message}\n"),
        )
            .into_response(),
        ContentType::Json | ContentType::Yaml => {
            let body = json!({
                "message": message,
                "type": "error",
                "code": status.as_u16(),
            });
            let (mime, rendered) = if content == ContentType::Json {
                ("application/json", body.to_string())
            } else {
                (
                    "application/yaml",
                    serde_yaml::to_string(&body).unwrap_or_default(),
                )
            };
            (status, [(header::CONTENT_TYPE, mime)], rendered).into_response()
        }
    };
    with_cors(response)
}

fn with_cors(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// The plain-text rendering of an answer node.
///
/// Scalars print directly. A mapping prints one sorted line per entry,
/// `key/` when the child is a container. A sequence prints one line per
/// index: `i=<name>` when the child is a mapping with a magic name field,
/// `i/` for other containers, bare `i` otherwise.
pub fn render_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number_text(number),
        Value::Object(map) => {
            let mut lines: Vec<String> = map
                .iter()
                .map(|(key, child)| match child {
                    Value::Object(_) | Value::Array(_) => format!("{key}/\n"),
                    _ => format!("{key}\n"),
                })
                .collect();
            lines.sort();
            lines.concat()
        }
        Value::Array(items) => {
            let mut out = String::new();
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Object(map) => match magic_display_name(map) {
                        Some(name) => out.push_str(&format!("{index}={name}\n")),
                        None => out.push_str(&format!("{index}/\n")),
                    },
                    Value::Array(_) => out.push_str(&format!("{index}/\n")),
                    _ => out.push_str(&format!("{index}\n")),
                }
            }
            out
        }
    }
}

/// The string form of a value for long-poll change detection: scalars by
/// their text rendering, containers by compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
        scalar => render_text(scalar),
    }
}

fn magic_display_name(map: &serde_json::Map<String, Value>) -> Option<&str> {
    MAGIC_LOOKUP_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
}

/// Floats print fixed-point and are trimmed of trailing zeros and dots,
/// so `1.5` stays `1.5` and `2.0` becomes `2`.
fn number_text(number: &Number) -> String {
    if let Some(signed) = number.as_i64() {
        return signed.to_string();
    }
    if let Some(unsigned) = number.as_u64() {
        return unsigned.to_string();
    }
    let fixed = format!("{:.6}", number.as_f64().unwrap_or_default());
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
#[path = "content_test.rs"]
mod tests;
