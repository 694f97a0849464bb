//! The hostmeta serving layer.
//!
//! The [`MetadataController`] owns the set of upstream sources (one local,
//! the rest discovered through the local delta's credentials), merges their
//! snapshots into the published [`Versions`](hostmeta_answers::Versions),
//! mints an opaque token per republish, and wakes long-poll waiters. The
//! [`routes`] module exposes the lookup surface over HTTP with
//! content-negotiated plain text, JSON, or YAML bodies, plus the loopback
//! reload endpoint.

pub mod content;
pub mod controller;
pub mod error;
pub mod routes;
pub mod state;

pub use controller::{ConnectorFactory, ControllerConfig, MetadataController, SourceCoordinates};
pub use error::ServerError;
pub use routes::{build_metadata_router, build_reload_router};
pub use state::AppState;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
