//! Upstream source subscription for hostmeta.
//!
//! Each source gets a [`Subscriber`]: it listens on an [`EventChannel`] for
//! `config.update` events, coalesces them through a [`Kicker`] whose single
//! worker downloads the delta, drives the ingest pipeline, hands the fresh
//! snapshot to the installed reload callback, and acknowledges the update
//! upstream — in that order, so an ack always means the snapshot including
//! that update has been published.
//!
//! Downloads are paced by a token bucket (one per reload interval, burst
//! one), and the raw delta is persisted on a background tick so restarts
//! can serve answers before the first download completes.

mod error;
mod events;
mod kicker;
mod limiter;
mod subscriber;

pub use error::UpstreamError;
pub use events::{
    ConfigUpdateData, ConfigUpdateItem, EventChannel, EventConnector, EventReply, UpstreamEvent,
    ANSWERS_RESOURCE, EVENT_CONFIG_UPDATE, EVENT_PING,
};
pub use kicker::Kicker;
pub use limiter::ReloadLimiter;
pub use subscriber::{ReloadFn, Subscriber, SubscriberConfig};

/// Result type for upstream operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;
