//! The upstream event-channel interface.
//!
//! The wire protocol an upstream speaks is not modeled here — only the
//! seam the subscriber drives: a connector that opens channels, a channel
//! that yields events and accepts replies. The two event names the
//! subscriber reacts to are `ping` (ignored) and `config.update` (reload
//! when an item names the answers resource).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::Result;

/// The upstream resource whose updates carry metadata deltas.
pub const ANSWERS_RESOURCE: &str = "metadata-answers";

/// Keep-alive event; carries nothing.
pub const EVENT_PING: &str = "ping";

/// Configuration-changed event; its payload is [`ConfigUpdateData`].
pub const EVENT_CONFIG_UPDATE: &str = "config.update";

/// An event delivered by an upstream channel.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamEvent {
    pub id: String,
    pub name: String,
    /// Channel name the upstream expects the handler reply on.
    #[serde(default)]
    pub reply_to: String,
    /// Event-specific payload.
    #[serde(default)]
    pub data: Value,
}

/// A handler reply, published once the event has been fully applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReply {
    pub name: String,
    /// Ids of the events this reply acknowledges.
    pub previous_ids: Vec<String>,
}

/// Payload of a [`EVENT_CONFIG_UPDATE`] event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateData {
    #[serde(default)]
    pub config_url: String,
    #[serde(default)]
    pub items: Vec<ConfigUpdateItem>,
}

/// One changed resource within a config update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateItem {
    pub name: String,
    /// Version hint echoed back on the next download URL.
    #[serde(default)]
    pub requested_version: i64,
}

/// One live connection to an upstream's event stream.
#[async_trait]
pub trait EventChannel: Send {
    /// Block until the next event arrives. An error tears the channel
    /// down; the subscriber reconnects through its connector.
    async fn next_event(&mut self) -> Result<UpstreamEvent>;

    /// Publish a handler reply.
    async fn publish(&mut self, reply: EventReply) -> Result<()>;
}

/// Opens event channels; one connector per source.
#[async_trait]
pub trait EventConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn EventChannel>>;
}
