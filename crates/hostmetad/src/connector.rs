//! Placeholder event connector.
//!
//! The event wire an upstream speaks is deployment-specific, so the daemon
//! ships with a connector that opens a channel carrying no events. The
//! snapshot is still driven by the initial download on subscribe, by
//! `POST /v1/reload`, and by SIGHUP. Wiring a concrete event protocol
//! means implementing [`EventConnector`] and swapping it in `main`.

use async_trait::async_trait;

use hostmeta_upstream::{EventChannel, EventConnector, EventReply, Result, UpstreamEvent};

pub struct IdleConnector;

struct IdleChannel;

#[async_trait]
impl EventChannel for IdleChannel {
    async fn next_event(&mut self) -> Result<UpstreamEvent> {
        std::future::pending().await
    }

    async fn publish(&mut self, _reply: EventReply) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl EventConnector for IdleConnector {
    async fn connect(&self) -> Result<Box<dyn EventChannel>> {
        Ok(Box::new(IdleChannel))
    }
}
