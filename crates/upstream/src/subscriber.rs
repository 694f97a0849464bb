//! Per-source subscriber.
//!
//! Couples the event channel to the download worker: a `config.update`
//! naming the answers resource records its version hint, kicks the worker,
//! and only acknowledges upstream after the kicked generation has passed —
//! by then the reload callback has published the new snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hostmeta_answers::Versions;
use hostmeta_ingest::{Credential, Generator};

use crate::events::{
    ConfigUpdateData, EventChannel, EventConnector, EventReply, UpstreamEvent, ANSWERS_RESOURCE,
    EVENT_CONFIG_UPDATE, EVENT_PING,
};
use crate::kicker::Kicker;
use crate::limiter::ReloadLimiter;
use crate::{Result, UpstreamError};

/// Upper bound on a single delta download or ack.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause before reconnecting a torn event channel.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// How often the raw delta is checked against disk.
const SAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Installed by the controller; receives every freshly materialized
/// snapshot together with the credentials found in the delta and the
/// source-issued delta version.
pub type ReloadFn = Arc<dyn Fn(Versions, Vec<Credential>, String) + Send + Sync>;

/// Coordinates of one upstream source.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
    /// Minimum spacing between downloads (default one second).
    pub reload_interval: Duration,
}

pub struct Subscriber {
    inner: Arc<SubscriberInner>,
    kicker: Arc<Kicker>,
    shutdown: CancellationToken,
}

struct SubscriberInner {
    config: SubscriberConfig,
    client: reqwest::Client,
    generator: Arc<Generator>,
    reload: ReloadFn,
    limiter: ReloadLimiter,
    requested_version: Mutex<String>,
}

impl Subscriber {
    pub fn new(config: SubscriberConfig, generator: Arc<Generator>, reload: ReloadFn) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();

        let inner = Arc::new(SubscriberInner {
            limiter: ReloadLimiter::new(config.reload_interval),
            config,
            client,
            generator,
            reload,
            requested_version: Mutex::new(String::new()),
        });

        let worker = Arc::clone(&inner);
        let kicker = Kicker::new(move || {
            let inner = Arc::clone(&worker);
            async move {
                if let Err(err) = inner.download_and_reload().await {
                    warn!(
                        %err,
                        url = %inner.config.url,
                        access_key = %inner.config.access_key,
                        "failed to download and reload metadata"
                    );
                }
            }
        });

        Self {
            inner,
            kicker,
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the event loop and the persist tick. Both observe
    /// [`stop`](Self::stop) between iterations.
    pub fn start(&self, connector: Arc<dyn EventConnector>) {
        let inner = Arc::clone(&self.inner);
        let kicker = Arc::clone(&self.kicker);
        let shutdown = self.shutdown.clone();
        tokio::spawn(event_loop(inner, kicker, connector, shutdown));

        let inner = Arc::clone(&self.inner);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut tick = interval(SAVE_INTERVAL);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tick.tick() => inner.generator.save_to_file(),
                }
            }
        });
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Request a download-and-reload run.
    pub fn kick(&self) -> u64 {
        self.kicker.kick()
    }

    /// Block until the generation advances past `observed`.
    pub async fn wait(&self, observed: u64) {
        self.kicker.wait(observed).await;
    }
}

async fn event_loop(
    inner: Arc<SubscriberInner>,
    kicker: Arc<Kicker>,
    connector: Arc<dyn EventConnector>,
    shutdown: CancellationToken,
) {
    loop {
        kicker.kick();

        match connector.connect().await {
            Ok(mut channel) => loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    event = channel.next_event() => match event {
                        Ok(event) => {
                            if let Err(err) = handle_event(&inner, &kicker, channel.as_mut(), event).await {
                                warn!(%err, url = %inner.config.url, "failed to handle event");
                            }
                        }
                        Err(err) => {
                            warn!(%err, url = %inner.config.url, "event channel failed");
                            break;
                        }
                    },
                }
            },
            Err(err) => {
                warn!(%err, url = %inner.config.url, "failed to connect event channel");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(RECONNECT_DELAY) => {}
        }
    }
}

async fn handle_event(
    inner: &SubscriberInner,
    kicker: &Arc<Kicker>,
    channel: &mut dyn EventChannel,
    event: UpstreamEvent,
) -> Result<()> {
    match event.name.as_str() {
        EVENT_PING => Ok(()),
        EVENT_CONFIG_UPDATE => {
            let update: ConfigUpdateData = serde_json::from_value(event.data.clone())?;

            let mut observed = None;
            for item in &update.items {
                if item.name == ANSWERS_RESOURCE {
                    info!(
                        version = item.requested_version,
                        url = %inner.config.url,
                        "update requested"
                    );
                    inner.set_requested_version(item.requested_version.to_string());
                    observed = Some(kicker.kick());
                    break;
                }
            }

            // Ack only after the snapshot containing this update is out.
            if let Some(observed) = observed {
                kicker.wait(observed).await;
            }

            channel
                .publish(EventReply {
                    name: event.reply_to,
                    previous_ids: vec![event.id],
                })
                .await
        }
        other => {
            debug!(event = other, "ignoring unhandled event");
            Ok(())
        }
    }
}

impl SubscriberInner {
    /// The version hint for the next download URL. `"0"` and the empty
    /// string both mean "no hint".
    fn requested_version(&self) -> String {
        let version = self.requested_version.lock();
        if version.is_empty() || *version == "0" {
            String::new()
        } else {
            version.clone()
        }
    }

    fn set_requested_version(&self, version: String) {
        *self.requested_version.lock() = version;
    }

    async fn download_and_reload(&self) -> Result<()> {
        self.limiter.acquire().await;

        let url = format!(
            "{}/configcontent/{ANSWERS_RESOURCE}?client=v2&requestedVersion={}",
            self.config.url,
            self.requested_version()
        );
        info!(url = %self.config.url, "downloading metadata");
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.access_key, Some(&self.config.secret_key))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let body = response.bytes().await?;
        debug!(elapsed = ?start.elapsed(), bytes = body.len(), "downloaded delta");

        let (records, version) = self.generator.decode_delta(&body)?;
        let (versions, credentials) = self.generator.generate_answers(&records);
        (self.reload)(versions, credentials, version.clone());

        let ack = format!(
            "{}/configcontent/{ANSWERS_RESOURCE}?client=v2&version={version}",
            self.config.url
        );
        match self
            .client
            .put(&ack)
            .basic_auth(&self.config.access_key, Some(&self.config.secret_key))
            .send()
            .await
        {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "upstream refused ack");
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "failed to send ack"),
        }

        info!(elapsed = ?start.elapsed(), %version, "download and reload complete");
        Ok(())
    }
}

#[cfg(test)]
#[path = "subscriber_test.rs"]
mod tests;
