//! The metadata controller.
//!
//! Owns the source set: exactly one local source plus any external sources
//! named by the local delta's credentials. Every source update funnels
//! through [`MetadataController::apply_source_update`], the single writer:
//! it synchronizes the source set against the current credentials, merges
//! all snapshots with a freshly minted token, swaps the published snapshot,
//! and broadcasts on the version channel — in that order, so a woken
//! waiter always observes the new snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hostmeta_answers::Versions;
use hostmeta_ingest::{merge_versions, Credential, Generator};
use hostmeta_upstream::{EventConnector, ReloadFn, Subscriber, SubscriberConfig};

use crate::content::value_text;
use crate::{Result, ServerError};

/// Long-poll default when the client sends no `maxWait`.
const DEFAULT_WAIT: Duration = Duration::from_secs(60);

/// Long-poll hard cap.
const MAX_WAIT: Duration = Duration::from_secs(120);

/// Periodic wake for long-poll waiters, so a missed broadcast can never
/// strand one.
const WAKE_INTERVAL: Duration = Duration::from_secs(5);

/// Builds the event connector for a source. The event wire protocol is
/// pluggable; the controller only drives the channel interface.
pub type ConnectorFactory =
    Arc<dyn Fn(&SubscriberConfig) -> Arc<dyn EventConnector> + Send + Sync>;

/// Location and credentials of one upstream source.
#[derive(Debug, Clone)]
pub struct SourceCoordinates {
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone)]
pub struct ControllerConfig {
    /// Subscribe to upstream event streams (off = serve the answers file
    /// only).
    pub subscribe: bool,
    /// Answers file path for the local source; external sources append
    /// `_<access key>`.
    pub answers_file_prefix: String,
    /// Minimum spacing between downloads per source.
    pub reload_interval: Duration,
    /// The local source.
    pub local: SourceCoordinates,
}

pub struct MetadataController {
    config: ControllerConfig,
    connector_factory: ConnectorFactory,
    inner: Mutex<Inner>,
    version_tx: watch::Sender<String>,
}

struct Inner {
    sources: HashMap<String, SourceEntry>,
    versions: Arc<Versions>,
    version: String,
}

struct SourceEntry {
    coordinates: SourceCoordinates,
    local: bool,
    generator: Arc<Generator>,
    subscriber: Option<Subscriber>,
    versions: Versions,
    external_credentials: Vec<Credential>,
}

impl MetadataController {
    pub fn new(config: ControllerConfig, connector_factory: ConnectorFactory) -> Arc<Self> {
        let (version_tx, _) = watch::channel("0".to_string());
        Arc::new(Self {
            config,
            connector_factory,
            inner: Mutex::new(Inner {
                sources: HashMap::new(),
                versions: Arc::new(Versions::new()),
                version: "0".to_string(),
            }),
            version_tx,
        })
    }

    /// Register the local source, recover the last snapshot from disk,
    /// and start subscribing. Fails when neither the answers file nor a
    /// subscription could ever produce an answer.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            let local = self.config.local.clone();
            self.register_source_locked(&mut inner, local, true);
        }

        if !self.config.subscribe
            && !std::path::Path::new(&self.config.answers_file_prefix).exists()
        {
            return Err(ServerError::NoAnswers {
                path: self.config.answers_file_prefix.clone(),
            });
        }

        self.load_versions_from_file()?;

        if self.config.subscribe {
            // Discovered sources start at registration; only the local
            // subscriber still needs its loops.
            let inner = self.inner.lock();
            for entry in inner.sources.values().filter(|entry| entry.local) {
                if let Some(subscriber) = &entry.subscriber {
                    subscriber.start((self.connector_factory)(&subscriber_config(
                        &entry.coordinates,
                        self.config.reload_interval,
                    )));
                }
            }
        }

        Ok(())
    }

    /// Rebuild every source's snapshot from its answers file and
    /// republish.
    pub fn load_versions_from_file(self: &Arc<Self>) -> Result<()> {
        let generators: Vec<(String, Arc<Generator>)> = {
            let inner = self.inner.lock();
            inner
                .sources
                .iter()
                .map(|(key, entry)| (key.clone(), Arc::clone(&entry.generator)))
                .collect()
        };

        for (key, generator) in generators {
            let (versions, credentials) = match generator.load_from_file()? {
                Some(loaded) => loaded,
                None => (Versions::new(), Vec::new()),
            };
            self.apply_source_update(&key, versions, credentials, String::new());
        }

        Ok(())
    }

    /// Reload the local sources: kick a live subscriber for a fresh
    /// download, or re-read the answers file when not subscribed.
    pub fn reload_local(self: &Arc<Self>) -> Result<()> {
        let locals: Vec<(String, Arc<Generator>, bool)> = {
            let inner = self.inner.lock();
            inner
                .sources
                .iter()
                .filter(|(_, entry)| entry.local)
                .map(|(key, entry)| {
                    (
                        key.clone(),
                        Arc::clone(&entry.generator),
                        entry.subscriber.is_some(),
                    )
                })
                .collect()
        };

        for (key, generator, subscribed) in locals {
            if subscribed {
                let inner = self.inner.lock();
                if let Some(entry) = inner.sources.get(&key) {
                    if let Some(subscriber) = &entry.subscriber {
                        subscriber.kick();
                    }
                }
            } else if let Some((versions, credentials)) = generator.load_from_file()? {
                self.apply_source_update(&key, versions, credentials, String::new());
            }
        }

        Ok(())
    }

    /// The published snapshot.
    pub fn snapshot(&self) -> Arc<Versions> {
        Arc::clone(&self.inner.lock().versions)
    }

    /// The current opaque version token.
    pub fn version(&self) -> String {
        self.inner.lock().version.clone()
    }

    /// Install a source's freshly materialized snapshot and republish.
    /// This is the reload callback handed to every subscriber.
    pub fn apply_source_update(
        self: &Arc<Self>,
        access_key: &str,
        versions: Versions,
        credentials: Vec<Credential>,
        version: String,
    ) {
        let mut inner = self.inner.lock();
        match inner.sources.get_mut(access_key) {
            Some(entry) => {
                debug!(access_key, delta_version = %version, "applying source update");
                entry.versions = versions;
                entry.external_credentials = credentials;
            }
            None => {
                warn!(access_key, "update from unregistered source, ignoring");
                return;
            }
        }
        self.republish_locked(&mut inner);
    }

    /// Single-writer republish: sync the source set against the local
    /// credentials, merge, swap, broadcast.
    fn republish_locked(self: &Arc<Self>, inner: &mut Inner) {
        let credentials: HashMap<String, Credential> = inner
            .sources
            .values()
            .find(|entry| entry.local)
            .map(|entry| entry.external_credentials.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|credential| (credential.public_value.clone(), credential))
            .collect();

        // Drop external sources that vanished or moved.
        let stale: Vec<String> = inner
            .sources
            .values()
            .filter(|entry| !entry.local)
            .filter(|entry| {
                credentials
                    .get(&entry.coordinates.access_key)
                    .is_none_or(|credential| credential.url != entry.coordinates.url)
            })
            .map(|entry| entry.coordinates.access_key.clone())
            .collect();
        for key in stale {
            if let Some(entry) = inner.sources.remove(&key) {
                info!(access_key = %key, "deregistering source");
                if let Some(subscriber) = entry.subscriber {
                    subscriber.stop();
                }
            }
        }

        // Merge all snapshots under a fresh token and swap.
        let local = inner
            .sources
            .values()
            .find(|entry| entry.local)
            .map(|entry| entry.versions.clone())
            .unwrap_or_default();
        let external: Vec<Versions> = inner
            .sources
            .values()
            .filter(|entry| !entry.local)
            .map(|entry| entry.versions.clone())
            .collect();

        inner.version = Uuid::new_v4().to_string();
        inner.versions = Arc::new(merge_versions(local, &external, &inner.version));

        // Register sources for newly discovered credentials.
        for credential in credentials.values() {
            self.register_source_locked(
                inner,
                SourceCoordinates {
                    url: credential.url.clone(),
                    access_key: credential.public_value.clone(),
                    secret_key: credential.secret_value.clone(),
                },
                false,
            );
        }

        let _ = self.version_tx.send(inner.version.clone());
    }

    fn register_source_locked(
        self: &Arc<Self>,
        inner: &mut Inner,
        coordinates: SourceCoordinates,
        local: bool,
    ) {
        if inner.sources.contains_key(&coordinates.access_key) {
            return;
        }
        info!(access_key = %coordinates.access_key, url = %coordinates.url, "registering source");

        let answers_file = if local {
            self.config.answers_file_prefix.clone()
        } else {
            format!(
                "{}_{}",
                self.config.answers_file_prefix, coordinates.access_key
            )
        };
        let generator = Arc::new(Generator::new(local, answers_file));

        let subscriber = if self.config.subscribe {
            let subscriber = Subscriber::new(
                subscriber_config(&coordinates, self.config.reload_interval),
                Arc::clone(&generator),
                self.reload_fn(coordinates.access_key.clone()),
            );
            // The local subscriber is started by `start`; discovered ones
            // begin their loops right away.
            if !local {
                subscriber.start((self.connector_factory)(&subscriber_config(
                    &coordinates,
                    self.config.reload_interval,
                )));
            }
            Some(subscriber)
        } else {
            None
        };

        inner.sources.insert(
            coordinates.access_key.clone(),
            SourceEntry {
                coordinates,
                local,
                generator,
                subscriber,
                versions: Versions::new(),
                external_credentials: Vec::new(),
            },
        );
    }

    fn reload_fn(self: &Arc<Self>, access_key: String) -> ReloadFn {
        let controller = Arc::downgrade(self);
        Arc::new(move |versions, credentials, version| {
            if let Some(controller) = controller.upgrade() {
                controller.apply_source_update(&access_key, versions, credentials, version);
            }
        })
    }

    /// Stop every subscriber. Used on shutdown.
    pub fn stop(&self) {
        let inner = self.inner.lock();
        for entry in inner.sources.values() {
            if let Some(subscriber) = &entry.subscriber {
                subscriber.stop();
            }
        }
    }

    /// Resolve `(version, ip, path)` against the published snapshot,
    /// optionally blocking until the value's string form differs from
    /// `old_value`.
    ///
    /// `max_wait` is clamped to two minutes, defaulting to one when zero.
    /// Past the deadline the last lookup is returned as-is, found or not.
    pub async fn lookup_answer(
        &self,
        wait: bool,
        old_value: &str,
        version: &str,
        ip: &str,
        path: &[String],
        max_wait: Duration,
    ) -> Option<Value> {
        if !wait {
            return self.snapshot().matching(version, ip, path).cloned();
        }

        let max_wait = if max_wait.is_zero() {
            DEFAULT_WAIT
        } else {
            max_wait.min(MAX_WAIT)
        };
        let deadline = Instant::now() + max_wait;
        let mut version_rx = self.version_tx.subscribe();

        loop {
            let snapshot = self.snapshot();
            let value = snapshot.matching(version, ip, path).cloned();

            if Instant::now() >= deadline {
                return value;
            }
            if let Some(found) = &value {
                if value_text(found) != old_value {
                    return value;
                }
            }

            let wake = Instant::now() + WAKE_INTERVAL;
            tokio::select! {
                _ = version_rx.changed() => {}
                _ = sleep_until(wake.min(deadline)) => {}
            }
        }
    }
}

fn subscriber_config(coordinates: &SourceCoordinates, reload_interval: Duration) -> SubscriberConfig {
    SubscriberConfig {
        url: coordinates.url.clone(),
        access_key: coordinates.access_key.clone(),
        secret_key: coordinates.secret_key.clone(),
        reload_interval,
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
