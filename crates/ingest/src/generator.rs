//! Answer materialization.
//!
//! The [`Generator`] turns a decoded record list into a [`Versions`]
//! snapshot: one independent [`Interim`] per supported metadata version,
//! rewritten by the version passes (containers → services → stacks →
//! hosts), then flattened into the `default` view and, for local sources,
//! one view per container IP. It also owns the delta cache that backs the
//! persisted answers file.
//!
//! A local generator materializes all three dated versions; an external one
//! only the newest (external snapshots contribute nothing but their V3
//! `default` tree to the merge).

use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use hostmeta_answers::{
    Answers, Versions, DEFAULT_CLIENT, LATEST_TAG, METADATA_VERSION_1, METADATA_VERSION_3,
    SUPPORTED_VERSIONS, VERSION_KEY,
};

use crate::decode::{decode_delta, RawRecord};
use crate::interim::Interim;
use crate::persist::{self, MetadataDelta};
use crate::record::{service_key, Credential, METADATA_KIND};
use crate::Result;

/// Versions an external (non-local) source materializes.
const EXTERNAL_VERSIONS: &[&str] = &[METADATA_VERSION_3];

/// Per-source materializer and delta cache.
pub struct Generator {
    supported_versions: &'static [&'static str],
    local: bool,
    answers_file: PathBuf,
    delta: Mutex<DeltaCache>,
}

struct DeltaCache {
    version: String,
    data: Bytes,
    saved_version: String,
}

impl Generator {
    /// `local` selects the full version set and per-client views;
    /// `answers_file` is where the raw delta is cached across restarts.
    pub fn new(local: bool, answers_file: impl Into<PathBuf>) -> Self {
        Self {
            supported_versions: if local {
                &SUPPORTED_VERSIONS
            } else {
                EXTERNAL_VERSIONS
            },
            local,
            answers_file: answers_file.into(),
            delta: Mutex::new(DeltaCache {
                version: "0".to_string(),
                data: Bytes::new(),
                saved_version: String::new(),
            }),
        }
    }

    pub fn answers_file(&self) -> &Path {
        &self.answers_file
    }

    /// Decode a compressed delta body, retaining the raw bytes for the
    /// persistence tick. Returns the record list and the delta version.
    pub fn decode_delta(&self, body: &[u8]) -> Result<(Vec<RawRecord>, String)> {
        let (records, version) = decode_delta(body)?;

        let mut cache = self.delta.lock();
        cache.version = version.clone();
        cache.data = Bytes::copy_from_slice(body);

        Ok((records, version))
    }

    /// Materialize a snapshot from a decoded record list.
    ///
    /// Also returns the credentials found in the delta, which name the
    /// external sources the controller should subscribe to.
    pub fn generate_answers(&self, records: &[RawRecord]) -> (Versions, Vec<Credential>) {
        let mut versions = Versions::new();
        let mut credentials = Vec::new();

        for version in self.supported_versions {
            let mut interim = Interim::from_records(records);
            credentials = interim.credentials.clone();

            apply_to_containers(&mut interim, version);
            apply_to_services(&mut interim, version);
            apply_to_stacks(&mut interim, version);
            apply_to_hosts(&mut interim, version);

            versions.insert(*version, self.build_answers(&interim));
        }

        if let Some(newest) = versions.get(METADATA_VERSION_3).cloned() {
            versions.insert(LATEST_TAG, newest);
        }

        (versions, credentials)
    }

    fn build_answers(&self, interim: &Interim) -> Answers {
        let mut answers = Answers::new();
        let defaults = self.default_view(interim);
        if self.local {
            add_client_views(&mut answers, &defaults, interim);
        }
        answers.insert(DEFAULT_CLIENT.to_string(), Value::Object(defaults));
        answers
    }

    /// The `default` view: flat record sequences plus the host-level
    /// `self` entry and the environment keys spread at top level.
    fn default_view(&self, interim: &Interim) -> Map<String, Value> {
        let mut view = Map::new();

        view.insert("containers".to_string(), collect_records(&interim.containers));
        view.insert("services".to_string(), collect_records(&interim.services));
        view.insert("stacks".to_string(), collect_records(&interim.stacks));
        view.insert("hosts".to_string(), collect_records(&interim.hosts));
        view.insert("networks".to_string(), Value::Array(interim.networks.clone()));

        if let Some(version) = interim.default_data.get(VERSION_KEY) {
            view.insert(VERSION_KEY.to_string(), version.clone());
        }

        if self.local {
            if let Some(Value::Object(self_view)) = interim.default_data.get("self") {
                let mut self_view = self_view.clone();
                let canonical = self_view
                    .get("host")
                    .and_then(|host| host.get("uuid"))
                    .and_then(Value::as_str)
                    .and_then(|uuid| interim.hosts.get(uuid))
                    .cloned();
                if let Some(host) = canonical {
                    self_view.insert("host".to_string(), Value::Object(host));
                }
                view.insert("self".to_string(), Value::Object(self_view));
            }
        }

        for (key, value) in &interim.environment {
            if key != METADATA_KIND {
                view.insert(key.clone(), value.clone());
            }
        }

        view
    }

    /// Persist the cached delta when it changed since the last save.
    /// Called from the subscriber's 30 s tick.
    pub fn save_to_file(&self) {
        let mut cache = self.delta.lock();
        if cache.saved_version == cache.version || cache.data.is_empty() {
            return;
        }

        let delta = MetadataDelta {
            version: cache.version.clone(),
            data: cache.data.to_vec(),
        };
        match persist::write_delta(&self.answers_file, &delta) {
            Ok(()) => {
                debug!(version = %delta.version, path = %self.answers_file.display(), "saved delta");
                cache.saved_version = cache.version.clone();
            }
            Err(err) => warn!(%err, "failed to save delta to file"),
        }
    }

    /// Rebuild the last snapshot from the answers file, if one exists.
    pub fn load_from_file(&self) -> Result<Option<(Versions, Vec<Credential>)>> {
        if !self.answers_file.exists() {
            warn!(path = %self.answers_file.display(), "no answers file to load");
            return Ok(None);
        }

        info!(path = %self.answers_file.display(), "loading answers from file");
        let delta = persist::read_delta(&self.answers_file)?;
        let (records, _) = self.decode_delta(&delta.data)?;
        Ok(Some(self.generate_answers(&records)))
    }
}

fn collect_records(index: &std::collections::HashMap<String, RawRecord>) -> Value {
    Value::Array(index.values().cloned().map(Value::Object).collect())
}

/// Per-client views: one per container with a routable `primary_ip`,
/// keyed by that IP. Defaults fill any top-level key the view lacks.
fn add_client_views(answers: &mut Answers, defaults: &Map<String, Value>, interim: &Interim) {
    for container in interim.containers.values() {
        let Some(ip) = container.get("primary_ip").and_then(Value::as_str) else {
            continue;
        };

        let mut self_view = Map::new();
        self_view.insert("container".to_string(), Value::Object(container.clone()));

        if let Some(stack_uuid) = container.get("stack_uuid").and_then(Value::as_str) {
            if let Some(stack) = interim.stacks.get(stack_uuid) {
                self_view.insert("stack".to_string(), Value::Object(stack.clone()));
            }
            let key = service_key(
                container.get("service_uuid").and_then(Value::as_str).unwrap_or_default(),
                container.get("service_name").and_then(Value::as_str).unwrap_or_default(),
            );
            if let Some(service) = interim.services.get(&key) {
                self_view.insert("service".to_string(), Value::Object(service.clone()));
            }
        }

        if let Some(host) = container
            .get("host_uuid")
            .and_then(Value::as_str)
            .and_then(|uuid| interim.hosts.get(uuid))
        {
            self_view.insert("host".to_string(), Value::Object(host.clone()));
        }

        let mut view = Map::new();
        view.insert("self".to_string(), Value::Object(self_view));
        merge_defaults(&mut view, defaults);
        answers.insert(ip.to_string(), Value::Object(view));
    }
}

/// Defaults only fill gaps; keys the view already declared win.
fn merge_defaults(view: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, value) in defaults {
        if !view.contains_key(key) {
            view.insert(key.clone(), value.clone());
        }
    }
}

/// Container pass: attach links, normalize ports, drop the `host_ip`
/// helper field, lowercase names for the newest version.
fn apply_to_containers(interim: &mut Interim, version: &str) {
    let Interim {
        containers,
        container_links,
        ..
    } = interim;
    let v3 = version == METADATA_VERSION_3;

    for (uuid, container) in containers.iter_mut() {
        if v3 {
            lowercase_field(container, "name");
            lowercase_field(container, "service_name");
            lowercase_field(container, "stack_name");
        }

        let host_ip = container
            .get("host_ip")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Some(Value::Array(ports)) = container.get_mut("ports") {
            if v3 {
                rewrite_ports_v3(ports);
            } else {
                rewrite_ports_legacy(ports, &host_ip);
            }
        }

        let links = container_links
            .get(uuid.as_str())
            .cloned()
            .map(Value::Object)
            .unwrap_or(Value::Null);
        container.insert("links".to_string(), links);
        container.remove("host_ip");
    }
}

/// V3 port form: exactly three colon-fields, host defaulted to `0.0.0.0`.
/// A port that already has three fields is left alone even when its host
/// segment is `0.0.0.0`.
fn rewrite_ports_v3(ports: &mut [Value]) {
    for port in ports {
        if let Value::String(mapping) = port {
            if mapping.split(':').count() != 3 {
                *mapping = format!("0.0.0.0:{mapping}");
            }
        }
    }
}

/// Legacy port form: an unspecified or `0.0.0.0` host segment becomes the
/// container's host IP.
fn rewrite_ports_legacy(ports: &mut [Value], host_ip: &str) {
    for port in ports {
        if let Value::String(mapping) = port {
            let mut fields = mapping.split(':');
            let host = fields.next().unwrap_or_default();
            match fields.count() {
                // host:public:private
                2 if host == "0.0.0.0" => {
                    *mapping = format!("{host_ip}{}", &mapping["0.0.0.0".len()..]);
                }
                2 => {}
                // public:private
                _ => *mapping = format!("{host_ip}:{mapping}"),
            }
        }
    }
}

/// Service pass: register under the stack, attach links, lowercase for
/// V3, null any token, back-populate member containers, inject the
/// container list (names for V1, records for V2/V3).
fn apply_to_services(interim: &mut Interim, version: &str) {
    let Interim {
        containers,
        services,
        stack_services,
        service_containers,
        service_links,
        ..
    } = interim;

    for (composite, service) in services.iter_mut() {
        let service_uuid = service
            .get("uuid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let stack_uuid = service
            .get("stack_uuid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        stack_services
            .entry(stack_uuid.clone())
            .or_default()
            .push(composite.clone());

        let links = service_links
            .get(&service_uuid)
            .cloned()
            .map(Value::Object)
            .unwrap_or(Value::Null);
        service.insert("links".to_string(), links);

        if version == METADATA_VERSION_3 {
            lowercase_field(service, "name");
            lowercase_field(service, "stack_name");
            lowercase_field(service, "primary_service_name");
            if let Some(Value::Array(sidekicks)) = service.get_mut("sidekicks") {
                for sidekick in sidekicks {
                    if let Value::String(name) = sidekick {
                        *name = name.to_lowercase();
                    }
                }
            }
            if let Some(Value::Object(links)) = service.get_mut("links") {
                *links = links
                    .iter()
                    .map(|(key, value)| (key.to_lowercase(), value.clone()))
                    .collect();
            }
        }

        // A cached upstream token must never be observable through a view.
        if service.contains_key("token") {
            service.insert("token".to_string(), Value::Null);
        }

        let members = service_containers
            .get(composite.as_str())
            .cloned()
            .unwrap_or_default();

        // Back-populate members before copying them in, so the injected
        // records carry the joined service and stack fields.
        let service_name = service.get("name").cloned().unwrap_or(Value::Null);
        let stack_name = service.get("stack_name").cloned().unwrap_or(Value::Null);
        for member in &members {
            if let Some(container) = containers.get_mut(member) {
                container.insert("service_name".to_string(), service_name.clone());
                container.insert(
                    "service_uuid".to_string(),
                    service.get("uuid").cloned().unwrap_or(Value::Null),
                );
                container.insert("stack_name".to_string(), stack_name.clone());
                container.insert("stack_uuid".to_string(), Value::String(stack_uuid.clone()));
            }
        }

        let injected: Vec<Value> = match version {
            METADATA_VERSION_1 => members
                .iter()
                .filter_map(|member| containers.get(member))
                .filter_map(|container| container.get("name").cloned())
                .collect(),
            _ => members
                .iter()
                .filter_map(|member| containers.get(member))
                .map(|container| Value::Object(container.clone()))
                .collect(),
        };
        service.insert("containers".to_string(), Value::Array(injected));
    }
}

/// Stack pass: inject the service list (names for V1, records for V2/V3).
fn apply_to_stacks(interim: &mut Interim, version: &str) {
    let Interim {
        services,
        stacks,
        stack_services,
        ..
    } = interim;

    for (uuid, stack) in stacks.iter_mut() {
        let members = stack_services.get(uuid.as_str()).cloned().unwrap_or_default();
        let injected: Vec<Value> = match version {
            METADATA_VERSION_1 => members
                .iter()
                .filter_map(|key| services.get(key))
                .filter_map(|service| service.get("name").cloned())
                .collect(),
            _ => members
                .iter()
                .filter_map(|key| services.get(key))
                .map(|service| Value::Object(service.clone()))
                .collect(),
        };
        stack.insert("services".to_string(), Value::Array(injected));

        if version == METADATA_VERSION_3 {
            lowercase_field(stack, "name");
        }
    }
}

fn apply_to_hosts(interim: &mut Interim, version: &str) {
    if version != METADATA_VERSION_3 {
        return;
    }
    for host in interim.hosts.values_mut() {
        host.remove("hostId");
    }
}

fn lowercase_field(record: &mut RawRecord, key: &str) {
    if let Some(Value::String(value)) = record.get_mut(key) {
        *value = value.to_lowercase();
    }
}

#[cfg(test)]
#[path = "generator_test.rs"]
mod tests;
