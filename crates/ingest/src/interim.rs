//! The materializer's working set.
//!
//! An [`Interim`] is built fresh per (delta, version) pair: the version
//! passes rewrite it destructively, so each supported version gets its own
//! copy. Records land in indexes keyed by UUID (services by their composite
//! key), links in adjacency maps, and the singleton records (`defaultData`,
//! `environment`) in dedicated slots.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::decode::RawRecord;
use crate::record::{service_key, Credential, RecordKind};

/// Name→name link map, as carried by `containerLink`/`serviceLink` records.
pub type LinkMap = serde_json::Map<String, Value>;

#[derive(Debug, Default)]
pub struct Interim {
    /// Container UUID → container record.
    pub containers: HashMap<String, RawRecord>,
    /// Composite service key → service record.
    pub services: HashMap<String, RawRecord>,
    /// Stack UUID → stack record.
    pub stacks: HashMap<String, RawRecord>,
    /// Host UUID → host record.
    pub hosts: HashMap<String, RawRecord>,
    /// Stack UUID → composite keys of its services (built during the
    /// service pass).
    pub stack_services: HashMap<String, Vec<String>>,
    /// Composite service key → UUIDs of its containers.
    pub service_containers: HashMap<String, Vec<String>>,
    /// Container UUID → link name map.
    pub container_links: HashMap<String, LinkMap>,
    /// Service UUID → link name map.
    pub service_links: HashMap<String, LinkMap>,
    /// Network records, in delta order.
    pub networks: Vec<Value>,
    /// The `defaultData` record (supplies the host-level `self` view).
    pub default_data: RawRecord,
    /// The `environment` record, spread into the default view.
    pub environment: RawRecord,
    /// Credentials naming external sources.
    pub credentials: Vec<Credential>,
}

impl Interim {
    /// Index a decoded record list. Records of unknown kind, and records
    /// missing the fields their kind requires, are skipped.
    pub fn from_records(records: &[RawRecord]) -> Self {
        let mut interim = Self::default();
        for record in records {
            interim.add(record);
        }
        interim
    }

    fn add(&mut self, record: &RawRecord) {
        let Some(kind) = RecordKind::of(record) else {
            debug!("skipping record of unknown kind");
            return;
        };

        match kind {
            RecordKind::Container => {
                if let Some(uuid) = str_field(record, "uuid") {
                    self.containers.insert(uuid, record.clone());
                }
            }
            RecordKind::Stack => {
                if let Some(uuid) = str_field(record, "uuid") {
                    self.stacks.insert(uuid, record.clone());
                }
            }
            RecordKind::Service => {
                if let (Some(uuid), Some(name)) =
                    (str_field(record, "uuid"), str_field(record, "name"))
                {
                    self.services.insert(service_key(&uuid, &name), record.clone());
                }
            }
            RecordKind::Host => {
                if let Some(uuid) = str_field(record, "uuid") {
                    self.hosts.insert(uuid, record.clone());
                }
            }
            RecordKind::Network => {
                self.networks.push(Value::Object(record.clone()));
            }
            RecordKind::ServiceContainerLink => {
                if let (Some(svc_uuid), Some(svc_name), Some(container)) = (
                    str_field(record, "service_uuid"),
                    str_field(record, "service_name"),
                    str_field(record, "container_uuid"),
                ) {
                    self.service_containers
                        .entry(service_key(&svc_uuid, &svc_name))
                        .or_default()
                        .push(container);
                }
            }
            RecordKind::ContainerLink => {
                if let (Some(container), Some(key), Some(value)) = (
                    str_field(record, "container_uuid"),
                    str_field(record, "key"),
                    record.get("value").cloned(),
                ) {
                    self.container_links
                        .entry(container)
                        .or_default()
                        .insert(key, value);
                }
            }
            RecordKind::ServiceLink => {
                if let (Some(service), Some(key), Some(value)) = (
                    str_field(record, "service_uuid"),
                    str_field(record, "key"),
                    record.get("value").cloned(),
                ) {
                    self.service_links
                        .entry(service)
                        .or_default()
                        .insert(key, value);
                }
            }
            RecordKind::DefaultData => {
                self.default_data = record.clone();
            }
            RecordKind::Environment => {
                self.environment = record.clone();
            }
            RecordKind::Credential => {
                if let (Some(url), Some(public_value), Some(secret_value)) = (
                    str_field(record, "url"),
                    str_field(record, "public_value"),
                    str_field(record, "secret_value"),
                ) {
                    self.credentials.push(Credential {
                        url,
                        public_value,
                        secret_value,
                    });
                } else {
                    debug!("skipping credential record with missing fields");
                }
            }
        }
    }
}

fn str_field(record: &RawRecord, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}
