//! Record kinds and the credential record.
//!
//! Every object in a delta carries a `metadata_kind` tag naming one of the
//! kinds below. Objects with an unknown tag (or none) are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decode::RawRecord;

/// The tag field present on every delta record.
pub const METADATA_KIND: &str = "metadata_kind";

/// The kinds of record a delta can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Container,
    Stack,
    Service,
    Host,
    Network,
    ServiceContainerLink,
    ContainerLink,
    ServiceLink,
    DefaultData,
    Environment,
    Credential,
}

impl RecordKind {
    /// Parse the wire tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "container" => Self::Container,
            "stack" => Self::Stack,
            "service" => Self::Service,
            "host" => Self::Host,
            "network" => Self::Network,
            "serviceContainerLink" => Self::ServiceContainerLink,
            "containerLink" => Self::ContainerLink,
            "serviceLink" => Self::ServiceLink,
            "defaultData" => Self::DefaultData,
            "environment" => Self::Environment,
            "credential" => Self::Credential,
            _ => return None,
        })
    }

    /// The kind of a raw record, if it carries a recognized tag.
    pub fn of(record: &RawRecord) -> Option<Self> {
        record
            .get(METADATA_KIND)
            .and_then(Value::as_str)
            .and_then(Self::from_tag)
    }
}

/// An upstream credential discovered in a local delta. Each one names an
/// external source the controller should subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub url: String,
    pub public_value: String,
    pub secret_value: String,
}

/// The composite key joining containers to services:
/// `lower(service_uuid + "_" + service_name)`.
pub fn service_key(uuid: &str, name: &str) -> String {
    format!("{uuid}_{name}").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags_round_trip() {
        assert_eq!(RecordKind::from_tag("container"), Some(RecordKind::Container));
        assert_eq!(
            RecordKind::from_tag("serviceContainerLink"),
            Some(RecordKind::ServiceContainerLink)
        );
        assert_eq!(RecordKind::from_tag("bogus"), None);
    }

    #[test]
    fn test_service_key_is_lowercased_composite() {
        assert_eq!(service_key("V1", "Web"), "v1_web");
    }
}
