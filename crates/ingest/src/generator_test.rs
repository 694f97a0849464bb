//! Tests for answer materialization.

use serde_json::{json, Value};

use hostmeta_answers::{
    METADATA_VERSION_1, METADATA_VERSION_2, METADATA_VERSION_3,
};

use super::*;
use crate::decode::RawRecord;

fn obj(value: Value) -> RawRecord {
    value.as_object().unwrap().clone()
}

fn seg(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// One container in one service in one stack on one host, plus links,
/// a network, an environment record, and a credential.
fn sample_records() -> Vec<RawRecord> {
    vec![
        obj(json!({
            "metadata_kind": "container",
            "uuid": "c1",
            "name": "Web-1",
            "primary_ip": "10.0.0.5",
            "host_ip": "1.2.3.4",
            "ports": ["80:8080"],
            "stack_uuid": "s1",
            "service_uuid": "v1",
            "service_name": "Web",
            "host_uuid": "h1",
        })),
        obj(json!({
            "metadata_kind": "stack",
            "uuid": "s1",
            "name": "App",
        })),
        obj(json!({
            "metadata_kind": "service",
            "uuid": "v1",
            "name": "Web",
            "stack_uuid": "s1",
            "stack_name": "App",
            "primary_service_name": "Web",
            "sidekicks": ["Helper"],
            "token": "sekret",
        })),
        obj(json!({
            "metadata_kind": "host",
            "uuid": "h1",
            "name": "host-a",
            "hostId": 7,
        })),
        obj(json!({
            "metadata_kind": "serviceContainerLink",
            "service_uuid": "v1",
            "service_name": "Web",
            "container_uuid": "c1",
        })),
        obj(json!({
            "metadata_kind": "serviceLink",
            "service_uuid": "v1",
            "key": "MyDb",
            "value": "db/db",
        })),
        obj(json!({
            "metadata_kind": "containerLink",
            "container_uuid": "c1",
            "key": "Redis",
            "value": "redis-1",
        })),
        obj(json!({
            "metadata_kind": "network",
            "uuid": "n1",
            "name": "managed",
        })),
        obj(json!({
            "metadata_kind": "defaultData",
            "version": "5",
            "self": {"host": {"uuid": "h1"}},
        })),
        obj(json!({
            "metadata_kind": "environment",
            "foo": "bar",
            "system": true,
        })),
        obj(json!({
            "metadata_kind": "credential",
            "url": "https://other-node.example",
            "public_value": "pk-1",
            "secret_value": "sk-1",
        })),
    ]
}

fn local_snapshot() -> (hostmeta_answers::Versions, Vec<Credential>) {
    Generator::new(true, "/nonexistent/answers.json").generate_answers(&sample_records())
}

// ============================================================================
// Per-client views
// ============================================================================

#[test]
fn test_self_container_name_is_lowercased_in_v3() {
    let (versions, _) = local_snapshot();
    let name = versions
        .matching(METADATA_VERSION_3, "10.0.0.5", &seg(&["self", "container", "name"]))
        .unwrap();
    assert_eq!(*name, "web-1");
}

#[test]
fn test_self_container_name_keeps_case_in_v1() {
    let (versions, _) = local_snapshot();
    let name = versions
        .matching(METADATA_VERSION_1, "10.0.0.5", &seg(&["self", "container", "name"]))
        .unwrap();
    assert_eq!(*name, "Web-1");
}

#[test]
fn test_self_branches_present() {
    let (versions, _) = local_snapshot();
    for path in [
        &["self", "container", "uuid"],
        &["self", "stack", "uuid"],
        &["self", "service", "uuid"],
        &["self", "host", "uuid"],
    ] {
        assert!(
            versions
                .matching(METADATA_VERSION_3, "10.0.0.5", &seg(path.as_slice()))
                .is_some(),
            "missing {path:?}"
        );
    }
}

#[test]
fn test_container_without_primary_ip_gets_no_view() {
    let mut records = sample_records();
    records[0].remove("primary_ip");
    let (versions, _) = Generator::new(true, "/tmp/x").generate_answers(&records);
    let answers = versions.get(METADATA_VERSION_3).unwrap();
    assert_eq!(answers.len(), 1);
    assert!(answers.contains_key("default"));
}

#[test]
fn test_container_without_stack_omits_stack_and_service() {
    let records = vec![
        obj(json!({
            "metadata_kind": "container",
            "uuid": "c9",
            "name": "loner",
            "primary_ip": "10.0.0.9",
        })),
    ];
    let (versions, _) = Generator::new(true, "/tmp/x").generate_answers(&records);
    let view = versions
        .matching(METADATA_VERSION_3, "10.0.0.9", &seg(&["self"]))
        .unwrap();
    assert!(view.get("container").is_some());
    assert!(view.get("stack").is_none());
    assert!(view.get("service").is_none());
    assert!(view.get("host").is_none());
}

// ============================================================================
// Ports
// ============================================================================

#[test]
fn test_v3_ports_default_host_segment() {
    let (versions, _) = local_snapshot();
    let port = versions
        .matching(METADATA_VERSION_3, "10.0.0.5", &seg(&["self", "container", "ports", "0"]))
        .unwrap();
    assert_eq!(*port, "0.0.0.0:80:8080");
}

#[test]
fn test_legacy_ports_substitute_host_ip() {
    let (versions, _) = local_snapshot();
    let port = versions
        .matching(METADATA_VERSION_1, "10.0.0.5", &seg(&["self", "container", "ports", "0"]))
        .unwrap();
    assert_eq!(*port, "1.2.3.4:80:8080");
}

#[test]
fn test_port_rewrites_with_explicit_host_segment() {
    let mut records = sample_records();
    records[0].insert(
        "ports".to_string(),
        json!(["0.0.0.0:443:443", "9.9.9.9:53:53"]),
    );
    let (versions, _) = Generator::new(true, "/tmp/x").generate_answers(&records);

    // V3 keeps a three-field port verbatim, 0.0.0.0 host included.
    let v3_ports = versions
        .matching(METADATA_VERSION_3, "10.0.0.5", &seg(&["self", "container", "ports"]))
        .unwrap();
    assert_eq!(v3_ports, &json!(["0.0.0.0:443:443", "9.9.9.9:53:53"]));

    // Legacy substitutes only the 0.0.0.0 host segment.
    let v2_ports = versions
        .matching(METADATA_VERSION_2, "10.0.0.5", &seg(&["self", "container", "ports"]))
        .unwrap();
    assert_eq!(v2_ports, &json!(["1.2.3.4:443:443", "9.9.9.9:53:53"]));
}

#[test]
fn test_host_ip_helper_field_is_removed() {
    let (versions, _) = local_snapshot();
    for version in [METADATA_VERSION_1, METADATA_VERSION_3] {
        let container = versions
            .matching(version, "10.0.0.5", &seg(&["self", "container"]))
            .unwrap();
        assert!(container.get("host_ip").is_none());
    }
}

// ============================================================================
// Services and stacks
// ============================================================================

#[test]
fn test_service_stack_name_lowercased_in_v3() {
    let (versions, _) = local_snapshot();
    let stack_name = versions
        .matching(
            METADATA_VERSION_3,
            "default",
            &seg(&["services", "web", "stack_name"]),
        )
        .unwrap();
    assert_eq!(*stack_name, "app");
}

#[test]
fn test_service_containers_are_names_in_v1_and_records_in_v3() {
    let (versions, _) = local_snapshot();

    let v1 = versions
        .matching(METADATA_VERSION_1, "default", &seg(&["services", "Web", "containers"]))
        .unwrap();
    assert_eq!(v1, &json!(["Web-1"]));

    let v3 = versions
        .matching(
            METADATA_VERSION_3,
            "default",
            &seg(&["services", "web", "containers", "0", "uuid"]),
        )
        .unwrap();
    assert_eq!(*v3, "c1");
}

#[test]
fn test_back_populated_stack_fields_on_container() {
    let (versions, _) = local_snapshot();
    let stack_name = versions
        .matching(METADATA_VERSION_3, "10.0.0.5", &seg(&["self", "container", "stack_name"]))
        .unwrap();
    assert_eq!(*stack_name, "app");

    let stack_name = versions
        .matching(METADATA_VERSION_1, "10.0.0.5", &seg(&["self", "container", "stack_name"]))
        .unwrap();
    assert_eq!(*stack_name, "App");
}

#[test]
fn test_sidekicks_and_link_keys_lowercased_in_v3() {
    let (versions, _) = local_snapshot();

    let sidekicks = versions
        .matching(METADATA_VERSION_3, "default", &seg(&["services", "web", "sidekicks"]))
        .unwrap();
    assert_eq!(sidekicks, &json!(["helper"]));

    let link = versions
        .matching(METADATA_VERSION_3, "default", &seg(&["services", "web", "links", "mydb"]))
        .unwrap();
    assert_eq!(*link, "db/db");

    // V1 keeps the original link key.
    let link = versions
        .matching(METADATA_VERSION_1, "default", &seg(&["services", "Web", "links", "MyDb"]))
        .unwrap();
    assert_eq!(*link, "db/db");
}

#[test]
fn test_container_link_keys_keep_case() {
    let (versions, _) = local_snapshot();
    let link = versions
        .matching(
            METADATA_VERSION_3,
            "10.0.0.5",
            &seg(&["self", "container", "links", "Redis"]),
        )
        .unwrap();
    assert_eq!(*link, "redis-1");
}

#[test]
fn test_stack_services_are_names_in_v1_and_records_in_v3() {
    let (versions, _) = local_snapshot();

    let v1 = versions
        .matching(METADATA_VERSION_1, "default", &seg(&["stacks", "App", "services"]))
        .unwrap();
    assert_eq!(v1, &json!(["Web"]));

    let v3 = versions
        .matching(
            METADATA_VERSION_3,
            "default",
            &seg(&["stacks", "app", "services", "0", "name"]),
        )
        .unwrap();
    assert_eq!(*v3, "web");
}

// ============================================================================
// Token stripping
// ============================================================================

#[test]
fn test_no_token_observable_anywhere() {
    let (versions, _) = local_snapshot();
    for version in [METADATA_VERSION_1, METADATA_VERSION_2, METADATA_VERSION_3] {
        for path in [
            vec!["self", "service", "token"],
            vec!["services", "0", "token"],
            vec!["stacks", "0", "services", "0", "token"],
        ] {
            let value = versions.matching(version, "10.0.0.5", &seg(&path));
            assert!(
                value.is_none() || value == Some(&Value::Null),
                "token leaked at {path:?} in {version}"
            );
        }
    }
}

// ============================================================================
// Hosts
// ============================================================================

#[test]
fn test_host_id_removed_only_in_v3() {
    let (versions, _) = local_snapshot();
    assert!(versions
        .matching(METADATA_VERSION_3, "default", &seg(&["hosts", "0", "hostId"]))
        .is_none());
    assert_eq!(
        versions
            .matching(METADATA_VERSION_1, "default", &seg(&["hosts", "0", "hostId"]))
            .unwrap(),
        7
    );
}

// ============================================================================
// Default view
// ============================================================================

#[test]
fn test_environment_spread_without_kind_tag() {
    let (versions, _) = local_snapshot();
    assert_eq!(
        versions
            .matching(METADATA_VERSION_3, "default", &seg(&["foo"]))
            .unwrap(),
        "bar"
    );
    assert_eq!(
        versions
            .matching(METADATA_VERSION_3, "default", &seg(&["system"]))
            .unwrap(),
        true
    );
    assert!(versions
        .matching(METADATA_VERSION_3, "default", &seg(&["metadata_kind"]))
        .is_none());
}

#[test]
fn test_default_self_host_is_canonical() {
    let (versions, _) = local_snapshot();
    let host = versions
        .matching(METADATA_VERSION_3, "default", &seg(&["self", "host"]))
        .unwrap();
    assert_eq!(host.get("name").unwrap(), "host-a");
    // The canonical record went through the host pass.
    assert!(host.get("hostId").is_none());
}

#[test]
fn test_delta_version_in_default_view() {
    let (versions, _) = local_snapshot();
    assert_eq!(
        versions
            .matching(METADATA_VERSION_3, "default", &seg(&["version"]))
            .unwrap(),
        "5"
    );
}

#[test]
fn test_default_fallback_completeness_and_shadowing() {
    let (versions, _) = local_snapshot();
    let answers = versions.get(METADATA_VERSION_3).unwrap();
    let default = answers.get("default").unwrap().as_object().unwrap();
    let client = answers.get("10.0.0.5").unwrap().as_object().unwrap();

    for key in default.keys() {
        assert!(client.contains_key(key), "client view missing {key}");
    }
    // The client view brings its own self entry; the default keeps the
    // host-level one.
    assert_ne!(client.get("self"), default.get("self"));
}

#[test]
fn test_credentials_extracted() {
    let (_, credentials) = local_snapshot();
    assert_eq!(
        credentials,
        vec![Credential {
            url: "https://other-node.example".to_string(),
            public_value: "pk-1".to_string(),
            secret_value: "sk-1".to_string(),
        }]
    );
}

// ============================================================================
// Version set
// ============================================================================

#[test]
fn test_latest_aliases_newest() {
    let (versions, _) = local_snapshot();
    assert_eq!(
        versions.get("latest").unwrap(),
        versions.get(METADATA_VERSION_3).unwrap()
    );
}

#[test]
fn test_external_generator_emits_only_v3_defaults() {
    let (versions, _) =
        Generator::new(false, "/tmp/x_ext").generate_answers(&sample_records());

    let mut tags = versions.tags();
    tags.sort_unstable();
    assert_eq!(tags, vec![METADATA_VERSION_3, "latest"]);

    let answers = versions.get(METADATA_VERSION_3).unwrap();
    assert_eq!(answers.len(), 1);
    assert!(answers.contains_key("default"));
}

#[test]
fn test_unknown_kind_is_ignored() {
    let mut records = sample_records();
    records.push(obj(json!({"metadata_kind": "mystery", "uuid": "m1"})));
    let (versions, _) = Generator::new(true, "/tmp/x").generate_answers(&records);
    assert!(versions.get(METADATA_VERSION_3).is_some());
}
