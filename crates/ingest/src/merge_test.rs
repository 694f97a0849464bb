//! Tests for snapshot merge.

use serde_json::{json, Value};

use hostmeta_answers::{
    Answers, Versions, DEFAULT_CLIENT, METADATA_VERSION_1, METADATA_VERSION_3,
};

use super::*;

fn local_snapshot() -> Versions {
    let mut versions = Versions::new();
    for tag in [METADATA_VERSION_1, METADATA_VERSION_3] {
        let mut answers = Answers::new();
        answers.insert(DEFAULT_CLIENT.to_string(), json!({"containers": []}));
        answers.insert("10.0.0.5".to_string(), json!({"self": {}}));
        versions.insert(tag, answers);
    }
    versions
}

fn external_snapshot(marker: &str) -> Versions {
    let mut answers = Answers::new();
    answers.insert(DEFAULT_CLIENT.to_string(), json!({"environment_name": marker}));
    let mut versions = Versions::new();
    versions.insert(METADATA_VERSION_3, answers);
    versions
}

#[test]
fn test_empty_local_is_returned_unchanged() {
    let merged = merge_versions(Versions::new(), &[external_snapshot("x")], "tok");
    assert!(merged.is_empty());
}

#[test]
fn test_token_written_into_every_view_of_every_version() {
    let merged = merge_versions(local_snapshot(), &[], "tok-7");
    for tag in [METADATA_VERSION_1, METADATA_VERSION_3, "latest"] {
        let answers = merged.get(tag).unwrap();
        for (client, tree) in answers {
            assert_eq!(
                *tree.get("version").unwrap(),
                "tok-7",
                "missing token for {client} in {tag}"
            );
        }
    }
}

#[test]
fn test_environments_only_in_v3() {
    let merged = merge_versions(
        local_snapshot(),
        &[external_snapshot("peer-a"), external_snapshot("peer-b")],
        "tok",
    );

    let v3 = merged.get(METADATA_VERSION_3).unwrap();
    let environments = v3
        .get(DEFAULT_CLIENT)
        .unwrap()
        .get("environments")
        .unwrap();
    assert_eq!(
        environments,
        &json!([{"environment_name": "peer-a"}, {"environment_name": "peer-b"}])
    );

    let v1 = merged.get(METADATA_VERSION_1).unwrap();
    assert!(v1.get(DEFAULT_CLIENT).unwrap().get("environments").is_none());
}

#[test]
fn test_latest_tracks_merged_v3() {
    let merged = merge_versions(local_snapshot(), &[external_snapshot("peer")], "tok");
    assert_eq!(
        merged.get("latest").unwrap(),
        merged.get(METADATA_VERSION_3).unwrap()
    );
}

#[test]
fn test_merge_is_idempotent_modulo_token() {
    let external = [external_snapshot("peer")];

    let once = merge_versions(local_snapshot(), &external, "t1");
    let twice = merge_versions(
        merge_versions(local_snapshot(), &external, "t0"),
        &external,
        "t1",
    );

    assert_eq!(scrub_tokens(once), scrub_tokens(twice));
}

fn scrub_tokens(mut versions: Versions) -> Versions {
    let tags: Vec<String> = versions.tags().iter().map(|t| t.to_string()).collect();
    for tag in tags {
        if let Some(answers) = versions.get_mut(&tag) {
            for tree in answers.values_mut() {
                if let Value::Object(view) = tree {
                    view.remove("version");
                }
            }
        }
    }
    versions
}
