//! Snapshot merge.
//!
//! The controller republishes by folding every external snapshot's V3
//! `default` tree and a freshly minted opaque token into the local
//! snapshot. Only V3 views receive the `environments` list; every view of
//! every version receives the token under `version`.

use serde_json::Value;

use hostmeta_answers::{
    Versions, DEFAULT_CLIENT, ENVIRONMENTS_KEY, LATEST_TAG, METADATA_VERSION_3,
    SUPPORTED_VERSIONS, VERSION_KEY,
};

/// Merge external snapshots and the republish token into `local`.
///
/// An empty local snapshot merges to itself unchanged. `latest` is
/// re-tagged from the merged V3 answers so the alias observes the merge.
pub fn merge_versions(mut local: Versions, external: &[Versions], token: &str) -> Versions {
    if local.is_empty() {
        return local;
    }

    let environments: Vec<Value> = external
        .iter()
        .filter_map(|snapshot| snapshot.get(METADATA_VERSION_3))
        .filter_map(|answers| answers.get(DEFAULT_CLIENT))
        .cloned()
        .collect();

    for version in SUPPORTED_VERSIONS {
        let Some(answers) = local.get_mut(version) else {
            continue;
        };
        for tree in answers.values_mut() {
            if let Value::Object(view) = tree {
                if version == METADATA_VERSION_3 {
                    view.insert(
                        ENVIRONMENTS_KEY.to_string(),
                        Value::Array(environments.clone()),
                    );
                }
                view.insert(VERSION_KEY.to_string(), Value::String(token.to_string()));
            }
        }
    }

    if let Some(newest) = local.get(METADATA_VERSION_3).cloned() {
        local.insert(LATEST_TAG, newest);
    }

    local
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod tests;
