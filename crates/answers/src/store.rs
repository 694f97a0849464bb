//! Path resolution against a snapshot.
//!
//! Sequences support two lookup disciplines: a numeric segment is an index,
//! and a non-numeric segment is matched against the `name` (then `uuid`)
//! field of each child mapping, first match wins. This is what lets clients
//! ask for `/services/web/containers/web-1/uuid` instead of juggling array
//! positions.

use tracing::debug;

use crate::{AnswerTree, Versions, DEFAULT_CLIENT, MAGIC_LOOKUP_KEYS};

impl Versions {
    /// Resolve `path` for `client` within `version`.
    ///
    /// Fallbacks, in order: a client with no view of its own is retried as
    /// [`DEFAULT_CLIENT`]; a failed walk is retried once with every path
    /// segment lowercased. An empty path yields the whole tree.
    pub fn matching(&self, version: &str, client: &str, path: &[String]) -> Option<&AnswerTree> {
        let answers = self.get(version)?;

        let tree = match answers.get(client) {
            Some(tree) => tree,
            None => {
                if client == DEFAULT_CLIENT {
                    return None;
                }
                debug!(client, "no answers for client, trying {DEFAULT_CLIENT}");
                answers.get(DEFAULT_CLIENT)?
            }
        };

        if path.is_empty() {
            return Some(tree);
        }

        value_for_path(tree, path).or_else(|| {
            let lowered: Vec<String> = path.iter().map(|s| s.to_lowercase()).collect();
            debug!(?lowered, "not found, retrying lowercased");
            value_for_path(tree, &lowered)
        })
    }
}

/// Walk `path` segment by segment from `root`.
///
/// Mappings are indexed by key. Sequences accept a numeric index
/// (bounds-checked) or a magic-name scan over their mapping children.
/// Any other node type fails the walk.
pub fn value_for_path<'a>(root: &'a AnswerTree, path: &[String]) -> Option<&'a AnswerTree> {
    let mut node = root;

    for segment in path {
        node = match node {
            AnswerTree::Array(children) => match segment.parse::<usize>() {
                Ok(idx) => children.get(idx)?,
                Err(_) => magic_child(children, segment)?,
            },
            AnswerTree::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }

    Some(node)
}

/// Scan `children` left to right for a mapping whose `name` (or `uuid`)
/// equals `segment`. The first matching key on the first matching child
/// wins.
fn magic_child<'a>(children: &'a [AnswerTree], segment: &str) -> Option<&'a AnswerTree> {
    children.iter().find(|child| {
        MAGIC_LOOKUP_KEYS
            .iter()
            .any(|key| child.get(key).and_then(AnswerTree::as_str) == Some(segment))
    })
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
