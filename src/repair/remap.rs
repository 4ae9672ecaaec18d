use super::validity::Declaration;
use crate::definition::Node;
use crate::definition::vocabulary::DATA_SET_IDENTIFIER;
use ahash::AHashMap;
use tracing::warn;

/// Old identifier -> new identifier.
pub type IdMapping = AHashMap<String, String>;

/// Pairs declarations by position: the Nth original identifier maps to the Nth
/// new one, regardless of names. Extra entries on either side are ignored.
///
/// Reordering one list relative to the other silently produces a wrong mapping;
/// nothing here can detect that.
pub fn build_mapping(original: &[Declaration], new: &[Declaration]) -> IdMapping {
    if original.len() != new.len() {
        warn!(
            original = original.len(),
            new = new.len(),
            "declaration lists differ in length; only the common prefix is remapped"
        );
    }
    original
        .iter()
        .zip(new)
        .map(|(from, to)| (from.identifier.clone(), to.identifier.clone()))
        .collect()
}

/// Rewrites every `DataSetIdentifier` value that has an entry in `mapping`.
/// Each value is looked up once, so swaps (`A -> B`, `B -> A`) are safe.
pub fn apply_mapping(tree: &mut Node, mapping: &IdMapping) -> bool {
    if mapping.is_empty() {
        return false;
    }
    rewrite(tree, mapping)
}

fn rewrite(node: &mut Node, mapping: &IdMapping) -> bool {
    let mut changed = false;
    match node {
        Node::Mapping(map) => {
            for (key, value) in map.iter_mut() {
                if key == DATA_SET_IDENTIFIER {
                    if let Some(replacement) = value.as_str().and_then(|id| mapping.get(id)) {
                        if value.as_str() != Some(replacement.as_str()) {
                            *value = Node::string(replacement.clone());
                            changed = true;
                        }
                        continue;
                    }
                }
                changed |= rewrite(value, mapping);
            }
        }
        Node::Sequence(items) => {
            for item in items.iter_mut() {
                changed |= rewrite(item, mapping);
            }
        }
        Node::Scalar(_) => {}
    }
    changed
}
