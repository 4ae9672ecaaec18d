use super::IdSet;
use crate::definition::Node;
use crate::definition::vocabulary::DATA_SET_IDENTIFIER;

/// Collects every `DataSetIdentifier` string value in the tree, at any depth.
pub fn scan(tree: &Node) -> IdSet {
    let mut found = IdSet::new();
    collect_references(tree, &mut found);
    found
}

fn collect_references(node: &Node, found: &mut IdSet) {
    match node {
        Node::Mapping(map) => {
            for (key, value) in map {
                if key == DATA_SET_IDENTIFIER {
                    if let Some(id) = value.as_str() {
                        found.insert(id.to_string());
                        continue;
                    }
                }
                collect_references(value, found);
            }
        }
        Node::Sequence(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        Node::Scalar(_) => {}
    }
}

/// Returns true if any reference inside `node` is a member of `ids`.
pub fn references_any(node: &Node, ids: &IdSet) -> bool {
    match node {
        Node::Mapping(map) => map.iter().any(|(key, value)| {
            if key == DATA_SET_IDENTIFIER {
                if let Some(id) = value.as_str() {
                    return ids.contains(id);
                }
            }
            references_any(value, ids)
        }),
        Node::Sequence(items) => items.iter().any(|item| references_any(item, ids)),
        Node::Scalar(_) => false,
    }
}

/// Returns true if `node` is a mapping that itself carries a reference in `ids`.
pub(super) fn holds_reference(node: &Node, ids: &IdSet) -> bool {
    node.get_str(DATA_SET_IDENTIFIER)
        .is_some_and(|id| ids.contains(id))
}
