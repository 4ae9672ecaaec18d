use super::IdSet;
use crate::definition::vocabulary::{DECLARATIONS, IDENTIFIER, definition_body, definition_body_mut};
use crate::definition::{Mapping, Node};
use serde::{Deserialize, Serialize};

/// An entry of `DataSetIdentifierDeclarations`: an identifier the definition may
/// reference, plus whatever source fields the service attaches to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(rename = "Identifier")]
    pub identifier: String,
    #[serde(flatten)]
    pub source: Mapping,
}

impl Declaration {
    pub fn new(identifier: impl Into<String>, source: Mapping) -> Self {
        Self {
            identifier: identifier.into(),
            source,
        }
    }

    /// Reads a declaration from a tree node. Entries without a string `Identifier` are skipped.
    pub fn from_node(node: &Node) -> Option<Self> {
        let identifier = node.get_str(IDENTIFIER)?.to_string();
        let source = node
            .as_mapping()?
            .iter()
            .filter(|(key, _)| key.as_str() != IDENTIFIER)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Some(Self { identifier, source })
    }

    pub fn to_node(&self) -> Node {
        let mut map = Mapping::with_capacity(self.source.len() + 1);
        map.insert(IDENTIFIER.to_string(), Node::string(&self.identifier));
        map.extend(self.source.iter().map(|(k, v)| (k.clone(), v.clone())));
        Node::Mapping(map)
    }
}

/// Returns the ordered declaration list, or `None` if the definition has none.
pub fn declarations(tree: &Node) -> Option<Vec<Declaration>> {
    definition_body(tree)
        .get(DECLARATIONS)
        .and_then(Node::as_sequence)
        .map(|items| items.iter().filter_map(Declaration::from_node).collect())
}

/// The set of identifiers the definition declares. Empty when the list is missing,
/// which makes every scanned reference dangling; callers must tell the two apart.
pub fn valid_ids(tree: &Node) -> IdSet {
    declarations(tree)
        .unwrap_or_default()
        .into_iter()
        .map(|declaration| declaration.identifier)
        .collect()
}

/// Replaces the declaration list in place.
pub fn replace_declarations(tree: &mut Node, replacement: &[Declaration]) {
    let body = definition_body_mut(tree);
    body.insert(
        DECLARATIONS,
        Node::Sequence(replacement.iter().map(Declaration::to_node).collect()),
    );
}
