use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// Keyed children of a mapping node. Insertion order is preserved so a repaired
/// definition serializes in the order it was read.
pub type Mapping = IndexMap<String, Node>;

/// Leaf values of a definition tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// A node of an asset definition tree.
///
/// Definitions returned by the analytics service have no fixed depth or shape:
/// references hide inside filters, controls, visuals and field wells at varying
/// depths. Every algorithm in this crate walks this one recursive type instead of
/// reaching for fields by name on loosely typed maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

impl Default for Node {
    fn default() -> Self {
        Node::Scalar(Scalar::Null)
    }
}

impl Node {
    /// An empty mapping node.
    pub fn mapping() -> Self {
        Node::Mapping(Mapping::new())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Node::Scalar(Scalar::String(value.into()))
    }

    /// Parses a definition tree from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Value>(json).map(Node::from)
    }

    /// Serializes the tree as indented JSON.
    pub fn to_json_pretty(&self) -> String {
        // A tree built from `Value` always serializes; the fallback only guards
        // against non-finite numbers slipping in through `Number`.
        serde_json::to_string_pretty(&Value::from(self.clone())).unwrap_or_default()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Node::Scalar(Scalar::Number(n)) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key on a mapping node. Any other node kind yields `None`.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.as_mapping_mut().and_then(|map| map.get_mut(key))
    }

    /// Follows a chain of mapping keys.
    pub fn get_path(&self, path: &[&str]) -> Option<&Node> {
        path.iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn get_path_mut(&mut self, path: &[&str]) -> Option<&mut Node> {
        path.iter().try_fold(self, |node, key| node.get_mut(key))
    }

    /// Shorthand for `get(key)` followed by `as_str`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }

    /// Inserts into a mapping node, returning the previous value. No-op on other kinds.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        self.as_mapping_mut()
            .and_then(|map| map.insert(key.into(), value))
    }

    /// Removes a key from a mapping node while keeping the order of its siblings.
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.as_mapping_mut().and_then(|map| map.shift_remove(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Applies `f` to every string scalar in the tree, depth first.
    /// Returns whether `f` reported a change for any of them.
    pub fn for_each_string_mut<F>(&mut self, f: &mut F) -> bool
    where
        F: FnMut(&mut String) -> bool,
    {
        match self {
            Node::Scalar(Scalar::String(s)) => f(s),
            Node::Scalar(_) => false,
            Node::Sequence(items) => {
                let mut changed = false;
                for item in items.iter_mut() {
                    changed |= item.for_each_string_mut(f);
                }
                changed
            }
            Node::Mapping(map) => {
                let mut changed = false;
                for item in map.values_mut() {
                    changed |= item.for_each_string_mut(f);
                }
                changed
            }
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Scalar(Scalar::Null),
            Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Node::Scalar(Scalar::Number(n)),
            Value::String(s) => Node::Scalar(Scalar::String(s)),
            Value::Array(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => {
                Node::Mapping(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        match node {
            Node::Scalar(Scalar::Null) => Value::Null,
            Node::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            Node::Scalar(Scalar::Number(n)) => Value::Number(n),
            Node::Scalar(Scalar::String(s)) => Value::String(s),
            Node::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Node::Mapping(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::string(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::string(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Sequence(items)
    }
}

impl From<Mapping> for Node {
    fn from(map: Mapping) -> Self {
        Node::Mapping(map)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Scalar(s) => write!(f, "{}", s),
            Node::Sequence(items) => write!(f, "[{} items]", items.len()),
            Node::Mapping(map) => write!(f, "{{{} keys}}", map.len()),
        }
    }
}
