pub mod node;
pub mod vocabulary;

pub use node::*;
pub use vocabulary::{ControlKind, FieldKind, FilterKind, TypedVariant};
