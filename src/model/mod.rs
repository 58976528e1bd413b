//! Core data model types for shortcut_smt

mod hash;
mod node;

pub use hash::Hash;
pub use node::{LeafData, LeafValue, Node, NodeId, NodeKind};
