//! Types used across the hierarchy cache and its persistence layer.

pub mod data_types;

pub mod node;

pub use data_types::{ChildrenList, Height, NodeId};
pub use node::{Node, StoredNode};
