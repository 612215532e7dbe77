/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each entity store variable is stored in the user-provided
//! key-value store.
//!
//! # List of State Variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Node Ids|[`Vec<NodeId>`](crate::types::NodeId)|Every node that has been inserted, in insertion order. Used to list all nodes when the tree cache is (re)built.|
//! |Nodes|[`NodeId`](crate::types::NodeId) -> [`StoredNode`](crate::types::StoredNode)|Mapping between a node's id and its parent reference and height.|
//! |Node to Children|[`NodeId`](crate::types::NodeId) -> [`ChildrenList`](crate::types::ChildrenList)|Mapping between a node's id and the ids of its direct children. A node without children may have no entry.|
//!
//! # Persistence of state variables
//!
//! Each variable is stored as **Borsh-serialized values**. "Single values" (Node Ids) are stored at a
//! one-byte constant key. Mappings of the form "`A` -> `B`" are stored in multiple keys, each key being
//! the concatenation of the variable's one-byte prefix and the bytes of the `A` value.
//!
//! For example, the stored record of the node `"eng"` lives at `concat(&NODES, b"eng")`.
//!
//! If you need to set these variables, use
//! [`EntityStoreWriteBatch`](super::store::EntityStoreWriteBatch) rather than forming keys by hand.

// State variables
pub const NODE_IDS: [u8; 1] = [0];
pub const NODES: [u8; 1] = [1];
pub const NODE_TO_CHILDREN: [u8; 1] = [2];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
