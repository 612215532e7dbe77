/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    slice,
};

use borsh::{BorshDeserialize, BorshSerialize};

/// String that uniquely identifies a node in the hierarchy.
///
/// Ids are assigned by the caller when a node is created and never change afterwards. The empty
/// string is reserved: wherever a parent reference is read from persistent storage, an empty id means
/// "this node has no parent". It is therefore never accepted as the id of a node.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new `NodeId` from anything that converts into a `String`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the bytes of the id, used to form keys in the key-value store.
    pub fn bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId(value)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Number of parent hops between a node and the root of the hierarchy.
///
/// Starts at 0 for the root, and increases by 1 for every level below it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct Height(u64);

impl Height {
    /// Create a new `Height` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// The height of the root.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the inner `u64` value of this `Height`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Height of a node placed directly below a node of this height.
    pub const fn child(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Height of this node after it moves one level up. Saturates at the root height.
    pub const fn promoted(&self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl Display for Height {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// List of the ids of the direct children of a node, as kept in the entity store's child index.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ChildrenList(Vec<NodeId>);

impl ChildrenList {
    pub fn new(children: Vec<NodeId>) -> Self {
        Self(children)
    }

    pub fn iter(&self) -> slice::Iter<NodeId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.0.contains(id)
    }

    /// Append `id` unless it is already present.
    pub fn push(&mut self, id: NodeId) {
        if !self.0.contains(&id) {
            self.0.push(id)
        }
    }

    pub fn remove(&mut self, id: &NodeId) {
        self.0.retain(|child| child != id)
    }
}

impl IntoIterator for ChildrenList {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<NodeId> for ChildrenList {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        let mut list = ChildrenList::default();
        for id in iter {
            list.push(id);
        }
        list
    }
}
