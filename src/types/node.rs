//! Definition of the [`Node`] type and its persisted form, [`StoredNode`].

use std::collections::HashSet;

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{Height, NodeId};

/// One entity in the hierarchy.
///
/// Adjacency is bidirectional: a child names its parent in `parent`, and the parent lists the child in
/// `children`. Both directions are kept in agreement by [`Tree`](crate::tree_cache::Tree); a `Node`
/// obtained from a read is a snapshot and may be freely held while the tree continues to change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub height: Height,
    pub children: HashSet<NodeId>,
}

impl Node {
    /// Create a node with no parent and height 0.
    pub fn new_root(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            height: Height::init(),
            children: HashSet::new(),
        }
    }

    /// Create a childless node under `parent` at the given `height`.
    ///
    /// The caller is responsible for `height` being the parent's height + 1.
    pub fn new_child(id: impl Into<NodeId>, parent: impl Into<NodeId>, height: Height) -> Self {
        Self {
            id: id.into(),
            parent: Some(parent.into()),
            height,
            children: HashSet::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn has_child(&self, id: &NodeId) -> bool {
        self.children.contains(id)
    }
}

/// The shape in which a node is kept in the entity store.
///
/// Children are not part of the stored record; the store keeps a separate child index, and
/// [`Tree::construct`](crate::tree_cache::Tree::construct) re-derives `children` from parent links.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StoredNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub height: Height,
}

impl From<&Node> for StoredNode {
    fn from(node: &Node) -> Self {
        StoredNode {
            id: node.id.clone(),
            parent: node.parent.clone(),
            height: node.height,
        }
    }
}

impl From<StoredNode> for Node {
    fn from(stored: StoredNode) -> Self {
        Node {
            id: stored.id,
            parent: stored.parent.filter(|parent| !parent.is_empty()),
            height: stored.height,
            children: HashSet::new(),
        }
    }
}
