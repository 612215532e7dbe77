/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The in-memory, read-optimized projection of the hierarchy.
//!
//! # The Tree
//!
//! [`Tree`] is an arena: a single map from [`NodeId`] to [`Node`] owns every node, and parent/child
//! relationships are expressed as ids rather than references. All reads are served from this map in
//! O(1) per node.
//!
//! A `Tree` never persists anything. It is built from the flat list of nodes held by the
//! [entity store](crate::entity_store) with [`Tree::construct`], and afterwards mirrors every mutation
//! that the entity store has already committed. If it ever diverges from the store, the remedy is to
//! construct it again.
//!
//! `Tree` itself is not synchronized. Shared access goes through
//! [`HierarchyCoordinator`](crate::coordinator::HierarchyCoordinator), which guards it with a
//! read-write lock so that readers never observe a mutation half-way.
//!
//! # Reparent
//!
//! [`Tree::reparent`] does **not** move a subtree. The reparented node's direct children are first
//! promoted to the node's old parent, then the node alone moves under its new parent. Every node that
//! was below the reparented node ends up one level higher, and its height is lowered by one.

pub mod invariants;

use std::collections::{HashMap, HashSet};

use log::warn;
use thiserror::Error;

use crate::types::{Node, NodeId};

/// The hierarchy, held in memory.
#[derive(Clone, Debug, Default)]
pub struct Tree {
    root: Option<NodeId>,
    nodes: HashMap<NodeId, Node>,
}

/// Lifecycle and read methods.
impl Tree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a flat list of nodes, as returned by
    /// [`EntityStore::list_all_nodes`](crate::entity_store::store::EntityStore::list_all_nodes).
    ///
    /// `children` sets are re-derived from parent links. The node without a parent becomes the root.
    ///
    /// The list is trusted to describe a valid tree. Construction never fails: if there are several
    /// parentless nodes the last one wins, and a node whose parent is missing is kept unlinked.
    pub fn construct(nodes: Vec<Node>) -> Self {
        let mut tree = Tree::new();
        for mut node in nodes {
            node.children.clear();
            if node.parent.is_none() {
                tree.root = Some(node.id.clone());
            }
            tree.nodes.insert(node.id.clone(), node);
        }

        let links: Vec<(NodeId, NodeId)> = tree
            .nodes
            .values()
            .filter_map(|node| node.parent.clone().map(|parent| (parent, node.id.clone())))
            .collect();
        for (parent, child) in links {
            match tree.nodes.get_mut(&parent) {
                Some(parent_node) => {
                    parent_node.children.insert(child);
                }
                None => warn!("node {} refers to missing parent {}", child, parent),
            }
        }

        tree
    }

    /// Get the immediate children of `id`, in no particular order.
    ///
    /// The returned nodes are copies; the tree may keep changing while they are held.
    pub fn get_children(&self, id: &NodeId) -> Result<Vec<Node>, TreeError> {
        let node = self
            .nodes
            .get(id)
            .ok_or(TreeError::NodeNotFound { id: id.clone() })?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| self.nodes.get(child))
            .cloned()
            .collect())
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn root(&self) -> Option<&NodeId> {
        self.root.as_ref()
    }

    pub fn root_node(&self) -> Option<&Node> {
        self.root.as_ref().and_then(|root| self.nodes.get(root))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over every node, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get the ids on the path from `id`'s parent up to the root, nearest first.
    ///
    /// The walk stops early at a missing parent, and after `len()` steps, so it terminates even on a
    /// malformed tree.
    pub fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut res = Vec::new();
        let mut cursor = self.nodes.get(id).and_then(|node| node.parent.clone());
        while let Some(parent) = cursor {
            if res.len() == self.nodes.len() {
                break;
            }
            cursor = self.nodes.get(&parent).and_then(|node| node.parent.clone());
            res.push(parent);
        }
        res
    }
}

/// Mutators, and the checks that guard them.
///
/// The `check_*` methods report exactly the error the corresponding mutator would, without changing
/// anything. Callers that must do other work between validating and mutating (e.g., committing to the
/// entity store) call them first.
impl Tree {
    /// Check whether `node` can be inserted with [`emplace_node`](Self::emplace_node).
    pub fn check_emplace(&self, node: &Node) -> Result<(), TreeError> {
        // The empty id stands for "no parent" in the entity store.
        if node.id.is_empty() {
            return Err(TreeError::EmptyId);
        }
        if self.nodes.contains_key(&node.id) {
            return Err(TreeError::DuplicateId {
                id: node.id.clone(),
            });
        }

        // The first node becomes the root unconditionally.
        if self.root.is_none() {
            return Ok(());
        }

        match &node.parent {
            Some(parent) if self.nodes.contains_key(parent) => Ok(()),
            parent => Err(TreeError::InvalidParent {
                id: node.id.clone(),
                parent: parent.clone(),
            }),
        }
    }

    /// Insert a node that has already been persisted.
    ///
    /// `node.height` is stored as given; the caller computes it (parent's height + 1, or 0 for the
    /// root). If the tree has no root yet, `node` becomes the root.
    pub fn emplace_node(&mut self, node: Node) -> Result<(), TreeError> {
        self.check_emplace(&node)?;

        if self.root.is_none() {
            self.root = Some(node.id.clone());
        }
        if let Some(parent) = node.parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
            parent.children.insert(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Check whether `id` can be moved under `new_parent` with [`reparent`](Self::reparent).
    ///
    /// On success, returns the id of `id`'s current parent.
    pub fn check_reparent(&self, id: &NodeId, new_parent: &NodeId) -> Result<NodeId, TreeError> {
        let node = self
            .nodes
            .get(id)
            .ok_or(TreeError::NodeNotFound { id: id.clone() })?;
        if self.root.as_ref() == Some(id) {
            return Err(TreeError::RootImmutable { id: id.clone() });
        }
        if !self.nodes.contains_key(new_parent) {
            return Err(TreeError::NewParentNotFound {
                id: new_parent.clone(),
            });
        }
        if id == new_parent {
            return Err(TreeError::SelfCycle { id: id.clone() });
        }

        // Only reachable on a malformed tree: a second parentless node, or a dangling parent.
        match &node.parent {
            Some(parent) if self.nodes.contains_key(parent) => Ok(parent.clone()),
            Some(parent) => Err(TreeError::InvalidParent {
                id: id.clone(),
                parent: Some(parent.clone()),
            }),
            None => Err(TreeError::RootImmutable { id: id.clone() }),
        }
    }

    /// Make `new_parent` the parent of `id`, promoting `id`'s children to `id`'s old parent.
    ///
    /// Returns a copy of the moved node.
    pub fn reparent(&mut self, id: &NodeId, new_parent: &NodeId) -> Result<Node, TreeError> {
        let old_parent = self.check_reparent(id, new_parent)?;

        // 1. Move the children of `id` one level up, and lower every height in their subtrees.
        let moved_children: Vec<NodeId> = match self.nodes.get_mut(id) {
            Some(node) => node.children.drain().collect(),
            None => return Err(TreeError::NodeNotFound { id: id.clone() }),
        };
        for child in &moved_children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = Some(old_parent.clone());
            }
            self.lower_subtree(child);
        }

        // 2. Detach `id` from its old parent, which adopts the moved children.
        if let Some(old_parent_node) = self.nodes.get_mut(&old_parent) {
            old_parent_node.children.remove(id);
            old_parent_node.children.extend(moved_children);
        }

        // 3. Attach `id` to its new parent. The new parent's height is read after step 1, since it
        //    may have been one of the promoted nodes.
        let new_height = match self.nodes.get_mut(new_parent) {
            Some(new_parent_node) => {
                new_parent_node.children.insert(id.clone());
                new_parent_node.height.child()
            }
            None => {
                return Err(TreeError::NewParentNotFound {
                    id: new_parent.clone(),
                })
            }
        };

        let node = self
            .nodes
            .get_mut(id)
            .ok_or(TreeError::NodeNotFound { id: id.clone() })?;
        node.parent = Some(new_parent.clone());
        node.height = new_height;
        Ok(node.clone())
    }

    /// Lower the height of `start` and of every node below it by one.
    fn lower_subtree(&mut self, start: &NodeId) {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![start.clone()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&id) {
                node.height = node.height.promoted();
                stack.extend(node.children.iter().cloned());
            }
        }
    }
}

/// Error returned by [`Tree`] lookups and mutators.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {id} not found")]
    NodeNotFound { id: NodeId },

    #[error("new parent {id} not found")]
    NewParentNotFound { id: NodeId },

    #[error("node {id} already exists")]
    DuplicateId { id: NodeId },

    #[error("the empty string is not a valid node id")]
    EmptyId,

    #[error("parent {parent:?} of node {id} does not resolve to an existing node")]
    InvalidParent { id: NodeId, parent: Option<NodeId> },

    #[error("cannot change the parent of root node {id}")]
    RootImmutable { id: NodeId },

    #[error("node {id} cannot become its own parent")]
    SelfCycle { id: NodeId },
}
