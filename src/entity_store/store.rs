/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The durable side of the hierarchy: the [`EntityStore`] contract, and [`KVEntityStore`], its
//! implementation on top of a user-provided [`KVStore`].
//!
//! Every mutating method of `KVEntityStore` follows the same two-phase pattern:
//! 1. Read the current state through a [snapshot](KVStore::snapshot) and assemble all of the changes
//!    into a single [`EntityStoreWriteBatch`].
//! 2. Check the caller's deadline, then hand the batch to [`KVStore::write`], which commits all of the
//!    changes or none of them.
//!
//! Nothing is written before step 2, so a request that fails in step 1 or misses its deadline leaves
//! the store untouched.

use std::{collections::HashMap, time::Instant};

use borsh::BorshSerialize;
use log::debug;
use thiserror::Error;

use crate::types::{ChildrenList, Node, NodeId, StoredNode};

use super::{
    pluggables::{KVGet, KVGetError, KVStore, KVWriteError, Key, WriteBatch},
    variables::{self, concat},
};

/// The durable, transactional table of nodes that is the source of truth for the hierarchy.
///
/// Implementations must make `insert_node` and `reparent` atomic: either every change they describe is
/// committed, or none is. Both take a `deadline`, which is checked before the commit starts: if it
/// has already passed, the implementation must return [`StoreError::DeadlineExceeded`] without
/// committing anything. Once the commit has started it is not cancelled, even if it finishes after
/// the deadline.
pub trait EntityStore: Send + 'static {
    /// Every node in the store, with `children` left empty.
    fn list_all_nodes(&self) -> Result<Vec<Node>, StoreError>;

    /// Durably insert `node`. `node.height` must already be set by the caller.
    fn insert_node(&mut self, node: &Node, deadline: Instant) -> Result<(), StoreError>;

    /// Durably move `current` under `target`, promoting the direct children of `current` to its old
    /// parent and lowering the height of every node below `current` by one.
    fn reparent(&mut self, current: &Node, target: &Node, deadline: Instant)
        -> Result<(), StoreError>;
}

/// An [`EntityStore`] that keeps its variables in a [`KVStore`], laid out as described in
/// [`variables`](super::variables).
#[derive(Clone)]
pub struct KVEntityStore<K: KVStore>(K);

impl<K: KVStore> KVEntityStore<K> {
    pub fn new(kv_store: K) -> Self {
        KVEntityStore(kv_store)
    }

    /// Get a reference to the underlying key-value store.
    pub fn kv_store(&self) -> &K {
        &self.0
    }

    /// Atomically write the changes in `write_batch`, unless `deadline` has already passed.
    fn commit(
        &mut self,
        write_batch: EntityStoreWriteBatch<K::WriteBatch>,
        deadline: Instant,
    ) -> Result<(), StoreError> {
        if Instant::now() >= deadline {
            return Err(StoreError::DeadlineExceeded);
        }
        self.0.write(write_batch.0)?;
        Ok(())
    }
}

impl<K: KVStore> EntityStore for KVEntityStore<K> {
    fn list_all_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let snapshot = self.0.snapshot();
        let ids = snapshot.node_ids()?;
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            let stored = snapshot
                .stored_node(&id)?
                .ok_or(StoreError::NodeExpectedButNotFound { id: id.clone() })?;
            nodes.push(Node::from(stored));
        }
        debug!("listed {} nodes from the entity store", nodes.len());
        Ok(nodes)
    }

    fn insert_node(&mut self, node: &Node, deadline: Instant) -> Result<(), StoreError> {
        if node.id.is_empty() {
            return Err(StoreError::EmptyId);
        }

        let write_batch = {
            let snapshot = self.0.snapshot();
            if snapshot.stored_node(&node.id)?.is_some() {
                return Err(StoreError::DuplicateId {
                    id: node.id.clone(),
                });
            }

            let mut ids = snapshot.node_ids()?;
            let mut wb: EntityStoreWriteBatch<K::WriteBatch> = EntityStoreWriteBatch::new();

            // Mark the node as a child of its parent. The first node of an empty store is accepted
            // regardless of its parent reference.
            if let Some(parent) = &node.parent {
                match snapshot.stored_node(parent)? {
                    Some(_) => {
                        let mut siblings = snapshot.children(parent)?;
                        siblings.push(node.id.clone());
                        wb.set_children(parent, &siblings)?;
                    }
                    None if ids.is_empty() => (),
                    None => {
                        return Err(StoreError::ParentNotFound {
                            id: parent.clone(),
                        })
                    }
                }
            }

            ids.push(node.id.clone());
            wb.set_node_ids(&ids)?;
            wb.set_node(&StoredNode::from(node))?;
            wb
        };

        self.commit(write_batch, deadline)
    }

    fn reparent(
        &mut self,
        current: &Node,
        target: &Node,
        deadline: Instant,
    ) -> Result<(), StoreError> {
        if current.id == target.id {
            return Err(StoreError::SelfCycle {
                id: current.id.clone(),
            });
        }

        let write_batch = {
            let snapshot = self.0.snapshot();

            // Re-read both nodes: the stored records, not the caller's copies, are authoritative.
            let current = snapshot
                .stored_node(&current.id)?
                .ok_or(StoreError::NodeNotFound {
                    id: current.id.clone(),
                })?;
            let old_parent = current.parent.clone().ok_or(StoreError::RootImmutable {
                id: current.id.clone(),
            })?;
            let mut target = snapshot
                .stored_node(&target.id)?
                .ok_or(StoreError::NodeNotFound {
                    id: target.id.clone(),
                })?;

            let mut wb: EntityStoreWriteBatch<K::WriteBatch> = EntityStoreWriteBatch::new();
            let mut old_parent_children = snapshot.children(&old_parent)?;
            old_parent_children.remove(&current.id);

            // 1. Move every node below `current` one level up. Direct children of `current` are
            //    re-linked to its old parent; deeper descendants keep their parent.
            let mut promoted: HashMap<NodeId, StoredNode> = HashMap::new();
            let mut stack: Vec<NodeId> = snapshot.children(&current.id)?.into_iter().collect();
            while let Some(id) = stack.pop() {
                if promoted.contains_key(&id) {
                    continue;
                }
                let mut node = snapshot
                    .stored_node(&id)?
                    .ok_or(StoreError::NodeExpectedButNotFound { id: id.clone() })?;
                node.height = node.height.promoted();
                if node.parent.as_ref() == Some(&current.id) {
                    node.parent = Some(old_parent.clone());
                    old_parent_children.push(id.clone());
                }
                stack.extend(snapshot.children(&id)?);
                promoted.insert(id, node);
            }

            // 2. The target may itself have been promoted; its new height decides ours.
            if let Some(promoted_target) = promoted.get(&target.id) {
                target = promoted_target.clone();
            }

            // 3. Detach `current` from its old parent and attach it to the target.
            if target.id == old_parent {
                old_parent_children.push(current.id.clone());
            } else {
                let mut target_children = snapshot.children(&target.id)?;
                target_children.push(current.id.clone());
                wb.set_children(&target.id, &target_children)?;
            }
            wb.set_children(&old_parent, &old_parent_children)?;
            wb.delete_children(&current.id);

            for node in promoted.values() {
                wb.set_node(node)?;
            }
            wb.set_node(&StoredNode {
                id: current.id.clone(),
                parent: Some(target.id.clone()),
                height: target.height.child(),
            })?;

            debug!(
                "prepared reparent of {} from {} to {}, {} descendants promoted",
                current.id,
                old_parent,
                target.id,
                promoted.len()
            );
            wb
        };

        self.commit(write_batch, deadline)
    }
}

/// A set of changes to the entity store variables, to be committed atomically.
pub struct EntityStoreWriteBatch<W: WriteBatch>(W);

impl<W: WriteBatch> EntityStoreWriteBatch<W> {
    pub fn new() -> EntityStoreWriteBatch<W> {
        EntityStoreWriteBatch(W::new())
    }

    /* ↓↓↓ Node Ids ↓↓↓ */

    pub fn set_node_ids(&mut self, ids: &[NodeId]) -> Result<(), StoreError> {
        self.0.set(
            &variables::NODE_IDS,
            &ids.try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::NodeIds,
                    source: err,
                })?,
        );
        Ok(())
    }

    /* ↓↓↓ Node ↓↓↓ */

    pub fn set_node(&mut self, node: &StoredNode) -> Result<(), StoreError> {
        self.0.set(
            &concat(&variables::NODES, node.id.bytes()),
            &node
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::Node {
                        id: node.id.clone(),
                    },
                    source: err,
                })?,
        );
        Ok(())
    }

    /* ↓↓↓ Node to Children ↓↓↓ */

    pub fn set_children(&mut self, id: &NodeId, children: &ChildrenList) -> Result<(), StoreError> {
        if children.is_empty() {
            self.delete_children(id);
            return Ok(());
        }
        self.0.set(
            &concat(&variables::NODE_TO_CHILDREN, id.bytes()),
            &children
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::NodeChildren { id: id.clone() },
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn delete_children(&mut self, id: &NodeId) {
        self.0.delete(&concat(&variables::NODE_TO_CHILDREN, id.bytes()))
    }
}

impl<W: WriteBatch> Default for EntityStoreWriteBatch<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Error when writing a key-value pair to the [write batch][EntityStoreWriteBatch].
/// The error may arise when the value cannot be serialized, and hence cannot be
/// written to the write batch.
#[derive(Debug, Error)]
pub enum KVSetError {
    #[error("cannot serialize {key}: {source}")]
    SerializeValueError {
        key: Key,
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by an [`EntityStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error when trying to get a value from the underlying [key value store][KVStore].
    #[error(transparent)]
    KVGetError(#[from] KVGetError),

    /// Error when trying to set a value into the write batch.
    #[error(transparent)]
    KVSetError(#[from] KVSetError),

    /// The underlying key value store failed to commit the write batch.
    #[error(transparent)]
    KVWriteError(#[from] KVWriteError),

    /// The deadline passed before the change could be committed. Nothing was written.
    #[error("deadline exceeded before the transaction could commit")]
    DeadlineExceeded,

    #[error("node {id} is already stored")]
    DuplicateId { id: NodeId },

    /// The empty id is reserved for "no parent", so a node stored under it would read back as a root.
    #[error("the empty string is not a valid node id")]
    EmptyId,

    #[error("node {id} is not stored")]
    NodeNotFound { id: NodeId },

    #[error("parent {id} is not stored")]
    ParentNotFound { id: NodeId },

    #[error("cannot change the parent of root node {id}")]
    RootImmutable { id: NodeId },

    #[error("node {id} cannot become its own parent")]
    SelfCycle { id: NodeId },

    /// A node listed in the store's variables is missing, even though the store's own bookkeeping
    /// suggests that it should exist.
    #[error("node {id} is referenced by the store but its record is missing")]
    NodeExpectedButNotFound { id: NodeId },
}
