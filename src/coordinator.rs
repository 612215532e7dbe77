/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The single entry point through which the hierarchy is read and mutated.
//!
//! # Write-then-cache
//!
//! [`HierarchyCoordinator`] owns both halves of the hierarchy: the durable
//! [entity store](crate::entity_store) and the in-memory [tree cache](crate::tree_cache). Every
//! mutation goes through the same steps:
//! 1. **Validate** the request against the tree cache. Invalid requests fail here with
//!    [`HierarchyError::Tree`] and have no side effects.
//! 2. **Persist** the mutation to the entity store in one transaction, bounded by a deadline. If this
//!    fails, the mutation fails with [`HierarchyError::Persistence`] and the cache is left untouched.
//! 3. **Apply** the same mutation to the tree cache.
//!
//! If step 3 fails after step 2 has committed, the store and the cache have diverged. This is
//! reported as [`HierarchyError::InconsistentState`], logged, and published as an
//! [`InconsistentStateEvent`]. Nothing is rolled back: the store is the source of truth, and
//! [`rebuild_cache`](HierarchyCoordinator::rebuild_cache) is the way back to a consistent cache.
//!
//! # Locking
//!
//! Mutations are serialized by a writer gate: a mutex around the entity store, held from step 1
//! through step 3, so that the cache state that a mutation was validated against is the state it is
//! applied to. Store transactions are therefore serialized too: two mutations never commit
//! concurrently, even when they touch disjoint parts of the hierarchy, and each one waits for the
//! store I/O of the mutations ahead of it.
//!
//! The tree cache sits in a separate read-write lock that is only write-locked for the short
//! in-memory step 3. Readers therefore run concurrently with each other and with an in-flight store
//! transaction, and only wait while a mutation is being applied to the cache.

use std::{
    fmt::{self, Display, Formatter},
    sync::{
        mpsc::{self, Sender},
        Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    thread::JoinHandle,
    time::{Duration, Instant, SystemTime},
};

use log::{debug, error};
use thiserror::Error;

use crate::{
    config::Configuration,
    entity_store::store::{EntityStore, StoreError},
    event_bus::start_event_bus,
    events::*,
    tree_cache::{invariants, Tree, TreeError},
    types::{Node, NodeId},
};

/// Reads and mutates the hierarchy, keeping the tree cache consistent with the entity store.
///
/// Create exactly one per entity store at startup and share it by reference (e.g., in an
/// [`Arc`](std::sync::Arc)) with every request handler.
pub struct HierarchyCoordinator<S: EntityStore> {
    store: Mutex<S>,
    tree: RwLock<Tree>,
    persistence_timeout: Duration,
    verify_invariants: bool,
    event_publisher: Option<Sender<Event>>,
    event_bus: Option<JoinHandle<()>>,
}

/// Lifecycle methods.
impl<S: EntityStore> HierarchyCoordinator<S> {
    /// Build the tree cache from everything in `store` and start serving from it.
    pub fn new(store: S, mut config: Configuration) -> Result<Self, HierarchyError> {
        let nodes = store.list_all_nodes()?;
        let tree = Tree::construct(nodes);
        debug!("bootstrapped tree cache with {} nodes", tree.len());

        let event_handlers = config.take_event_handlers();
        let (event_publisher, event_bus) = if event_handlers.is_empty() {
            (None, None)
        } else {
            let (event_publisher, event_subscriber) = mpsc::channel();
            (
                Some(event_publisher),
                Some(start_event_bus(event_handlers, event_subscriber)),
            )
        };

        Ok(HierarchyCoordinator {
            store: Mutex::new(store),
            tree: RwLock::new(tree),
            persistence_timeout: config.persistence_timeout,
            verify_invariants: config.verify_invariants,
            event_publisher,
            event_bus,
        })
    }

    /// Discard the tree cache and construct it again from the entity store.
    ///
    /// This is the only sanctioned way to recover from [`HierarchyError::InconsistentState`]. The new
    /// tree is built before the cache is write-locked, so readers keep being served from the old tree
    /// until the swap.
    pub fn rebuild_cache(&self) -> Result<usize, HierarchyError> {
        let store = self.lock_store();
        let tree = Tree::construct(store.list_all_nodes()?);
        let len = tree.len();
        *self.write_tree() = tree;
        drop(store);

        Event::publish(
            &self.event_publisher,
            Event::RebuildCache(RebuildCacheEvent {
                timestamp: SystemTime::now(),
                nodes: len,
            }),
        );
        Ok(len)
    }
}

/// Read methods. These are served purely from the tree cache.
impl<S: EntityStore> HierarchyCoordinator<S> {
    /// Get the immediate children of `id`, in no particular order.
    pub fn get_children(&self, id: &NodeId) -> Result<Vec<Node>, HierarchyError> {
        Ok(self.read_tree().get_children(id)?)
    }

    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.read_tree().node(id).cloned()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.read_tree().root().cloned()
    }

    pub fn len(&self) -> usize {
        self.read_tree().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_tree().is_empty()
    }

    /// Get a copy of the whole tree cache, as of one instant.
    pub fn snapshot(&self) -> Tree {
        self.read_tree().clone()
    }
}

/// Mutators.
impl<S: EntityStore> HierarchyCoordinator<S> {
    /// Create the node `id` under `parent`, with the configured persistence timeout.
    ///
    /// See [`emplace_with_timeout`](Self::emplace_with_timeout).
    pub fn emplace(&self, id: NodeId, parent: Option<NodeId>) -> Result<Node, HierarchyError> {
        self.emplace_with_timeout(id, parent, self.persistence_timeout)
    }

    /// Create the node `id` under `parent`, giving the entity store at most `timeout` to commit it.
    ///
    /// The node's height is derived from its parent. The first node of an empty hierarchy becomes the
    /// root whatever `parent` says, and is stored without a parent. In a non-empty hierarchy `parent`
    /// must name an existing node.
    pub fn emplace_with_timeout(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
        timeout: Duration,
    ) -> Result<Node, HierarchyError> {
        let deadline = Instant::now() + timeout;
        let mut store = self.lock_store();

        // 1. Validate.
        let node = {
            let tree = self.read_tree();
            let node = match parent {
                Some(parent) if tree.root().is_some() => {
                    let height = tree
                        .node(&parent)
                        .map(|parent_node| parent_node.height.child())
                        .unwrap_or_default();
                    Node::new_child(id, parent, height)
                }
                _ => Node::new_root(id),
            };
            tree.check_emplace(&node)?;
            node
        };

        // 2. Persist.
        if let Err(err) = store.insert_node(&node, deadline) {
            return Err(self.persistence_failure(Operation::Emplace, &node.id, err));
        }

        // 3. Apply.
        let mut tree = self.write_tree();
        tree.emplace_node(node.clone())
            .map_err(|err| self.inconsistent_state(Operation::Emplace, &node.id, err.into()))?;
        self.verify(&tree, Operation::Emplace, &node.id)?;
        drop(tree);
        drop(store);

        Event::publish(
            &self.event_publisher,
            Event::EmplaceNode(EmplaceNodeEvent {
                timestamp: SystemTime::now(),
                node: node.clone(),
            }),
        );
        Ok(node)
    }

    /// Move `id` under `new_parent`, with the configured persistence timeout.
    ///
    /// See [`reparent_with_timeout`](Self::reparent_with_timeout).
    pub fn reparent(&self, id: &NodeId, new_parent: &NodeId) -> Result<Node, HierarchyError> {
        self.reparent_with_timeout(id, new_parent, self.persistence_timeout)
    }

    /// Move `id` under `new_parent`, giving the entity store at most `timeout` to commit the move.
    ///
    /// The direct children of `id` do not follow it: they are promoted to `id`'s old parent, and every
    /// node that was below `id` ends up one level higher. Returns the moved node.
    pub fn reparent_with_timeout(
        &self,
        id: &NodeId,
        new_parent: &NodeId,
        timeout: Duration,
    ) -> Result<Node, HierarchyError> {
        let deadline = Instant::now() + timeout;
        let mut store = self.lock_store();

        // 1. Validate.
        let (current, target, old_parent) = {
            let tree = self.read_tree();
            let old_parent = tree.check_reparent(id, new_parent)?;
            match (tree.node(id), tree.node(new_parent)) {
                (Some(current), Some(target)) => (current.clone(), target.clone(), old_parent),
                (None, _) => return Err(TreeError::NodeNotFound { id: id.clone() }.into()),
                (_, None) => {
                    return Err(TreeError::NewParentNotFound {
                        id: new_parent.clone(),
                    }
                    .into())
                }
            }
        };

        // 2. Persist.
        if let Err(err) = store.reparent(&current, &target, deadline) {
            return Err(self.persistence_failure(Operation::Reparent, id, err));
        }

        // 3. Apply.
        let mut tree = self.write_tree();
        let moved = tree
            .reparent(id, new_parent)
            .map_err(|err| self.inconsistent_state(Operation::Reparent, id, err.into()))?;
        self.verify(&tree, Operation::Reparent, id)?;
        drop(tree);
        drop(store);

        Event::publish(
            &self.event_publisher,
            Event::ReparentNode(ReparentNodeEvent {
                timestamp: SystemTime::now(),
                node: moved.id.clone(),
                old_parent,
                new_parent: new_parent.clone(),
                height: moved.height,
                promoted_children: current.children.len(),
            }),
        );
        Ok(moved)
    }
}

/// Helpers.
impl<S: EntityStore> HierarchyCoordinator<S> {
    fn lock_store(&self) -> MutexGuard<'_, S> {
        // A panic while holding the gate cannot leave the store half-written: every store mutation
        // is a single atomic commit.
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check the invariants of `tree` if configured to.
    fn verify(&self, tree: &Tree, operation: Operation, id: &NodeId) -> Result<(), HierarchyError> {
        if !self.verify_invariants {
            return Ok(());
        }
        invariants::check(tree)
            .map_err(|violation| self.inconsistent_state(operation, id, violation.into()))
    }

    fn persistence_failure(
        &self,
        operation: Operation,
        id: &NodeId,
        err: StoreError,
    ) -> HierarchyError {
        debug!("{} of {} not persisted: {}", operation, id, err);
        Event::publish(
            &self.event_publisher,
            Event::PersistenceFailure(PersistenceFailureEvent {
                timestamp: SystemTime::now(),
                operation,
                node: id.clone(),
                error: err.to_string(),
            }),
        );
        HierarchyError::Persistence(err)
    }

    fn inconsistent_state(
        &self,
        operation: Operation,
        id: &NodeId,
        cause: CacheFailure,
    ) -> HierarchyError {
        error!(
            "{} of {} committed to the entity store but not applied to the tree cache: {}. \
             Rebuild the cache to recover.",
            operation, id, cause
        );
        Event::publish(
            &self.event_publisher,
            Event::InconsistentState(InconsistentStateEvent {
                timestamp: SystemTime::now(),
                operation,
                node: id.clone(),
                reason: cause.to_string(),
            }),
        );
        HierarchyError::InconsistentState {
            operation,
            id: id.clone(),
            source: cause,
        }
    }
}

impl<S: EntityStore> Drop for HierarchyCoordinator<S> {
    fn drop(&mut self) {
        // Closing the channel stops the event bus once it has fired the remaining events.
        self.event_publisher.take();
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }
    }
}

/// The kinds of mutation performed by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Emplace,
    Reparent,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Emplace => write!(f, "Emplace"),
            Operation::Reparent => write!(f, "Reparent"),
        }
    }
}

/// Why a committed mutation could not be applied to the tree cache.
#[derive(Debug, Error)]
pub enum CacheFailure {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("invariant violated: {0}")]
    Invariant(#[from] invariants::InvariantViolation),
}

/// Error returned by [`HierarchyCoordinator`].
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// The request was rejected before anything was written. Safe to retry with corrected input.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The entity store did not commit the mutation, and the tree cache was left untouched.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// The mutation was committed to the entity store but the tree cache could not follow. Not
    /// recoverable locally: [rebuild the cache](HierarchyCoordinator::rebuild_cache).
    #[error("{operation} of {id} left the tree cache inconsistent with the entity store: {source}")]
    InconsistentState {
        operation: Operation,
        id: NodeId,
        #[source]
        source: CacheFailure,
    },
}

impl HierarchyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HierarchyError::Tree(err) => match err {
                TreeError::NodeNotFound { .. } | TreeError::NewParentNotFound { .. } => {
                    ErrorKind::NotFound
                }
                TreeError::DuplicateId { .. } => ErrorKind::DuplicateId,
                TreeError::EmptyId => ErrorKind::InvalidId,
                TreeError::InvalidParent { .. } => ErrorKind::InvalidParent,
                TreeError::RootImmutable { .. } => ErrorKind::RootImmutable,
                TreeError::SelfCycle { .. } => ErrorKind::SelfCycle,
            },
            HierarchyError::Persistence(_) => ErrorKind::PersistenceFailure,
            HierarchyError::InconsistentState { .. } => ErrorKind::InconsistentState,
        }
    }

    /// Whether the request left no side effects, so that the caller may retry it (possibly with
    /// corrected input).
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::InconsistentState)
    }
}

/// Coordinator error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An unknown id was referenced
    NotFound,
    /// Id collision on insert
    DuplicateId,
    /// Insert of a node with the reserved empty id
    InvalidId,
    /// Parent reference unresolved on insert
    InvalidParent,
    /// Attempt to reparent the root
    RootImmutable,
    /// Node given as its own new parent
    SelfCycle,
    /// The entity store rejected the mutation or timed out
    PersistenceFailure,
    /// Tree cache update failed after a committed write
    InconsistentState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::DuplicateId => "duplicate_id",
            ErrorKind::InvalidId => "invalid_id",
            ErrorKind::InvalidParent => "invalid_parent",
            ErrorKind::RootImmutable => "root_immutable",
            ErrorKind::SelfCycle => "self_cycle",
            ErrorKind::PersistenceFailure => "persistence_failure",
            ErrorKind::InconsistentState => "inconsistent_state",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
