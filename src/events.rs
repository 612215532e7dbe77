//! Definitions of the events emitted by the [coordinator](crate::coordinator) for event handling and
//! logging.
//!
//! Note: an event for a given action indicates that the action has been completed (or, for failure
//! events, that it has definitively failed).

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::coordinator::Operation;
use crate::types::{Height, Node, NodeId};

#[derive(Clone, Debug)]
pub enum Event {
    // Events that change the hierarchy.
    EmplaceNode(EmplaceNodeEvent),
    ReparentNode(ReparentNodeEvent),
    // Events that concern the tree cache as a whole.
    RebuildCache(RebuildCacheEvent),
    // Failures.
    PersistenceFailure(PersistenceFailureEvent),
    InconsistentState(InconsistentStateEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // The event bus only goes away together with the coordinator.
            let _ = event_publisher.send(event);
        }
    }
}

/// A node was committed to the entity store and inserted into the tree cache.
#[derive(Clone, Debug)]
pub struct EmplaceNodeEvent {
    pub timestamp: SystemTime,
    pub node: Node,
}

/// A node was moved under a new parent, in the entity store and in the tree cache.
#[derive(Clone, Debug)]
pub struct ReparentNodeEvent {
    pub timestamp: SystemTime,
    pub node: NodeId,
    pub old_parent: NodeId,
    pub new_parent: NodeId,
    /// Height of `node` after the move.
    pub height: Height,
    /// Number of direct children of `node` that were promoted to `old_parent`.
    pub promoted_children: usize,
}

/// The tree cache was rebuilt from the entity store.
#[derive(Clone, Debug)]
pub struct RebuildCacheEvent {
    pub timestamp: SystemTime,
    pub nodes: usize,
}

/// The entity store rejected a mutation, or did not commit it in time. The tree cache was left
/// untouched.
#[derive(Clone, Debug)]
pub struct PersistenceFailureEvent {
    pub timestamp: SystemTime,
    pub operation: Operation,
    pub node: NodeId,
    pub error: String,
}

/// A mutation was committed to the entity store but could not be applied to the tree cache. The two
/// have diverged until the cache is [rebuilt](crate::coordinator::HierarchyCoordinator::rebuild_cache).
#[derive(Clone, Debug)]
pub struct InconsistentStateEvent {
    pub timestamp: SystemTime,
    pub operation: Operation,
    pub node: NodeId,
    pub reason: String,
}
