//! User-defined parameters of a [`HierarchyCoordinator`](crate::coordinator::HierarchyCoordinator).
//!
//! ```
//! # use std::time::Duration;
//! # use hierarchy_rs::config::Configuration;
//! let config = Configuration::builder()
//!     .persistence_timeout(Duration::from_secs(5))
//!     .verify_invariants(false)
//!     .log_events(true)
//!     .on_inconsistent_state(|event| eprintln!("cache diverged at {}", event.node))
//!     .build();
//! ```

use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::event_bus::{EventHandlers, HandlerPtr};
use crate::events::*;

/// Stores the user-defined parameters required to run the coordinator, that is:
/// 1. The persistence timeout, i.e., how long a mutation may wait for the entity store to commit
///    before it is abandoned. Used by the mutators that don't take an explicit timeout.
/// 2. The "Verify Invariants" flag. If set, the whole tree cache is checked against its
///    [invariants](crate::tree_cache::invariants) after every mutation, and a violation is reported
///    as an inconsistent state. This is O(n) per mutation.
/// 3. The "Log Events" flag. If set, every [event](crate::events) is logged.
/// 4. Optional event handlers.
///
/// ## Log Events
///
/// This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc =
    "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.persistence_timeout(...)`

    Optional:
    - `.verify_invariants(...)`
    - `.log_events(...)`
    - `.on_emplace_node(...)`
    - `.on_reparent_node(...)`
    - `.on_rebuild_cache(...)`
    - `.on_persistence_failure(...)`
    - `.on_inconsistent_state(...)`
"
))]
pub struct Configuration {
    #[builder(setter(doc = "Set the default time allowed for a mutation to be committed to the entity store. Required."))]
    pub persistence_timeout: Duration,
    #[builder(default = false, setter(doc = "Check the tree cache's invariants after every mutation? Defaults to false."))]
    pub verify_invariants: bool,
    #[builder(default = true, setter(doc = "Enable logging of events? Defaults to true."))]
    pub log_events: bool,
    #[builder(default, setter(transform = |handler: impl Fn(&EmplaceNodeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EmplaceNodeEvent>),
    doc = "Register a handler closure to be invoked after a node is inserted. Optional."))]
    on_emplace_node: Option<HandlerPtr<EmplaceNodeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReparentNodeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReparentNodeEvent>),
    doc = "Register a handler closure to be invoked after a node is moved under a new parent. Optional."))]
    on_reparent_node: Option<HandlerPtr<ReparentNodeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RebuildCacheEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RebuildCacheEvent>),
    doc = "Register a handler closure to be invoked after the tree cache is rebuilt from the entity store. Optional."))]
    on_rebuild_cache: Option<HandlerPtr<RebuildCacheEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PersistenceFailureEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PersistenceFailureEvent>),
    doc = "Register a handler closure to be invoked after the entity store fails to commit a mutation. Optional."))]
    on_persistence_failure: Option<HandlerPtr<PersistenceFailureEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&InconsistentStateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InconsistentStateEvent>),
    doc = "Register a handler closure to be invoked when the tree cache diverges from the entity store. Use this to alert operators. Optional."))]
    on_inconsistent_state: Option<HandlerPtr<InconsistentStateEvent>>,
}

impl Configuration {
    /// Split off the event handlers, leaving the plain parameters behind.
    pub(crate) fn take_event_handlers(&mut self) -> EventHandlers {
        EventHandlers::new(
            self.log_events,
            self.on_emplace_node.take(),
            self.on_reparent_node.take(),
            self.on_rebuild_cache.take(),
            self.on_persistence_failure.take(),
            self.on_inconsistent_state.take(),
        )
    }
}
