/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the coordinator's
//! [configuration](crate::config::Configuration::log_events).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReparentNode](crate::events::ReparentNodeEvent) is printed:
//!
//! ```text
//! ReparentNode, 1701329264, eng-platform, eng, cto, 2, 3
//! ```
//!
//! In the snippet, the remaining values are the moved node, its old parent, its new parent, its new
//! height, and the number of children promoted to the old parent.

use crate::events::*;
use log;
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const EMPLACE_NODE: &str = "EmplaceNode";
pub const REPARENT_NODE: &str = "ReparentNode";
pub const REBUILD_CACHE: &str = "RebuildCache";
pub const PERSISTENCE_FAILURE: &str = "PersistenceFailure";
pub const INCONSISTENT_STATE: &str = "InconsistentState";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for EmplaceNodeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |emplace_node_event: &EmplaceNodeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                EMPLACE_NODE,
                secs_since_unix_epoch(emplace_node_event.timestamp),
                emplace_node_event.node.id,
                emplace_node_event
                    .node
                    .parent
                    .as_ref()
                    .map_or("", |parent| parent.as_str()),
                emplace_node_event.node.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReparentNodeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reparent_node_event: &ReparentNodeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                REPARENT_NODE,
                secs_since_unix_epoch(reparent_node_event.timestamp),
                reparent_node_event.node,
                reparent_node_event.old_parent,
                reparent_node_event.new_parent,
                reparent_node_event.height,
                reparent_node_event.promoted_children
            )
        };
        Box::new(logger)
    }
}

impl Logger for RebuildCacheEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |rebuild_cache_event: &RebuildCacheEvent| {
            log::info!(
                "{}, {}, {}",
                REBUILD_CACHE,
                secs_since_unix_epoch(rebuild_cache_event.timestamp),
                rebuild_cache_event.nodes
            )
        };
        Box::new(logger)
    }
}

impl Logger for PersistenceFailureEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |persistence_failure_event: &PersistenceFailureEvent| {
            log::warn!(
                "{}, {}, {}, {}, {}",
                PERSISTENCE_FAILURE,
                secs_since_unix_epoch(persistence_failure_event.timestamp),
                persistence_failure_event.operation,
                persistence_failure_event.node,
                persistence_failure_event.error
            )
        };
        Box::new(logger)
    }
}

impl Logger for InconsistentStateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |inconsistent_state_event: &InconsistentStateEvent| {
            log::error!(
                "{}, {}, {}, {}, {}",
                INCONSISTENT_STATE,
                secs_since_unix_epoch(inconsistent_state_event.timestamp),
                inconsistent_state_event.operation,
                inconsistent_state_event.node,
                inconsistent_state_event.reason
            )
        };
        Box::new(logger)
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
