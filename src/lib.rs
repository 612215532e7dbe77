/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An in-memory cache of an organizational hierarchy, kept consistent with a durable entity store.
//!
//! The hierarchy is a rooted tree of [nodes](types::Node). Reads (e.g., "who reports to X?") are
//! served from the [tree cache](tree_cache). Writes are validated against the cache, committed to the
//! [entity store](entity_store), and only then applied to the cache. The
//! [coordinator](coordinator::HierarchyCoordinator) ties the two together and is the only type most
//! users need:
//!
//! ```no_run
//! # use std::time::Duration;
//! # use hierarchy_rs::{config::Configuration, coordinator::HierarchyCoordinator};
//! # use hierarchy_rs::entity_store::{pluggables::KVStore, store::KVEntityStore};
//! # use hierarchy_rs::types::NodeId;
//! # fn run<K: KVStore>(kv_store: K) -> Result<(), hierarchy_rs::coordinator::HierarchyError> {
//! let config = Configuration::builder()
//!     .persistence_timeout(Duration::from_secs(5))
//!     .build();
//! let hierarchy = HierarchyCoordinator::new(KVEntityStore::new(kv_store), config)?;
//!
//! hierarchy.emplace(NodeId::from("ceo"), None)?;
//! hierarchy.emplace(NodeId::from("cto"), Some(NodeId::from("ceo")))?;
//! hierarchy.emplace(NodeId::from("eng"), Some(NodeId::from("cto")))?;
//!
//! // "eng" moves under "ceo". It had no reports, so nothing else changes.
//! hierarchy.reparent(&NodeId::from("eng"), &NodeId::from("ceo"))?;
//! assert_eq!(hierarchy.get_children(&NodeId::from("ceo"))?.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! Persistence is pluggable: implement [`KVStore`](entity_store::pluggables::KVStore) for your
//! database and wrap it in a [`KVEntityStore`](entity_store::store::KVEntityStore), or implement
//! [`EntityStore`](entity_store::store::EntityStore) directly.

pub mod config;

pub mod coordinator;

pub mod entity_store;

pub(crate) mod event_bus;

pub mod events;

pub mod logging;

pub mod tree_cache;

pub mod types;
