//! The persistent state of the hierarchy.
//!
//! # The Entity Store
//!
//! The entity store is the durable, transactional table of nodes from which the
//! [tree cache](crate::tree_cache) is built when the process starts, and rebuilt whenever the cache is
//! found to have diverged from it. It is the source of truth: every mutation is committed here first,
//! and only then applied to the cache.
//!
//! # Pluggable persistence
//!
//! - The entity store is kept in persistent storage, most probably in the host's filesystem.
//! - Library users get to choose how exactly this is done.
//! - This crate merely requires that whatever the user provides as a persistence mechanism implements
//!   the abstract functionality of a key-value store with atomic, batched writes.
//! - This abstract functionality is made concrete by the traits defined in the `pluggables` module.
//! - Wrap the implementation in a [`KVEntityStore`](store::KVEntityStore) and pass it to
//!   [`HierarchyCoordinator::new`](crate::coordinator::HierarchyCoordinator::new).
//!
//! Users with a store that is not naturally a key-value store (say, a relational database) can instead
//! implement [`EntityStore`](store::EntityStore) directly.

pub mod pluggables;

pub mod store;

pub mod variables;
