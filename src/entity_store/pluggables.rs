//! Traits for pluggable entity store persistence.

use std::fmt::Display;

use borsh::BorshDeserialize;
use thiserror::Error;

use crate::types::{ChildrenList, NodeId, StoredNode};

use super::variables::{self, concat};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;
    type Snapshot<'a>: 'a + KVGet;

    /// Atomically apply every change in `wb`. If this returns an error, none of the changes may be
    /// visible afterwards.
    fn write(&mut self, wb: Self::WriteBatch) -> Result<(), KVWriteError>;
    fn clear(&mut self);
    fn snapshot<'b>(&'b self) -> Self::Snapshot<'_>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Node Ids ↓↓↓ */

    fn node_ids(&self) -> Result<Vec<NodeId>, KVGetError> {
        if let Some(bytes) = self.get(&variables::NODE_IDS) {
            Vec::<NodeId>::deserialize(&mut bytes.as_slice()).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::NodeIds,
                    source: err,
                }
            })
        } else {
            Ok(Vec::new())
        }
    }

    /* ↓↓↓ Node ↓↓↓ */

    fn stored_node(&self, id: &NodeId) -> Result<Option<StoredNode>, KVGetError> {
        if let Some(bytes) = self.get(&concat(&variables::NODES, id.bytes())) {
            Ok(Some(StoredNode::deserialize(&mut bytes.as_slice()).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::Node { id: id.clone() },
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Node to Children ↓↓↓ */

    fn children(&self, id: &NodeId) -> Result<ChildrenList, KVGetError> {
        if let Some(bytes) = self.get(&concat(&variables::NODE_TO_CHILDREN, id.bytes())) {
            ChildrenList::deserialize(&mut bytes.as_slice()).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::NodeChildren { id: id.clone() },
                    source: err,
                }
            })
        } else {
            Ok(ChildrenList::default())
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error arises when the value corresponding to a given key cannot be deserialized into its
/// expected type.
#[derive(Debug, Error)]
pub enum KVGetError {
    #[error("cannot deserialize {key}: {source}")]
    DeserializeValueError {
        key: Key,
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by [`KVStore::write`] when the store refuses or fails to commit a write batch.
#[derive(Debug, Error)]
#[error("key-value store rejected write batch: {source}")]
pub struct KVWriteError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl KVWriteError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        KVWriteError {
            source: source.into(),
        }
    }
}

#[derive(Debug)]
pub enum Key {
    NodeIds,
    Node { id: NodeId },
    NodeChildren { id: NodeId },
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::NodeIds => write!(f, "Node Ids"),
            Key::Node { id } => write!(f, "Node {}", id),
            Key::NodeChildren { id } => write!(f, "Children of node {}", id),
        }
    }
}
