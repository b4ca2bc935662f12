//! Core type definitions for Strata
//!
//! This module defines the commit-log data model: node and layer
//! identifiers, operations, committed nodes, and the pointers that the
//! secondary indices store.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Change number. Strictly increasing along any single lineage.
pub type Change = u64;

/// Content address of a node in the log (lowercase hex)
#[derive(
    Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[display("{_0}")]
pub struct NodeKey(String);

impl NodeKey {
    /// Wrap an existing content address
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({})", self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Identifier of a layer (branch).
///
/// A layer is named after the node that started it: the root node for the
/// root layer, or the first node committed after a fork.
#[derive(
    Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[display("{_0}")]
pub struct LayerId(String);

impl LayerId {
    /// Wrap an existing layer identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the node that started this layer
    #[must_use]
    pub fn node_key(&self) -> NodeKey {
        NodeKey(self.0.clone())
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({})", self.0)
    }
}

impl From<NodeKey> for LayerId {
    fn from(key: NodeKey) -> Self {
        Self(key.0)
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Kind of a single operation inside a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum OpKind {
    #[display("put")]
    Put,
    #[display("del")]
    Delete,
}

/// A single write inside a node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Put or delete
    pub kind: OpKind,
    /// Named dataset, `None` for the default one
    pub dataset: Option<String>,
    /// User key
    pub key: String,
    /// Encoded value, present only for puts
    pub value: Option<Vec<u8>>,
}

impl Operation {
    /// Create a put operation
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: OpKind::Put,
            dataset: None,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Create a delete (tombstone) operation
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: OpKind::Delete,
            dataset: None,
            key: key.into(),
            value: None,
        }
    }

    /// Scope the operation to a named dataset
    #[must_use]
    pub fn with_dataset(mut self, dataset: Option<String>) -> Self {
        self.dataset = dataset.filter(|d| !d.is_empty());
        self
    }

    /// Dataset segment used in the latest index (empty for the default)
    #[must_use]
    pub fn dataset_segment(&self) -> &str {
        self.dataset.as_deref().unwrap_or("")
    }

    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self.kind, OpKind::Delete)
    }
}

/// Immutable commit record in the log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Content address
    pub key: NodeKey,
    /// Log-local change number
    pub change: Change,
    /// Parent node keys; `links[0]` defines the lineage
    pub links: Vec<NodeKey>,
    /// Operations, applied atomically
    pub operations: Vec<Operation>,
}

impl Node {
    /// Lineage-defining parent, if any
    #[must_use]
    pub fn parent(&self) -> Option<&NodeKey> {
        self.links.first()
    }

    /// A node without links starts a root layer
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.links.is_empty()
    }
}

/// Errors from parsing a pointer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("pointer has no separator: {0}")]
    MissingSeparator(String),
    #[error("pointer has an invalid operation index: {0}")]
    InvalidIndex(String),
}

/// Reference to one operation inside one node, encoded `<nodeKey>!<index>`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub node: NodeKey,
    pub index: usize,
}

impl Pointer {
    #[must_use]
    pub const fn new(node: NodeKey, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.node, self.index)
    }
}

impl FromStr for Pointer {
    type Err = PointerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node, index) = s
            .rsplit_once('!')
            .ok_or_else(|| PointerError::MissingSeparator(s.to_string()))?;
        let index = index
            .parse::<usize>()
            .map_err(|_| PointerError::InvalidIndex(s.to_string()))?;
        Ok(Self {
            node: NodeKey::new(node),
            index,
        })
    }
}

/// One entry of a layer stack: a layer and the change bound reads use in it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub change: Change,
    pub layer: LayerId,
}

impl LayerEntry {
    #[must_use]
    pub const fn new(change: Change, layer: LayerId) -> Self {
        Self { change, layer }
    }
}

/// Layers from the current one back to the root, nearest first
pub type LayerStack = Vec<LayerEntry>;
