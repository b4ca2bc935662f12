//! Storage collaborator interface
//!
//! The versioning layer never touches tables directly. It appends nodes,
//! looks up nodes, heads and layers, and scans the ordered data index
//! through this trait, so alternative log engines can be plugged in.

use crate::error::LogResult;
use crate::replication::{LogReplication, ReplicateOptions, WireNode};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::ops::Bound;
use std::sync::Arc;
use strata_common::{Change, LayerId, Node, NodeKey, Operation};

/// Key range over the ordered data index
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub lt: Option<String>,
    pub lte: Option<String>,
    /// Iterate from the upper bound down
    pub reverse: bool,
    /// Maximum number of entries
    pub limit: Option<usize>,
}

impl KeyRange {
    /// Lower bound; `gte` wins over `gt`
    #[must_use]
    pub fn lower(&self) -> Bound<&str> {
        match (&self.gte, &self.gt) {
            (Some(k), _) => Bound::Included(k.as_str()),
            (None, Some(k)) => Bound::Excluded(k.as_str()),
            (None, None) => Bound::Unbounded,
        }
    }

    /// Upper bound; `lte` wins over `lt`
    #[must_use]
    pub fn upper(&self) -> Bound<&str> {
        match (&self.lte, &self.lt) {
            (Some(k), _) => Bound::Included(k.as_str()),
            (None, Some(k)) => Bound::Excluded(k.as_str()),
            (None, None) => Bound::Unbounded,
        }
    }

    /// True when no key can satisfy both bounds
    #[must_use]
    pub fn is_empty(&self) -> bool {
        if self.limit == Some(0) {
            return true;
        }
        match (self.lower(), self.upper()) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo) | Bound::Excluded(lo), Bound::Excluded(hi))
            | (Bound::Excluded(lo), Bound::Included(hi)) => lo >= hi,
            _ => false,
        }
    }
}

/// Options for reading the log in change order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangesOptions {
    /// Only nodes with a change number greater than this
    pub since: Change,
    /// Maximum number of nodes
    pub limit: Option<usize>,
}

/// Append-only content-addressed log with head, layer and data indices
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Append a node linking to `links` and index its operations.
    ///
    /// Returns the stored node and the layer the log assigned it to. A
    /// node whose parent is not the head of its layer starts a new layer.
    async fn add(
        &self,
        links: Vec<NodeKey>,
        operations: Vec<Operation>,
    ) -> LogResult<(Node, LayerId)>;

    /// Fetch a node by key
    async fn get(&self, key: &NodeKey) -> LogResult<Node>;

    /// Append a node received from a peer. `None` if it is already present.
    async fn import(&self, node: WireNode) -> LogResult<Option<(Node, LayerId)>>;

    /// Layer a node belongs to
    async fn layer_of(&self, key: &NodeKey) -> LogResult<LayerId>;

    /// Current head of a layer
    async fn head(&self, layer: &LayerId) -> LogResult<Option<NodeKey>>;

    /// Default layer, if one has been recorded
    async fn main_layer(&self) -> LogResult<Option<LayerId>>;

    /// Point lookup in the data index
    async fn data_get(&self, key: &str) -> LogResult<Option<String>>;

    /// Range scan over the data index
    fn data_range(&self, range: KeyRange) -> BoxStream<'static, LogResult<(String, String)>>;

    /// All `(layer, head)` pairs
    fn heads(&self) -> BoxStream<'static, LogResult<(LayerId, NodeKey)>>;

    /// Nodes in change order
    fn changes(&self, options: ChangesOptions) -> BoxStream<'static, LogResult<Node>>;

    /// Make every appended node durable
    async fn flush(&self) -> LogResult<()>;

    /// Start the log side of a replication session
    fn replicate(self: Arc<Self>, options: ReplicateOptions) -> LogReplication;
}
