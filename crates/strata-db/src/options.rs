//! Handle and stream options

use crate::db::Db;
use std::fmt;
use std::sync::Arc;
use strata_common::{Config, LayerId, NodeKey};
use strata_log::Storage;

/// Options for opening a handle
#[derive(Clone, Default)]
pub struct DbOptions {
    /// Store configuration
    pub config: Config,
    /// Already-open storage to use instead of a directory
    pub storage: Option<Arc<dyn Storage>>,
    /// Handle whose storage a derived handle shares
    pub parent: Option<Db>,
    /// Start at the head of this layer
    pub layer: Option<LayerId>,
    /// Freeze the handle at this node
    pub checkout: Option<NodeKey>,
    /// Named dataset, `None` for the default one
    pub dataset: Option<String>,
}

impl DbOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_layer(mut self, layer: impl Into<LayerId>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    #[must_use]
    pub fn with_checkout(mut self, head: impl Into<NodeKey>) -> Self {
        self.checkout = Some(head.into());
        self
    }

    #[must_use]
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    /// Create `<dir>/.dat` when it is missing
    #[must_use]
    pub const fn create_if_missing(mut self, create: bool) -> Self {
        self.config.storage.create_if_missing = create;
        self
    }

    pub(crate) fn with_parent(mut self, parent: Db) -> Self {
        self.parent = Some(parent);
        self
    }
}

impl fmt::Debug for DbOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbOptions")
            .field("config", &self.config)
            .field("storage", &self.storage.as_ref().map(|_| "<storage>"))
            .field("parent", &self.parent.is_some())
            .field("layer", &self.layer)
            .field("checkout", &self.checkout)
            .field("dataset", &self.dataset)
            .finish()
    }
}

/// Key range for read streams, in user-key space
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub lt: Option<String>,
    pub lte: Option<String>,
}

impl ReadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn gt(mut self, key: impl Into<String>) -> Self {
        self.gt = Some(key.into());
        self
    }

    #[must_use]
    pub fn gte(mut self, key: impl Into<String>) -> Self {
        self.gte = Some(key.into());
        self
    }

    #[must_use]
    pub fn lt(mut self, key: impl Into<String>) -> Self {
        self.lt = Some(key.into());
        self
    }

    #[must_use]
    pub fn lte(mut self, key: impl Into<String>) -> Self {
        self.lte = Some(key.into());
        self
    }
}

/// One write in a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: String, value: Vec<u8> },
    Del { key: String },
}

impl BatchOp {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self::Del { key: key.into() }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Del { key } => key,
        }
    }
}
