//! Opened state of a handle
//!
//! A session owns the storage reference and the handle's cached position
//! (head node, layer stack). Reads take a snapshot of the position without
//! waiting on writers; only the commit sequencer replaces it, while holding
//! the commit lock.

use crate::chain::resolve_layers;
use crate::error::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use strata_common::{Change, LayerEntry, LayerId, LayerStack, NodeKey};
use strata_log::Storage;
use tokio::sync::Mutex;

/// Cached position of a handle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Position {
    /// Head node the handle last observed or wrote
    pub head: Option<NodeKey>,
    /// Layers from the handle's own back to the root
    pub layers: LayerStack,
}

impl Position {
    /// Handle's own layer and its change bound
    #[must_use]
    pub fn front(&self) -> Option<&LayerEntry> {
        self.layers.first()
    }

    #[must_use]
    pub fn layer(&self) -> Option<&LayerId> {
        self.front().map(|e| &e.layer)
    }

    #[must_use]
    pub fn change(&self) -> Change {
        self.front().map_or(0, |e| e.change)
    }
}

pub(crate) struct Session {
    pub(crate) storage: Arc<dyn Storage>,
    /// Frozen handles always read through the changes index
    pub(crate) frozen: bool,
    /// Dataset segment, empty for the default dataset
    pub(crate) dataset: String,
    /// Stream and channel buffer size
    pub(crate) buffer: usize,
    position: RwLock<Position>,
    pub(crate) commit_lock: Mutex<()>,
}

impl Session {
    pub(crate) fn empty(storage: Arc<dyn Storage>, dataset: String, buffer: usize) -> Self {
        Self {
            storage,
            frozen: false,
            dataset,
            buffer,
            position: RwLock::new(Position::default()),
            commit_lock: Mutex::new(()),
        }
    }

    /// Position a session at `head`, resolving its layer stack
    pub(crate) async fn at(
        storage: Arc<dyn Storage>,
        head: NodeKey,
        frozen: bool,
        dataset: String,
        buffer: usize,
    ) -> Result<Self> {
        let layers = resolve_layers(storage.as_ref(), &head).await?;
        let mut session = Self::empty(storage, dataset, buffer);
        session.frozen = frozen;
        *session.position.get_mut() = Position {
            head: Some(head),
            layers,
        };
        Ok(session)
    }

    pub(crate) fn position(&self) -> Position {
        self.position.read().clone()
    }

    /// Replace the cached position. Callers hold `commit_lock`.
    pub(crate) fn set_position(&self, position: Position) {
        *self.position.write() = position;
    }

    /// Dataset as stored on operations
    pub(crate) fn dataset_name(&self) -> Option<String> {
        (!self.dataset.is_empty()).then(|| self.dataset.clone())
    }
}
