//! MVCC read path
//!
//! A key resolves to a pointer through one of three lookups:
//!
//! - fast: the *latest* index of the handle's layer, valid only while the
//!   layer's authoritative head is still the head the handle observed;
//! - slow: a reverse range query over the *changes* index, taking the
//!   newest entry at or below the handle's change bound;
//! - ancestors: the slow query repeated down the layer stack, each layer
//!   bounded by the change the stack recorded for it.
//!
//! Frozen handles (checkouts, named layers) never use the fast path, since
//! the *latest* index keeps moving under them.

use crate::error::{Error, Result};
use crate::session::{Position, Session};
use futures::StreamExt;
use strata_common::keys;
use strata_common::{Change, LayerId, Pointer};
use strata_log::{KeyRange, LogError};
use tracing::trace;

impl Session {
    pub(crate) async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let position = self.position();
        let Some(front) = position.front() else {
            return Err(Error::not_found(key));
        };

        if self.frozen {
            return self.get_change(key, &position).await;
        }

        let current = self.storage.head(&front.layer).await?;
        if current.is_some() && current == position.head {
            self.get_latest(key, &position).await
        } else {
            trace!(layer = %front.layer, "head moved, using changes index");
            self.get_change(key, &position).await
        }
    }

    async fn get_latest(&self, key: &str, position: &Position) -> Result<Vec<u8>> {
        let layer = &position.layers[0].layer;
        let latest = keys::latest_key(layer, &self.dataset, key);
        match self.storage.data_get(&latest).await? {
            Some(ptr) => self.resolve_pointer(key, &ptr).await,
            None => self.get_from_ancestors(key, position).await,
        }
    }

    async fn get_change(&self, key: &str, position: &Position) -> Result<Vec<u8>> {
        let front = &position.layers[0];
        match self.change_pointer(key, &front.layer, front.change).await? {
            Some(ptr) => self.resolve_pointer(key, &ptr).await,
            None => self.get_from_ancestors(key, position).await,
        }
    }

    async fn get_from_ancestors(&self, key: &str, position: &Position) -> Result<Vec<u8>> {
        for entry in position.layers.iter().skip(1) {
            if let Some(ptr) = self.change_pointer(key, &entry.layer, entry.change).await? {
                return self.resolve_pointer(key, &ptr).await;
            }
        }
        Err(Error::not_found(key))
    }

    /// Newest changes-index pointer for `key` in `layer` at or below `change`.
    ///
    /// Entries of named datasets share the `<layer>!<key>!` prefix of a
    /// default-dataset key, so only entries whose remainder is exactly a
    /// packed change belong to `key`.
    async fn change_pointer(
        &self,
        key: &str,
        layer: &LayerId,
        change: Change,
    ) -> Result<Option<String>> {
        let subject = keys::changes_subject(&self.dataset, key);
        let prefix = keys::changes_prefix(layer, &subject);
        let range = KeyRange {
            gte: Some(keys::changes_key(layer, &subject, 0)),
            lte: Some(keys::changes_key(layer, &subject, change)),
            reverse: true,
            ..Default::default()
        };

        let mut revs = self.storage.data_range(range);
        while let Some(entry) = revs.next().await {
            let (index_key, ptr) = entry?;
            let own = index_key
                .strip_prefix(prefix.as_str())
                .and_then(keys::unpack_change)
                .is_some();
            if own {
                return Ok(Some(ptr));
            }
            trace!(entry = %index_key, "skipping foreign changes entry");
        }
        Ok(None)
    }

    async fn resolve_pointer(&self, key: &str, ptr: &str) -> Result<Vec<u8>> {
        let ptr: Pointer = ptr.parse()?;
        let node = self.storage.get(&ptr.node).await?;
        let entry = node.operations.get(ptr.index).ok_or_else(|| {
            LogError::Corrupt(format!("pointer {ptr} past end of node operations"))
        })?;

        if entry.is_delete() {
            return Err(Error::not_found(key));
        }
        entry
            .value
            .clone()
            .ok_or_else(|| LogError::Corrupt(format!("put without value at {ptr}")).into())
    }
}
