//! Read stream merger
//!
//! One *latest*-index scan per layer in the stack, merged into a single
//! sorted, de-duplicated stream of user keys. Each surviving key is then
//! re-resolved through the read path: the *latest* index cannot tell a live
//! value from a tombstone, nor from an entry written past a layer's change
//! bound.

use crate::error::{Error, Result};
use crate::options::ReadOptions;
use crate::session::Session;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use strata_common::LayerId;
use strata_common::keys;
use strata_log::{KeyRange, LogError, Storage};

/// Translate a user-key range into the *latest*-index key space of a layer
fn layer_range(prefix: &str, options: &ReadOptions) -> KeyRange {
    let scoped = |k: &String| format!("{prefix}{k}");
    KeyRange {
        gt: Some(format!("{prefix}{}", options.gt.as_deref().unwrap_or(""))),
        gte: options.gte.as_ref().map(scoped),
        lt: Some(format!(
            "{prefix}{}",
            options
                .lt
                .clone()
                .unwrap_or_else(|| keys::UPPER_BOUND.to_string())
        )),
        lte: options.lte.as_ref().map(scoped),
        ..Default::default()
    }
}

/// Sorted user keys of one layer
fn layer_keys(
    storage: &dyn Storage,
    layer: &LayerId,
    dataset: &str,
    options: &ReadOptions,
) -> BoxStream<'static, Result<String>> {
    let prefix = keys::latest_prefix(layer, dataset);
    storage
        .data_range(layer_range(&prefix, options))
        .map(move |entry| {
            let (key, _) = entry?;
            key.strip_prefix(prefix.as_str())
                .map(str::to_string)
                .ok_or_else(|| Error::from(LogError::Corrupt(format!("key outside scan: {key}"))))
        })
        .boxed()
}

struct Union {
    sources: Vec<BoxStream<'static, Result<String>>>,
    pending: Vec<Option<String>>,
    exhausted: Vec<bool>,
}

impl Union {
    async fn next_key(&mut self) -> Option<Result<String>> {
        for i in 0..self.sources.len() {
            if self.pending[i].is_none() && !self.exhausted[i] {
                match self.sources[i].next().await {
                    Some(Ok(key)) => self.pending[i] = Some(key),
                    Some(Err(e)) => return Some(Err(e)),
                    None => self.exhausted[i] = true,
                }
            }
        }

        let min = self.pending.iter().flatten().min()?.clone();
        // nearer layers shadow the same key further down the stack
        for slot in &mut self.pending {
            if slot.as_deref() == Some(min.as_str()) {
                *slot = None;
            }
        }
        Some(Ok(min))
    }
}

/// Sorted union of the given key streams; equal keys are emitted once
pub(crate) fn sorted_union(
    sources: Vec<BoxStream<'static, Result<String>>>,
) -> BoxStream<'static, Result<String>> {
    let n = sources.len();
    let union = Union {
        sources,
        pending: vec![None; n],
        exhausted: vec![false; n],
    };
    stream::unfold(union, |mut union| async move {
        union.next_key().await.map(|key| (key, union))
    })
    .boxed()
}

impl Session {
    /// Live `(key, value)` pairs visible to this session, in key order
    pub(crate) fn read_stream(
        self: Arc<Self>,
        options: &ReadOptions,
    ) -> BoxStream<'static, Result<(String, Vec<u8>)>> {
        let position = self.position();
        if position.layers.is_empty() {
            return stream::empty().boxed();
        }

        let scans = position
            .layers
            .iter()
            .map(|entry| layer_keys(self.storage.as_ref(), &entry.layer, &self.dataset, options))
            .collect();

        sorted_union(scans)
            .then(move |key| {
                let session = Arc::clone(&self);
                async move {
                    let key = match key {
                        Ok(key) => key,
                        Err(e) => return Some(Err(e)),
                    };
                    match session.get(&key).await {
                        Ok(value) => Some(Ok((key, value))),
                        Err(e) if e.is_not_found() => None,
                        Err(e) => Some(Err(e)),
                    }
                }
            })
            .filter_map(futures::future::ready)
            .boxed()
    }
}
