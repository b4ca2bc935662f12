//! Layer-chain resolution
//!
//! Walks from a node back to the root layer. For every layer on the way it
//! records the change number of the node the walk entered that layer at;
//! reads in that layer are bounded by it. The walk ends at the layer whose
//! first node has no links.

use crate::error::Result;
use strata_common::{LayerEntry, LayerId, LayerStack, NodeKey};
use strata_log::Storage;
use tracing::trace;

/// Ordered layer stack from `head` back to the root, nearest first
pub(crate) async fn resolve_layers(storage: &dyn Storage, head: &NodeKey) -> Result<LayerStack> {
    let mut result = Vec::new();
    let mut key = head.clone();

    loop {
        let layer = storage.layer_of(&key).await?;
        let node = storage.get(&key).await?;
        let layer_node = storage.get(&layer.node_key()).await?;
        trace!(node = %key, layer = %layer, change = node.change, "layer chain step");
        result.push(LayerEntry::new(node.change, LayerId::from(layer_node.key)));

        match layer_node.links.into_iter().next() {
            // root node
            None => return Ok(result),
            Some(parent) => key = parent,
        }
    }
}
