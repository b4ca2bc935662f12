//! Log side of replication
//!
//! A session exchanges [`ReplicationMessage`]s with a peer. The outbound
//! side carries every local node in change order (parents always precede
//! children) followed by `End`; the inbound side imports nodes the peer
//! sends until it sees `End`.

use crate::error::{LogError, LogResult};
use crate::storage::{ChangesOptions, Storage};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_common::{Node, NodeKey, Operation};
use tracing::debug;

/// Direction(s) a session moves nodes in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMode {
    /// Send local nodes only
    Push,
    /// Receive remote nodes only
    Pull,
    /// Both directions
    #[default]
    Sync,
}

impl ReplicationMode {
    #[must_use]
    pub const fn sends(self) -> bool {
        matches!(self, Self::Push | Self::Sync)
    }

    #[must_use]
    pub const fn receives(self) -> bool {
        matches!(self, Self::Pull | Self::Sync)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplicateOptions {
    pub mode: ReplicationMode,
}

impl ReplicateOptions {
    #[must_use]
    pub const fn new(mode: ReplicationMode) -> Self {
        Self { mode }
    }
}

/// A node as it travels between peers. Change numbers are log-local and
/// are not transmitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNode {
    pub key: NodeKey,
    pub links: Vec<NodeKey>,
    pub operations: Vec<Operation>,
}

impl From<Node> for WireNode {
    fn from(node: Node) -> Self {
        Self {
            key: node.key,
            links: node.links,
            operations: node.operations,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    Node(WireNode),
    End,
}

/// One replication session against a log
pub struct LogReplication {
    storage: Arc<dyn Storage>,
    mode: ReplicationMode,
    outbound: Option<BoxStream<'static, LogResult<ReplicationMessage>>>,
    imported: u64,
    finished: bool,
}

impl LogReplication {
    pub fn new(storage: Arc<dyn Storage>, options: ReplicateOptions) -> Self {
        let end = stream::once(async { Ok(ReplicationMessage::End) });
        let outbound = if options.mode.sends() {
            storage
                .changes(ChangesOptions::default())
                .map(|node| node.map(|n| ReplicationMessage::Node(n.into())))
                .chain(end)
                .boxed()
        } else {
            end.boxed()
        };

        Self {
            storage,
            mode: options.mode,
            outbound: Some(outbound),
            imported: 0,
            finished: false,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> ReplicationMode {
        self.mode
    }

    /// Take the outbound message stream. Yields nothing after the first call.
    pub fn outbound(&mut self) -> BoxStream<'static, LogResult<ReplicationMessage>> {
        self.outbound
            .take()
            .unwrap_or_else(|| stream::empty().boxed())
    }

    /// Handle one inbound message. Returns `true` once the peer sent `End`.
    pub async fn receive(&mut self, message: ReplicationMessage) -> LogResult<bool> {
        if self.finished {
            return Err(LogError::Replication(
                "message received after end of stream".to_string(),
            ));
        }
        match message {
            ReplicationMessage::End => {
                self.finished = true;
                Ok(true)
            }
            ReplicationMessage::Node(_) if !self.mode.receives() => Err(LogError::Replication(
                "push session does not accept nodes".to_string(),
            )),
            ReplicationMessage::Node(node) => {
                let key = node.key.clone();
                if let Some((node, layer)) = self.storage.import(node).await? {
                    debug!(node = %node.key, layer = %layer, change = node.change, "imported node");
                    self.imported += 1;
                } else {
                    debug!(node = %key, "node already present");
                }
                Ok(false)
            }
        }
    }

    /// Number of nodes this session added to the local log
    #[must_use]
    pub const fn imported(&self) -> u64 {
        self.imported
    }

    /// Whether the peer has finished sending
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }
}
