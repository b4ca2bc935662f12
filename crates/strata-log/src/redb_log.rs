//! Commit log backed by redb.
//!
//! A single write transaction appends a node and updates every index it
//! touches (`heads`, `layers`, the change sequence, and the *latest* and
//! *changes* pointers), so readers never observe a head without its
//! pointers or a partially applied node.

use crate::error::{LogError, LogResult};
use crate::replication::{LogReplication, ReplicateOptions, WireNode};
use crate::scan::{failed, spawn_scan};
use crate::storage::{ChangesOptions, KeyRange, Storage};
use crate::tables;
use async_trait::async_trait;
use futures::stream::BoxStream;
use redb::{Database, Durability, ReadableTable};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use strata_common::keys;
use strata_common::{Config, LayerId, Node, NodeKey, Operation, Pointer, SyncMode};
use tracing::{debug, info};

/// Content address of a node: SHA-256 over its links and operations
pub fn content_key(links: &[NodeKey], operations: &[Operation]) -> LogResult<NodeKey> {
    let bytes = bincode::serialize(&(links, operations))?;
    Ok(NodeKey::new(hex::encode(Sha256::digest(&bytes))))
}

/// Persistent commit log backed by redb.
pub struct RedbLog {
    db: Arc<Database>,
    sync_mode: SyncMode,
    buffer: usize,
}

impl RedbLog {
    /// Open (or create) the log at the given path.
    pub fn open(path: impl AsRef<Path>, config: &Config) -> LogResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        info!(path = %path.display(), "opened log");
        Self::init(db, config)
    }

    /// Create a log that lives only in memory.
    pub fn in_memory(config: &Config) -> LogResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db, config)
    }

    fn init(db: Database, config: &Config) -> LogResult<Self> {
        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::NODES)?;
            let _t = write_txn.open_table(tables::SEQUENCE)?;
            let _t = write_txn.open_table(tables::HEADS)?;
            let _t = write_txn.open_table(tables::LAYERS)?;
            let _t = write_txn.open_table(tables::DATA)?;
            let _t = write_txn.open_table(tables::META)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            sync_mode: config.storage.sync_mode,
            buffer: config.streams.buffer,
        })
    }

    /// Append a node in one write transaction.
    ///
    /// `expected_key` is set for nodes arriving from a peer and must match
    /// the locally computed content address. Returns `None` when a node with
    /// the same content address already exists.
    fn append(
        &self,
        links: Vec<NodeKey>,
        operations: Vec<Operation>,
        expected_key: Option<&NodeKey>,
    ) -> LogResult<(Node, LayerId, bool)> {
        let key = content_key(&links, &operations)?;
        if let Some(expected) = expected_key
            && *expected != key
        {
            return Err(LogError::Corrupt(format!(
                "content address mismatch: peer sent {expected}, computed {key}"
            )));
        }

        let mut write_txn = self.db.begin_write()?;
        if self.sync_mode == SyncMode::OnFlush {
            write_txn.set_durability(Durability::Eventual);
        }

        let (node, layer, created) = {
            let mut nodes = write_txn.open_table(tables::NODES)?;
            let mut sequence = write_txn.open_table(tables::SEQUENCE)?;
            let mut heads = write_txn.open_table(tables::HEADS)?;
            let mut layers = write_txn.open_table(tables::LAYERS)?;
            let mut data = write_txn.open_table(tables::DATA)?;
            let mut meta = write_txn.open_table(tables::META)?;

            let existing = nodes.get(key.as_str())?.map(|v| v.value().to_vec());
            if let Some(bytes) = existing {
                let node: Node = bincode::deserialize(&bytes)?;
                let layer = layers
                    .get(key.as_str())?
                    .map(|v| LayerId::new(v.value()))
                    .ok_or_else(|| LogError::LayerNotFound(key.to_string()))?;
                (node, layer, false)
            } else {
                for link in &links {
                    if nodes.get(link.as_str())?.is_none() {
                        return Err(LogError::MissingParent(link.to_string()));
                    }
                }

                let layer = match links.first() {
                    None => LayerId::from(key.clone()),
                    Some(parent) => {
                        let parent_layer = layers
                            .get(parent.as_str())?
                            .map(|v| LayerId::new(v.value()))
                            .ok_or_else(|| LogError::LayerNotFound(parent.to_string()))?;
                        let parent_is_head = heads
                            .get(parent_layer.as_str())?
                            .is_some_and(|v| v.value() == parent.as_str());
                        if parent_is_head {
                            parent_layer
                        } else {
                            debug!(parent = %parent, from = %parent_layer, layer = %key, "fork");
                            LayerId::from(key.clone())
                        }
                    }
                };

                let change = sequence.last()?.map_or(0, |(k, _)| k.value()) + 1;
                let node = Node {
                    key,
                    change,
                    links,
                    operations,
                };

                let encoded = bincode::serialize(&node)?;
                nodes.insert(node.key.as_str(), encoded.as_slice())?;
                sequence.insert(change, node.key.as_str())?;
                heads.insert(layer.as_str(), node.key.as_str())?;
                layers.insert(node.key.as_str(), layer.as_str())?;

                for (index, op) in node.operations.iter().enumerate() {
                    let ptr = Pointer::new(node.key.clone(), index).to_string();
                    let dataset = op.dataset_segment();
                    let latest = keys::latest_key(&layer, dataset, &op.key);
                    let subject = keys::changes_subject(dataset, &op.key);
                    let changes = keys::changes_key(&layer, &subject, change);
                    data.insert(latest.as_str(), ptr.as_str())?;
                    data.insert(changes.as_str(), ptr.as_str())?;
                }

                if node.is_root() && meta.get(tables::MAIN_LAYER)?.is_none() {
                    meta.insert(tables::MAIN_LAYER, layer.as_str())?;
                }

                (node, layer, true)
            }
        };

        if created {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok((node, layer, created))
    }

    fn read_node(&self, key: &NodeKey) -> LogResult<Node> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::NODES)?;
        match table.get(key.as_str())? {
            Some(val) => Ok(bincode::deserialize(val.value())?),
            None => Err(LogError::NodeNotFound(key.to_string())),
        }
    }

    fn read_str(
        &self,
        table_def: redb::TableDefinition<&str, &str>,
        key: &str,
    ) -> LogResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_def)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }
}

#[async_trait]
impl Storage for RedbLog {
    async fn add(
        &self,
        links: Vec<NodeKey>,
        operations: Vec<Operation>,
    ) -> LogResult<(Node, LayerId)> {
        let (node, layer, _) = self.append(links, operations, None)?;
        Ok((node, layer))
    }

    async fn get(&self, key: &NodeKey) -> LogResult<Node> {
        self.read_node(key)
    }

    async fn import(&self, node: WireNode) -> LogResult<Option<(Node, LayerId)>> {
        let (node, layer, created) = self.append(node.links, node.operations, Some(&node.key))?;
        Ok(created.then_some((node, layer)))
    }

    async fn layer_of(&self, key: &NodeKey) -> LogResult<LayerId> {
        self.read_str(tables::LAYERS, key.as_str())?
            .map(LayerId::new)
            .ok_or_else(|| LogError::LayerNotFound(key.to_string()))
    }

    async fn head(&self, layer: &LayerId) -> LogResult<Option<NodeKey>> {
        Ok(self.read_str(tables::HEADS, layer.as_str())?.map(NodeKey::new))
    }

    async fn main_layer(&self) -> LogResult<Option<LayerId>> {
        Ok(self.read_str(tables::META, tables::MAIN_LAYER)?.map(LayerId::new))
    }

    async fn data_get(&self, key: &str) -> LogResult<Option<String>> {
        self.read_str(tables::DATA, key)
    }

    fn data_range(&self, range: KeyRange) -> BoxStream<'static, LogResult<(String, String)>> {
        let db = Arc::clone(&self.db);
        spawn_scan(self.buffer, move |sink| {
            if range.is_empty() {
                return Ok(());
            }
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(tables::DATA)?;
            let iter = table.range::<&str>((range.lower(), range.upper()))?;
            let limit = range.limit.unwrap_or(usize::MAX);

            if range.reverse {
                for entry in iter.rev().take(limit) {
                    let (k, v) = entry?;
                    if !sink.emit((k.value().to_string(), v.value().to_string())) {
                        break;
                    }
                }
            } else {
                for entry in iter.take(limit) {
                    let (k, v) = entry?;
                    if !sink.emit((k.value().to_string(), v.value().to_string())) {
                        break;
                    }
                }
            }
            Ok(())
        })
    }

    fn heads(&self) -> BoxStream<'static, LogResult<(LayerId, NodeKey)>> {
        let db = Arc::clone(&self.db);
        spawn_scan(self.buffer, move |sink| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(tables::HEADS)?;
            for entry in table.iter()? {
                let (k, v) = entry?;
                if !sink.emit((LayerId::new(k.value()), NodeKey::new(v.value()))) {
                    break;
                }
            }
            Ok(())
        })
    }

    fn changes(&self, options: ChangesOptions) -> BoxStream<'static, LogResult<Node>> {
        let Some(start) = options.since.checked_add(1) else {
            return failed(LogError::Corrupt("change sequence exhausted".to_string()));
        };
        let db = Arc::clone(&self.db);
        spawn_scan(self.buffer, move |sink| {
            let read_txn = db.begin_read()?;
            let sequence = read_txn.open_table(tables::SEQUENCE)?;
            let nodes = read_txn.open_table(tables::NODES)?;
            let limit = options.limit.unwrap_or(usize::MAX);
            for entry in sequence.range(start..)?.take(limit) {
                let (_, key) = entry?;
                let node: Node = match nodes.get(key.value())? {
                    Some(val) => bincode::deserialize(val.value())?,
                    None => return Err(LogError::NodeNotFound(key.value().to_string())),
                };
                if !sink.emit(node) {
                    break;
                }
            }
            Ok(())
        })
    }

    async fn flush(&self) -> LogResult<()> {
        if self.sync_mode == SyncMode::OnCommit {
            return Ok(());
        }
        // An immediate commit persists every eventual commit before it
        let mut write_txn = self.db.begin_write()?;
        write_txn.set_durability(Durability::Immediate);
        write_txn.commit()?;
        debug!("log flushed");
        Ok(())
    }

    fn replicate(self: Arc<Self>, options: ReplicateOptions) -> LogReplication {
        LogReplication::new(self, options)
    }
}
