//! Public handle
//!
//! A [`Db`] is a cheap, cloneable handle bound to the root layer, a named
//! layer, or a frozen checkout. Every call first awaits the handle's one-shot
//! open; stream-returning calls hand back a proxy while it is pending.

use crate::error::{Error, Result};
use crate::events::{self, Event};
use crate::lifecycle::{open_session, proxy_stream};
use crate::options::{BatchOp, DbOptions, ReadOptions};
use crate::replicate::ReplicationStream;
use crate::session::Session;
use crate::write::WriteStream;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_common::keys::validate_key;
use strata_common::{Change, LayerId, LayerStack, Node, NodeKey, Operation};
use strata_log::{ChangesOptions, ReplicateOptions, ReplicationMode, Storage};
use tokio::sync::{OnceCell, broadcast};
use tracing::{error, info};

struct Inner {
    dir: Option<PathBuf>,
    options: DbOptions,
    session: OnceCell<std::result::Result<Arc<Session>, Arc<Error>>>,
    events: broadcast::Sender<Event>,
}

/// Handle onto a versioned key-value store
#[derive(Clone)]
pub struct Db {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("dir", &self.inner.dir)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Handle onto the store in `<dir>/.dat/db`. Nothing happens until the
    /// first call (or [`Db::open`]).
    pub fn new(dir: impl AsRef<Path>, options: DbOptions) -> Self {
        Self::build(Some(dir.as_ref().to_path_buf()), options)
    }

    /// Handle onto an already-open storage instance
    #[must_use]
    pub fn with_storage(storage: Arc<dyn Storage>, options: DbOptions) -> Self {
        Self::build(None, options.with_storage(storage))
    }

    /// Handle resolved entirely from `options` (storage or parent)
    #[must_use]
    pub fn from_options(options: DbOptions) -> Self {
        Self::build(None, options)
    }

    /// Construct and open in one step
    pub async fn open_dir(dir: impl AsRef<Path>, options: DbOptions) -> Result<Self> {
        let db = Self::new(dir, options);
        db.open().await?;
        Ok(db)
    }

    fn build(dir: Option<PathBuf>, options: DbOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir,
                options,
                session: OnceCell::new(),
                events: events::channel(),
            }),
        }
    }

    /// Run the open sequence, or wait for the one already running.
    pub async fn open(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    /// Opened session; concurrent callers share one open
    pub(crate) fn session(&self) -> BoxFuture<'_, Result<Arc<Session>>> {
        async move {
            let inner = &self.inner;
            let opened = inner
                .session
                .get_or_init(|| async {
                    match open_session(&inner.options, inner.dir.as_deref()).await {
                        Ok(session) => {
                            let position = session.position();
                            info!(
                                layer = ?position.layer(),
                                change = position.change(),
                                frozen = session.frozen,
                                "handle ready"
                            );
                            self.emit(Event::Ready);
                            Ok(Arc::new(session))
                        }
                        Err(e) => {
                            error!("open failed: {}", e);
                            self.emit(Event::OpenFailed(e.to_string()));
                            Err(Arc::new(e))
                        }
                    }
                })
                .await;

            match opened {
                Ok(session) => Ok(Arc::clone(session)),
                Err(e) => Err(Error::Open(Arc::clone(e))),
            }
        }
        .boxed()
    }

    /// Session if the open already succeeded
    pub(crate) fn opened(&self) -> Option<Arc<Session>> {
        match self.inner.session.get() {
            Some(Ok(session)) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.opened().is_some()
    }

    /// Register an observer for this handle's notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn stream_buffer(&self) -> usize {
        self.inner.options.config.streams.buffer.max(1)
    }

    // ---- Position ----

    /// Head node this handle last observed or wrote
    #[must_use]
    pub fn head(&self) -> Option<NodeKey> {
        self.opened().and_then(|s| s.position().head)
    }

    /// Layer this handle reads and writes
    #[must_use]
    pub fn layer_id(&self) -> Option<LayerId> {
        self.opened().and_then(|s| s.position().layer().cloned())
    }

    /// Change bound of the handle's own layer
    #[must_use]
    pub fn change(&self) -> Change {
        self.opened().map_or(0, |s| s.position().change())
    }

    #[must_use]
    pub fn layer_stack(&self) -> LayerStack {
        self.opened().map(|s| s.position().layers).unwrap_or_default()
    }

    /// Frozen handles (checkouts and named layers) read through the changes index
    #[must_use]
    pub fn is_checkout(&self) -> bool {
        self.inner.options.checkout.is_some() || self.inner.options.layer.is_some()
    }

    // ---- Derived handles ----

    /// Handle positioned at the current head of `layer`
    #[must_use]
    pub fn layer(&self, layer: impl Into<LayerId>) -> Self {
        let options = self.derived_options().with_layer(layer);
        Self::from_options(options)
    }

    /// Handle frozen at `head`
    #[must_use]
    pub fn checkout(&self, head: impl Into<NodeKey>) -> Self {
        let options = self.derived_options().with_checkout(head);
        Self::from_options(options)
    }

    fn derived_options(&self) -> DbOptions {
        let parent = &self.inner.options;
        DbOptions {
            config: parent.config.clone(),
            dataset: parent.dataset.clone(),
            ..DbOptions::default()
        }
        .with_parent(self.clone())
    }

    // ---- Reads ----

    /// Value of `key` as of this handle's position
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        self.session().await?.get(key).await
    }

    /// [`Db::get`] decoded from JSON
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let bytes = self.get(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ---- Writes ----

    pub async fn put(&self, key: &str, value: impl Into<Vec<u8>>) -> Result<Node> {
        self.batch(vec![BatchOp::put(key, value)]).await
    }

    /// [`Db::put`] encoded as JSON
    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<Node> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, bytes).await
    }

    pub async fn del(&self, key: &str) -> Result<Node> {
        self.batch(vec![BatchOp::del(key)]).await
    }

    /// Commit every operation in one node
    pub async fn batch(&self, ops: Vec<BatchOp>) -> Result<Node> {
        if ops.is_empty() {
            return Err(Error::invalid_argument("empty batch"));
        }
        for op in &ops {
            validate_key(op.key())?;
        }

        let session = self.session().await?;
        let dataset = session.dataset_name();
        let operations = ops
            .into_iter()
            .map(|op| {
                match op {
                    BatchOp::Put { key, value } => Operation::put(key, value),
                    BatchOp::Del { key } => Operation::delete(key),
                }
                .with_dataset(dataset.clone())
            })
            .collect();
        session.commit(operations).await
    }

    /// Make every committed write durable
    pub async fn flush(&self) -> Result<()> {
        let session = self.session().await?;
        session.storage.flush().await?;
        self.emit(Event::Flushed);
        Ok(())
    }

    /// Storage this handle resolved at open
    pub async fn storage(&self) -> Result<Arc<dyn Storage>> {
        Ok(Arc::clone(&self.session().await?.storage))
    }

    // ---- Streams ----

    /// Head node of every layer
    pub fn heads(&self) -> BoxStream<'static, Result<NodeKey>> {
        proxy_stream(self, |session| {
            session
                .storage
                .heads()
                .map(|entry| entry.map(|(_, head)| head).map_err(Error::from))
                .boxed()
        })
    }

    /// Every layer id
    pub fn layers(&self) -> BoxStream<'static, Result<LayerId>> {
        proxy_stream(self, |session| {
            session
                .storage
                .heads()
                .map(|entry| entry.map(|(layer, _)| layer).map_err(Error::from))
                .boxed()
        })
    }

    /// Live `(key, value)` pairs in key order
    pub fn create_read_stream(
        &self,
        options: ReadOptions,
    ) -> BoxStream<'static, Result<(String, Vec<u8>)>> {
        proxy_stream(self, move |session| session.read_stream(&options))
    }

    pub fn create_key_stream(&self, options: ReadOptions) -> BoxStream<'static, Result<String>> {
        self.create_read_stream(options)
            .map(|entry| entry.map(|(key, _)| key))
            .boxed()
    }

    pub fn create_value_stream(&self, options: ReadOptions) -> BoxStream<'static, Result<Vec<u8>>> {
        self.create_read_stream(options)
            .map(|entry| entry.map(|(_, value)| value))
            .boxed()
    }

    /// Nodes of the underlying log in change order
    pub fn create_changes_stream(&self, options: ChangesOptions) -> BoxStream<'static, Result<Node>> {
        proxy_stream(self, move |session| {
            session
                .storage
                .changes(options)
                .map(|node| node.map_err(Error::from))
                .boxed()
        })
    }

    /// Sink committing one node per written operation
    #[must_use]
    pub fn create_write_stream(&self) -> WriteStream {
        WriteStream::new(self.clone())
    }

    // ---- Replication ----

    /// Replication session in the requested mode
    #[must_use]
    pub fn replicate(&self, options: ReplicateOptions) -> ReplicationStream {
        ReplicationStream::spawn(self.clone(), options)
    }

    #[must_use]
    pub fn push(&self) -> ReplicationStream {
        self.replicate(ReplicateOptions::new(ReplicationMode::Push))
    }

    #[must_use]
    pub fn pull(&self) -> ReplicationStream {
        self.replicate(ReplicateOptions::new(ReplicationMode::Pull))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde::Deserialize;
    use strata_common::Config;
    use strata_log::RedbLog;

    fn memory_db() -> Db {
        let storage = Arc::new(RedbLog::in_memory(&Config::default()).unwrap());
        Db::with_storage(storage, DbOptions::new())
    }

    #[tokio::test]
    async fn test_put_get_del() {
        let db = memory_db();
        db.put("a", "1").await.unwrap();
        assert_eq!(db.get("a").await.unwrap(), b"1");
        db.del("a").await.unwrap();
        assert!(db.get("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_key_validation() {
        let db = memory_db();
        assert!(db.put("", "1").await.unwrap_err().is_invalid_argument());
        assert!(db.put("a!b", "1").await.unwrap_err().is_invalid_argument());
        assert!(db.get("a!b").await.unwrap_err().is_invalid_argument());
        assert!(db.batch(vec![]).await.unwrap_err().is_invalid_argument());
    }

    #[tokio::test]
    async fn test_batch_is_one_node() {
        let db = memory_db();
        let node = db
            .batch(vec![
                BatchOp::put("a", "1"),
                BatchOp::put("b", "2"),
                BatchOp::del("a"),
            ])
            .await
            .unwrap();
        assert_eq!(node.operations.len(), 3);
        assert_eq!(db.change(), node.change);
        // later operations in a node win
        assert!(db.get("a").await.unwrap_err().is_not_found());
        assert_eq!(db.get("b").await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_json_values() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Row {
            name: String,
            age: u32,
        }

        let db = memory_db();
        let row = Row {
            name: "ada".into(),
            age: 36,
        };
        db.put_json("ada", &row).await.unwrap();
        assert_eq!(db.get_json::<Row>("ada").await.unwrap(), row);

        db.put("raw", "not json").await.unwrap();
        assert!(matches!(
            db.get_json::<Row>("raw").await.unwrap_err(),
            Error::Codec(_)
        ));
    }

    #[tokio::test]
    async fn test_heads_and_layers_streams() {
        let db = memory_db();
        let root = db.put("a", "1").await.unwrap();
        db.put("a", "2").await.unwrap();
        let fork = db.checkout(root.key.clone());
        let forked = fork.put("a", "3").await.unwrap();

        let mut heads: Vec<NodeKey> = db.heads().try_collect().await.unwrap();
        heads.sort();
        let mut expected = vec![db.head().unwrap(), forked.key.clone()];
        expected.sort();
        assert_eq!(heads, expected);

        let layers: Vec<LayerId> = db.layers().try_collect().await.unwrap();
        assert_eq!(layers.len(), 2);
        assert!(layers.contains(&LayerId::from(forked.key)));
        assert!(layers.contains(&LayerId::from(root.key)));
    }

    #[tokio::test]
    async fn test_changes_stream() {
        let db = memory_db();
        for i in 0..4 {
            db.put("k", i.to_string()).await.unwrap();
        }
        let changes: Vec<Change> = db
            .create_changes_stream(ChangesOptions {
                since: 1,
                limit: None,
            })
            .map_ok(|node| node.change)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(changes, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_key_and_value_streams() {
        let db = memory_db();
        db.batch(vec![
            BatchOp::put("b", "2"),
            BatchOp::put("a", "1"),
            BatchOp::put("c", "3"),
        ])
        .await
        .unwrap();

        let keys: Vec<String> = db
            .create_key_stream(ReadOptions::new().gte("b"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys, vec!["b", "c"]);

        let values: Vec<Vec<u8>> = db
            .create_value_stream(ReadOptions::new().lt("c"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[tokio::test]
    async fn test_datasets_are_isolated() {
        let storage: Arc<dyn Storage> = Arc::new(RedbLog::in_memory(&Config::default()).unwrap());
        let people = Db::with_storage(Arc::clone(&storage), DbOptions::new().with_dataset("people"));
        people.put("ada", "person").await.unwrap();

        let default = Db::with_storage(storage, DbOptions::new());
        assert!(default.get("ada").await.unwrap_err().is_not_found());
        let keys: Vec<String> = default
            .create_key_stream(ReadOptions::new())
            .try_collect()
            .await
            .unwrap();
        assert!(keys.is_empty());
        assert_eq!(people.get("ada").await.unwrap(), b"person");
    }

    #[tokio::test]
    async fn test_flush_emits_event() {
        let db = memory_db();
        let mut events = db.subscribe();
        db.put("a", "1").await.unwrap();
        db.flush().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), Event::Ready);
        assert_eq!(events.recv().await.unwrap(), Event::Flushed);
    }
}
