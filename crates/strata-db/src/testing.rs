//! Storage wrapper for tests: injects append failures and counts calls.

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use strata_common::{LayerId, Node, NodeKey, Operation};
use strata_log::{
    ChangesOptions, KeyRange, LogError, LogReplication, LogResult, ReplicateOptions, Storage,
    WireNode,
};

pub struct FlakyStorage {
    inner: Arc<dyn Storage>,
    fail_add: AtomicBool,
    main_layer_calls: AtomicUsize,
    journal: Mutex<Vec<&'static str>>,
}

impl FlakyStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            fail_add: AtomicBool::new(false),
            main_layer_calls: AtomicUsize::new(0),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next_add(&self) {
        self.fail_add.store(true, Ordering::SeqCst);
    }

    pub fn main_layer_calls(&self) -> usize {
        self.main_layer_calls.load(Ordering::SeqCst)
    }

    /// Names of the calls that reached this storage, in order
    pub fn journal(&self) -> Vec<&'static str> {
        self.journal.lock().clone()
    }

    fn record(&self, call: &'static str) {
        self.journal.lock().push(call);
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn add(
        &self,
        links: Vec<NodeKey>,
        operations: Vec<Operation>,
    ) -> LogResult<(Node, LayerId)> {
        self.record("add");
        if self.fail_add.swap(false, Ordering::SeqCst) {
            return Err(LogError::Io(std::io::Error::other("injected failure")));
        }
        self.inner.add(links, operations).await
    }

    async fn get(&self, key: &NodeKey) -> LogResult<Node> {
        self.inner.get(key).await
    }

    async fn import(&self, node: WireNode) -> LogResult<Option<(Node, LayerId)>> {
        self.record("import");
        self.inner.import(node).await
    }

    async fn layer_of(&self, key: &NodeKey) -> LogResult<LayerId> {
        self.inner.layer_of(key).await
    }

    async fn head(&self, layer: &LayerId) -> LogResult<Option<NodeKey>> {
        self.inner.head(layer).await
    }

    async fn main_layer(&self) -> LogResult<Option<LayerId>> {
        self.main_layer_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.main_layer().await
    }

    async fn data_get(&self, key: &str) -> LogResult<Option<String>> {
        self.inner.data_get(key).await
    }

    fn data_range(&self, range: KeyRange) -> BoxStream<'static, LogResult<(String, String)>> {
        self.inner.data_range(range)
    }

    fn heads(&self) -> BoxStream<'static, LogResult<(LayerId, NodeKey)>> {
        self.inner.heads()
    }

    fn changes(&self, options: ChangesOptions) -> BoxStream<'static, LogResult<Node>> {
        self.inner.changes(options)
    }

    async fn flush(&self) -> LogResult<()> {
        self.inner.flush().await?;
        self.record("flush");
        Ok(())
    }

    fn replicate(self: Arc<Self>, options: ReplicateOptions) -> LogReplication {
        LogReplication::new(self, options)
    }
}
