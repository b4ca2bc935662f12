//! Write stream: one committed node per written operation.

use crate::db::Db;
use crate::error::Result;
use crate::options::BatchOp;
use futures::stream::{Stream, StreamExt};
use strata_common::Node;
use tracing::debug;

/// Sink returned by [`Db::create_write_stream`]
#[derive(Debug)]
pub struct WriteStream {
    db: Db,
    written: u64,
}

impl WriteStream {
    pub(crate) fn new(db: Db) -> Self {
        Self { db, written: 0 }
    }

    /// Commit `op` as its own node
    pub async fn write(&mut self, op: BatchOp) -> Result<Node> {
        let node = self.db.batch(vec![op]).await?;
        self.written += 1;
        Ok(node)
    }

    /// Write every operation of `ops`, stopping at the first failure
    pub async fn send_all<S>(&mut self, ops: S) -> Result<u64>
    where
        S: Stream<Item = BatchOp> + Send,
    {
        let mut ops = std::pin::pin!(ops);
        let mut count = 0;
        while let Some(op) = ops.next().await {
            self.write(op).await?;
            count += 1;
        }
        Ok(count)
    }

    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Finish the stream and return how many nodes it committed
    pub async fn end(self) -> Result<u64> {
        self.db.flush().await?;
        debug!(written = self.written, "write stream ended");
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DbOptions;
    use futures::stream;
    use std::sync::Arc;
    use strata_common::Config;
    use strata_log::RedbLog;

    #[tokio::test]
    async fn test_write_stream_commits_one_node_per_op() {
        let storage = Arc::new(RedbLog::in_memory(&Config::default()).unwrap());
        let db = Db::with_storage(storage, DbOptions::new());

        // usable before the handle is open
        let mut writer = db.create_write_stream();
        let first = writer.write(BatchOp::put("a", "1")).await.unwrap();
        let count = writer
            .send_all(stream::iter(vec![BatchOp::put("b", "2"), BatchOp::del("a")]))
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(writer.end().await.unwrap(), 3);

        assert_eq!(first.change, 1);
        assert_eq!(db.change(), 3);
        assert!(db.get("a").await.unwrap_err().is_not_found());
        assert_eq!(db.get("b").await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_write_stream_stops_on_invalid_key() {
        let storage = Arc::new(RedbLog::in_memory(&Config::default()).unwrap());
        let db = Db::with_storage(storage, DbOptions::new());
        let mut writer = db.create_write_stream();
        let err = writer
            .send_all(stream::iter(vec![
                BatchOp::put("ok", "1"),
                BatchOp::put("bad!key", "2"),
                BatchOp::put("never", "3"),
            ]))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(writer.written(), 1);
        assert!(db.get("never").await.unwrap_err().is_not_found());
    }
}
