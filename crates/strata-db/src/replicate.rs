//! Replication streams
//!
//! A [`ReplicationStream`] is handed out before the handle is open. A driver
//! task waits for the open, then moves the log's outbound messages into a
//! bounded channel (read with `next()`) while importing whatever the peer
//! sends through [`ReplicationStream::send`]. Once the peer's `End` arrives
//! the handle is flushed, and only then is `ReplicationComplete` emitted and
//! the outbound side closed.

use crate::db::Db;
use crate::error::{Error, Result};
use crate::events::Event;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use strata_log::{ReplicateOptions, ReplicationMessage};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Outbound messages, paired with a channel for the peer's messages
#[derive(Debug)]
pub struct ReplicationStream {
    outbound: mpsc::Receiver<Result<ReplicationMessage>>,
    inbound: mpsc::Sender<ReplicationMessage>,
    done: oneshot::Receiver<Result<u64>>,
}

/// Pieces of a [`ReplicationStream`]
pub type ReplicationParts = (
    mpsc::Receiver<Result<ReplicationMessage>>,
    mpsc::Sender<ReplicationMessage>,
    oneshot::Receiver<Result<u64>>,
);

impl ReplicationStream {
    pub(crate) fn spawn(db: Db, options: ReplicateOptions) -> Self {
        let buffer = db.stream_buffer();
        let (out_tx, out_rx) = mpsc::channel(buffer);
        let (in_tx, in_rx) = mpsc::channel(buffer);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = drive(&db, options, &out_tx, in_rx).await;
            match &result {
                Ok(imported) => {
                    info!(mode = ?options.mode, imported, "replication complete");
                    db.emit(Event::ReplicationComplete {
                        imported: *imported,
                    });
                }
                Err(e) => {
                    warn!(mode = ?options.mode, "replication failed: {}", e);
                    let _ = out_tx.try_send(Err(Error::Closed(e.to_string())));
                }
            }
            let _ = done_tx.send(result);
            // out_tx drops here, ending the outbound side
        });

        Self {
            outbound: out_rx,
            inbound: in_tx,
            done: done_rx,
        }
    }

    /// Deliver one message from the peer
    pub async fn send(&self, message: ReplicationMessage) -> Result<()> {
        self.inbound
            .send(message)
            .await
            .map_err(|_| Error::Closed("replication no longer accepts messages".to_string()))
    }

    /// Wait for the driver and return how many nodes it imported
    pub async fn finished(self) -> Result<u64> {
        finish(self.done).await
    }

    #[must_use]
    pub fn into_parts(self) -> ReplicationParts {
        (self.outbound, self.inbound, self.done)
    }
}

impl Stream for ReplicationStream {
    type Item = Result<ReplicationMessage>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.outbound.poll_recv(cx)
    }
}

async fn drive(
    db: &Db,
    options: ReplicateOptions,
    out_tx: &mpsc::Sender<Result<ReplicationMessage>>,
    mut in_rx: mpsc::Receiver<ReplicationMessage>,
) -> Result<u64> {
    let session = db.session().await?;
    let mut log = Arc::clone(&session.storage).replicate(options);
    let mut outbound = log.outbound();
    let mut sending = true;
    let mut receiving = true;

    while sending || receiving {
        tokio::select! {
            permit = out_tx.reserve(), if sending => {
                let permit = permit
                    .map_err(|_| Error::Closed("replication peer went away".to_string()))?;
                match outbound.next().await {
                    Some(Ok(message)) => permit.send(Ok(message)),
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        debug!("outbound side drained");
                        sending = false;
                    }
                }
            }
            message = in_rx.recv(), if receiving => {
                let Some(message) = message else {
                    return Err(Error::Closed("replication peer closed before end".to_string()));
                };
                if log.receive(message).await? {
                    db.flush().await?;
                    receiving = false;
                }
            }
        }
    }

    Ok(log.imported())
}

async fn finish(done: oneshot::Receiver<Result<u64>>) -> Result<u64> {
    done.await
        .map_err(|_| Error::Closed("replication task stopped".to_string()))?
}

async fn forward(
    mut from: mpsc::Receiver<Result<ReplicationMessage>>,
    to: mpsc::Sender<ReplicationMessage>,
) -> Result<()> {
    while let Some(message) = from.recv().await {
        to.send(message?)
            .await
            .map_err(|_| Error::Closed("replication peer went away".to_string()))?;
    }
    Ok(())
}

/// Connect two replication streams and run them to completion.
///
/// Returns the number of nodes imported by `left` and by `right`.
pub async fn pipe(left: ReplicationStream, right: ReplicationStream) -> Result<(u64, u64)> {
    let (left_out, left_in, left_done) = left.into_parts();
    let (right_out, right_in, right_done) = right.into_parts();

    tokio::try_join!(forward(left_out, right_in), forward(right_out, left_in))?;

    Ok((finish(left_done).await?, finish(right_done).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DbOptions;
    use crate::testing::FlakyStorage;
    use strata_common::Config;
    use strata_log::{RedbLog, ReplicationMode, Storage};

    fn memory_storage() -> Arc<dyn Storage> {
        Arc::new(RedbLog::in_memory(&Config::default()).unwrap())
    }

    #[tokio::test]
    async fn test_push_into_pull() {
        let source = Db::with_storage(memory_storage(), DbOptions::new());
        source.put("a", "1").await.unwrap();
        source.put("b", "2").await.unwrap();

        let target_storage = memory_storage();
        let target = Db::with_storage(Arc::clone(&target_storage), DbOptions::new());

        let (sent_back, imported) = pipe(source.push(), target.pull()).await.unwrap();
        assert_eq!(sent_back, 0);
        assert_eq!(imported, 2);

        let fresh = Db::with_storage(target_storage, DbOptions::new());
        assert_eq!(fresh.get("a").await.unwrap(), b"1");
        assert_eq!(fresh.get("b").await.unwrap(), b"2");
        assert_eq!(fresh.head(), source.head());
    }

    #[tokio::test]
    async fn test_sync_both_ways() {
        let left = Db::with_storage(memory_storage(), DbOptions::new());
        let right = Db::with_storage(memory_storage(), DbOptions::new());
        left.put("l", "1").await.unwrap();
        right.put("r", "1").await.unwrap();
        right.put("r", "2").await.unwrap();

        let sync = ReplicateOptions::default();
        let (into_left, into_right) = pipe(left.replicate(sync), right.replicate(sync))
            .await
            .unwrap();
        assert_eq!(into_left, 2);
        assert_eq!(into_right, 1);

        // a second round has nothing new to move
        let (again_left, again_right) = pipe(left.replicate(sync), right.replicate(sync))
            .await
            .unwrap();
        assert_eq!((again_left, again_right), (0, 0));
    }

    #[tokio::test]
    async fn test_flush_precedes_completion() {
        let source = Db::with_storage(memory_storage(), DbOptions::new());
        source.put("a", "1").await.unwrap();

        let storage = Arc::new(FlakyStorage::new(memory_storage()));
        let target = Db::with_storage(storage.clone(), DbOptions::new());
        let mut events = target.subscribe();

        let pull = target.pull();
        pipe(source.push(), pull).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), Event::Ready);
        assert_eq!(events.recv().await.unwrap(), Event::Flushed);
        assert_eq!(
            events.recv().await.unwrap(),
            Event::ReplicationComplete { imported: 1 }
        );
        assert_eq!(storage.journal(), vec!["import", "flush"]);
    }

    #[tokio::test]
    async fn test_push_side_rejects_nodes() {
        let source = Db::with_storage(memory_storage(), DbOptions::new());
        let node = source.put("a", "1").await.unwrap();

        let target = Db::with_storage(memory_storage(), DbOptions::new());
        let push = target.replicate(ReplicateOptions::new(ReplicationMode::Push));
        push.send(ReplicationMessage::Node(node.into())).await.unwrap();

        let (mut outbound, _inbound, done) = push.into_parts();
        let mut saw_error = false;
        while let Some(message) = outbound.recv().await {
            if message.is_err() {
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert!(finish(done).await.is_err());
    }

    #[tokio::test]
    async fn test_open_failure_reaches_stream() {
        let db = Db::from_options(DbOptions::new());
        let mut stream = db.pull();
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(Error::Closed(_))));
        assert!(stream.next().await.is_none());
        assert!(stream.finished().await.unwrap_err().is_invalid_argument());
    }
}
