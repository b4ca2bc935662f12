//! Blocking table scans exposed as bounded async streams
//!
//! redb iterators borrow their read transaction, so scans run on the
//! blocking pool and hand items over a bounded channel. A full channel
//! parks the scan; a dropped receiver ends it.

use crate::error::{LogError, LogResult};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Sending half handed to a scan body
pub struct ScanSink<T> {
    tx: mpsc::Sender<LogResult<T>>,
}

impl<T> ScanSink<T> {
    /// Emit one item. Returns `false` once the consumer has gone away.
    pub fn emit(&self, item: T) -> bool {
        self.tx.blocking_send(Ok(item)).is_ok()
    }
}

/// Run `body` on the blocking pool and stream what it emits
pub fn spawn_scan<T, F>(buffer: usize, body: F) -> BoxStream<'static, LogResult<T>>
where
    T: Send + 'static,
    F: FnOnce(&ScanSink<T>) -> LogResult<()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::task::spawn_blocking(move || {
        let sink = ScanSink { tx };
        if let Err(e) = body(&sink) {
            debug!("scan aborted: {}", e);
            let _ = sink.tx.blocking_send(Err(e));
        }
    });
    ReceiverStream::new(rx).boxed()
}

/// Stream that yields a single error
pub fn failed<T: Send + 'static>(err: LogError) -> BoxStream<'static, LogResult<T>> {
    futures::stream::once(async move { Err(err) }).boxed()
}
