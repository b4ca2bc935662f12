//! Handle notifications

use tokio::sync::broadcast;

/// Capacity of each handle's notification channel
pub const EVENT_CAPACITY: usize = 64;

/// Notification emitted by a handle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Open finished; the handle is usable
    Ready,
    /// Open failed; the handle stays unopened
    OpenFailed(String),
    /// Buffered writes reached durable storage
    Flushed,
    /// A replication session finished after flushing
    ReplicationComplete { imported: u64 },
}

pub(crate) fn channel() -> broadcast::Sender<Event> {
    broadcast::channel(EVENT_CAPACITY).0
}
