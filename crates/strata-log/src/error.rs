//! Error types for log operations

use thiserror::Error;

/// Error type for log operations
#[derive(Debug, Error)]
pub enum LogError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("no layer recorded for node: {0}")]
    LayerNotFound(String),
    #[error("parent node missing from log: {0}")]
    MissingParent(String),
    #[error("corrupt log entry: {0}")]
    Corrupt(String),
    #[error("replication error: {0}")]
    Replication(String),
}

impl From<redb::TransactionError> for LogError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl LogError {
    /// Check if this is a missing-entry error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound(_) | Self::LayerNotFound(_))
    }
}

pub type LogResult<T> = Result<T, LogError>;
