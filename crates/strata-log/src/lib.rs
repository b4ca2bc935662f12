//! Strata Log - content-addressed commit log
//!
//! This crate implements the storage collaborator the versioning layer
//! runs on: an append-only log of immutable nodes, the `heads` and
//! `layers` relations that track branches, the ordered data index holding
//! the *latest* and *changes* pointers, and the log side of replication.
//!
//! Everything above this crate talks to it through the [`Storage`] trait;
//! [`RedbLog`] is the redb-backed implementation.

pub mod error;
pub mod redb_log;
pub mod replication;
pub mod scan;
pub mod storage;
pub mod tables;

pub use error::{LogError, LogResult};
pub use redb_log::RedbLog;
pub use replication::{
    LogReplication, ReplicateOptions, ReplicationMessage, ReplicationMode, WireNode,
};
pub use storage::{ChangesOptions, KeyRange, Storage};
