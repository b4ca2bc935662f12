//! Strata Common - Shared types and utilities
//!
//! This crate provides the commit-log data model, the exact key-space
//! encodings of the secondary indices, and configuration structures used
//! across all Strata components.

pub mod config;
pub mod keys;
pub mod types;

pub use config::{Config, StorageConfig, StreamConfig, SyncMode};
pub use keys::KeyError;
pub use types::*;
