//! Strata DB - branchable key-value store
//!
//! A versioning layer over the Strata commit log. Every write becomes an
//! immutable node; nodes form layers (branches), and any handle can be
//! pointed at a layer or frozen at a single node to read the store as it was
//! at that point.
//!
//! ```no_run
//! # async fn demo() -> strata_db::Result<()> {
//! use strata_db::{Db, DbOptions};
//!
//! let db = Db::open_dir("/tmp/store", DbOptions::new().create_if_missing(true)).await?;
//! let first = db.put("greeting", "hello").await?;
//! db.put("greeting", "hello again").await?;
//!
//! let then = db.checkout(first.key);
//! assert_eq!(then.get("greeting").await?, b"hello");
//! # Ok(())
//! # }
//! ```

mod chain;
mod commit;
mod db;
pub mod error;
pub mod events;
mod lifecycle;
mod merge;
pub mod options;
mod read;
pub mod replicate;
mod session;
mod write;

#[cfg(test)]
mod testing;

pub use db::Db;
pub use error::{Error, Result};
pub use events::Event;
pub use options::{BatchOp, DbOptions, ReadOptions};
pub use replicate::{ReplicationStream, pipe};
pub use session::Position;
pub use write::WriteStream;

pub use strata_log::{ChangesOptions, ReplicateOptions, ReplicationMessage, ReplicationMode};
