//! SQLite storage layer.
//!
//! Draft repository backed by SQLite with WAL mode and split read/write
//! connection pools.

pub mod draft;
pub mod pool;
