//! SQLite-backed versioned stores of response snapshots.
//!
//! This module provides named, persistent stores with async access via
//! tokio-rusqlite. It supports:
//!
//! - Several independently named stores in one database
//! - Explicit FIFO insertion order per store
//! - Atomic batch writes for install-time preloading
//! - Automatic schema migrations and WAL mode

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod snapshots;
pub mod storage;

pub use crate::Error;

pub use connection::CacheDb;
pub use snapshots::Snapshot;
pub use storage::CacheStorage;
