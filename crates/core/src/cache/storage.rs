//! Store API consumed by the engine.
//!
//! Every operation is asynchronous and may fail with a storage error. The
//! SQLite-backed [`CacheDb`] is the production implementation.

use super::connection::CacheDb;
use super::snapshots::Snapshot;
use crate::Error;
use crate::request::RequestKey;

/// Named, persistent key to snapshot stores.
#[async_trait::async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open (create if absent) a store. Returns true when it was created.
    async fn open(&self, store: &str) -> Result<bool, Error>;

    /// Insert or overwrite one snapshot, creating the store if needed.
    async fn put(&self, store: &str, snapshot: &Snapshot) -> Result<(), Error>;

    /// Insert a batch; all or nothing.
    async fn put_all(&self, store: &str, snapshots: &[Snapshot]) -> Result<(), Error>;

    /// Look up a key in one store.
    async fn get(&self, store: &str, key: &RequestKey) -> Result<Option<Snapshot>, Error>;

    /// Look up a key across every store.
    async fn match_any(&self, key: &RequestKey) -> Result<Option<Snapshot>, Error>;

    /// Keys of a store in insertion order, oldest first.
    async fn keys(&self, store: &str) -> Result<Vec<RequestKey>, Error>;

    async fn delete(&self, store: &str, key: &RequestKey) -> Result<bool, Error>;

    async fn delete_store(&self, store: &str) -> Result<bool, Error>;

    async fn store_names(&self) -> Result<Vec<String>, Error>;
}

#[async_trait::async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, store: &str) -> Result<bool, Error> {
        self.open_store(store).await
    }

    async fn put(&self, store: &str, snapshot: &Snapshot) -> Result<(), Error> {
        self.put_snapshot(store, snapshot).await
    }

    async fn put_all(&self, store: &str, snapshots: &[Snapshot]) -> Result<(), Error> {
        self.put_snapshots(store, snapshots).await
    }

    async fn get(&self, store: &str, key: &RequestKey) -> Result<Option<Snapshot>, Error> {
        self.get_snapshot(store, key).await
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<Snapshot>, Error> {
        self.match_snapshot(key).await
    }

    async fn keys(&self, store: &str) -> Result<Vec<RequestKey>, Error> {
        self.store_keys(store).await
    }

    async fn delete(&self, store: &str, key: &RequestKey) -> Result<bool, Error> {
        self.delete_snapshot(store, key).await
    }

    async fn delete_store(&self, store: &str) -> Result<bool, Error> {
        self.drop_store(store).await
    }

    async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.list_stores().await
    }
}
