//! Scripted network and instrumented storage shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};

use crate::Error;
use crate::cache::{CacheDb, CacheStorage, Snapshot};
use crate::network::{Network, NetworkError};
use crate::request::{InterceptedRequest, RequestKey};
use crate::response::Response;

/// Ordered record of network and storage calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

enum Scripted {
    Respond { status: StatusCode, content_type: &'static str, body: Bytes },
    Fail,
}

/// Network whose answers are scripted per URL.
///
/// Unscripted URLs answer 404. While offline every fetch fails.
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Scripted>>,
    offline: AtomicBool,
    pub journal: Journal,
}

impl FakeNetwork {
    pub fn new(journal: Journal) -> Self {
        Self { routes: Mutex::new(HashMap::new()), offline: AtomicBool::new(false), journal }
    }

    pub fn respond(&self, url: &str, status: StatusCode, content_type: &'static str, body: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Scripted::Respond { status, content_type, body: Bytes::from(body.to_string()) },
        );
    }

    pub fn ok(&self, url: &str, body: &str) {
        self.respond(url, StatusCode::OK, "text/plain", body);
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Scripted::Fail);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.journal.count("fetch ")
    }
}

#[async_trait::async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<Response, NetworkError> {
        self.journal.record(format!("fetch {} {}", request.method, request.url));

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Connect("network unreachable".into()));
        }

        let routes = self.routes.lock().unwrap();
        match routes.get(request.url.as_str()) {
            Some(Scripted::Respond { status, content_type, body }) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                Ok(Response::network(*status, headers, body.clone()))
            }
            Some(Scripted::Fail) => Err(NetworkError::Connect("connection refused".into())),
            None => Ok(Response::network(StatusCode::NOT_FOUND, HeaderMap::new(), Bytes::new())),
        }
    }
}

/// In-memory SQLite storage that journals calls and can inject failures.
pub struct TestStorage {
    pub db: CacheDb,
    pub journal: Journal,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    undeletable: Mutex<HashSet<String>>,
}

impl TestStorage {
    pub async fn new(journal: Journal) -> Self {
        Self {
            db: CacheDb::open_in_memory().await.unwrap(),
            journal,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            undeletable: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn refuse_delete(&self, store: &str) {
        self.undeletable.lock().unwrap().insert(store.to_string());
    }

    /// Number of storage calls of any kind.
    pub fn ops(&self) -> usize {
        self.journal.count("store ")
    }

    fn read(&self, op: &str) -> Result<(), Error> {
        self.journal.record(format!("store {op}"));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("{op} rejected")));
        }
        Ok(())
    }

    fn write(&self, op: &str) -> Result<(), Error> {
        self.journal.record(format!("store {op}"));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("{op} rejected")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheStorage for TestStorage {
    async fn open(&self, store: &str) -> Result<bool, Error> {
        self.write(&format!("open {store}"))?;
        self.db.open_store(store).await
    }

    async fn put(&self, store: &str, snapshot: &Snapshot) -> Result<(), Error> {
        self.write(&format!("put {store} {}", snapshot.key.url))?;
        self.db.put_snapshot(store, snapshot).await
    }

    async fn put_all(&self, store: &str, snapshots: &[Snapshot]) -> Result<(), Error> {
        self.write(&format!("put_all {store} {}", snapshots.len()))?;
        self.db.put_snapshots(store, snapshots).await
    }

    async fn get(&self, store: &str, key: &RequestKey) -> Result<Option<Snapshot>, Error> {
        self.read(&format!("get {store} {}", key.url))?;
        self.db.get_snapshot(store, key).await
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<Snapshot>, Error> {
        self.read(&format!("match {}", key.url))?;
        self.db.match_snapshot(key).await
    }

    async fn keys(&self, store: &str) -> Result<Vec<RequestKey>, Error> {
        self.read(&format!("keys {store}"))?;
        self.db.store_keys(store).await
    }

    async fn delete(&self, store: &str, key: &RequestKey) -> Result<bool, Error> {
        self.write(&format!("delete {store} {}", key.url))?;
        self.db.delete_snapshot(store, key).await
    }

    async fn delete_store(&self, store: &str) -> Result<bool, Error> {
        self.journal.record(format!("store delete_store {store}"));
        if self.undeletable.lock().unwrap().contains(store) {
            return Err(Error::Storage(format!("{store} is locked")));
        }
        self.db.drop_store(store).await
    }

    async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.read("store_names")?;
        self.db.list_stores().await
    }
}
