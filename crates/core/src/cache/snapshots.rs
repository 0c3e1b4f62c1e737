//! Snapshot CRUD operations.
//!
//! Every versioned store is a row in `stores`; its snapshots live in
//! `entries`. Insertion order is tracked explicitly through `seq` so key
//! enumeration is FIFO regardless of how SQLite lays rows out.

use super::connection::CacheDb;
use crate::Error;
use crate::request::RequestKey;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio_rusqlite::rusqlite::{self, OptionalExtension};
use tokio_rusqlite::params;
use url::Url;

/// An immutable capture of a response under its request identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub key: RequestKey,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: String,
}

const SELECT_COLUMNS: &str = "e.method, e.url, e.status, e.headers_json, e.body, e.stored_at";

impl CacheDb {
    /// Create the named store if it does not exist.
    ///
    /// Returns true when the store was created by this call.
    pub async fn open_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let created =
                    conn.execute("INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)", params![name, now])?;
                Ok(created == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a store with this name exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or overwrite a snapshot, creating the store if needed.
    ///
    /// An overwrite moves the entry to the newest insertion position.
    pub async fn put_snapshot(&self, store: &str, snapshot: &Snapshot) -> Result<(), Error> {
        self.put_snapshots(store, std::slice::from_ref(snapshot)).await
    }

    /// Write a batch of snapshots in one transaction.
    ///
    /// Either every snapshot is committed or none is.
    pub async fn put_snapshots(&self, store: &str, snapshots: &[Snapshot]) -> Result<(), Error> {
        for snapshot in snapshots {
            ensure_cacheable(&snapshot.key)?;
        }

        let store = store.to_string();
        let rows = snapshots.iter().map(EncodedSnapshot::encode).collect::<Result<Vec<_>, _>>()?;
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute("INSERT OR IGNORE INTO stores (name, created_at) VALUES (?1, ?2)", params![store, now])?;

                for row in &rows {
                    let seq: i64 = tx.query_row(
                        "SELECT COALESCE(MAX(seq), 0) + 1 FROM entries WHERE store = ?1",
                        params![store],
                        |r| r.get(0),
                    )?;
                    tx.execute(
                        "INSERT INTO entries (
                            store, key_hash, method, url, seq, status, headers_json, body, stored_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                        ON CONFLICT(store, key_hash) DO UPDATE SET
                            seq = excluded.seq,
                            status = excluded.status,
                            headers_json = excluded.headers_json,
                            body = excluded.body,
                            stored_at = excluded.stored_at",
                        params![
                            store,
                            row.key_hash,
                            row.method,
                            row.url,
                            seq,
                            row.status,
                            row.headers_json,
                            &row.body[..],
                            row.stored_at,
                        ],
                    )?;
                }

                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a snapshot from one store.
    ///
    /// Returns None if the store or the key doesn't exist.
    pub async fn get_snapshot(&self, store: &str, key: &RequestKey) -> Result<Option<Snapshot>, Error> {
        let store = store.to_string();
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<Snapshot>, Error> {
                let row = conn
                    .query_row(
                        &format!("SELECT {SELECT_COLUMNS} FROM entries e WHERE e.store = ?1 AND e.key_hash = ?2"),
                        params![store, key_hash],
                        RawRow::read,
                    )
                    .optional()?;
                row.map(RawRow::decode).transpose()
            })
            .await
            .map_err(Error::from)
    }

    /// Find a snapshot in any store, probing stores in creation order.
    pub async fn match_snapshot(&self, key: &RequestKey) -> Result<Option<Snapshot>, Error> {
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<Snapshot>, Error> {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT {SELECT_COLUMNS} FROM entries e
                             JOIN stores s ON s.name = e.store
                             WHERE e.key_hash = ?1
                             ORDER BY s.rowid ASC
                             LIMIT 1"
                        ),
                        params![key_hash],
                        RawRow::read,
                    )
                    .optional()?;
                row.map(RawRow::decode).transpose()
            })
            .await
            .map_err(Error::from)
    }

    /// List the keys of a store, oldest insertion first.
    pub async fn store_keys(&self, store: &str) -> Result<Vec<RequestKey>, Error> {
        let store = store.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE store = ?1 ORDER BY seq ASC")?;
                let rows = stmt
                    .query_map(params![store], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;

                rows.into_iter()
                    .map(|(method, url)| decode_key(&method, &url))
                    .collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one snapshot. Returns true if it existed.
    pub async fn delete_snapshot(&self, store: &str, key: &RequestKey) -> Result<bool, Error> {
        let store = store.to_string();
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count =
                    conn.execute("DELETE FROM entries WHERE store = ?1 AND key_hash = ?2", params![store, key_hash])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a whole store and its snapshots. Returns true if it existed.
    pub async fn drop_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM stores WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// List store names in creation order.
    pub async fn list_stores(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }
}

fn ensure_cacheable(key: &RequestKey) -> Result<(), Error> {
    if key.method != Method::GET {
        return Err(Error::InvalidInput(format!("only GET requests can be cached, got {key}")));
    }
    Ok(())
}

/// Snapshot columns ready to bind.
struct EncodedSnapshot {
    key_hash: String,
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Bytes,
    stored_at: String,
}

impl EncodedSnapshot {
    fn encode(snapshot: &Snapshot) -> Result<Self, Error> {
        Ok(Self {
            key_hash: snapshot.key.hash(),
            method: snapshot.key.method.to_string(),
            url: snapshot.key.url.to_string(),
            status: i64::from(snapshot.status.as_u16()),
            headers_json: encode_headers(&snapshot.headers)?,
            body: snapshot.body.clone(),
            stored_at: snapshot.stored_at.clone(),
        })
    }
}

/// Snapshot columns as read back from SQLite.
struct RawRow {
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
    stored_at: String,
}

impl RawRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            method: row.get(0)?,
            url: row.get(1)?,
            status: row.get(2)?,
            headers_json: row.get(3)?,
            body: row.get(4)?,
            stored_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<Snapshot, Error> {
        let key = decode_key(&self.method, &self.url)?;
        let status = u16::try_from(self.status)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| Error::CorruptSnapshot(format!("invalid status {}", self.status)))?;

        Ok(Snapshot {
            key,
            status,
            headers: decode_headers(&self.headers_json)?,
            body: Bytes::from(self.body),
            stored_at: self.stored_at,
        })
    }
}

fn decode_key(method: &str, url: &str) -> Result<RequestKey, Error> {
    let method = Method::from_bytes(method.as_bytes()).map_err(|e| Error::CorruptSnapshot(e.to_string()))?;
    let url = Url::parse(url).map_err(|e| Error::CorruptSnapshot(e.to_string()))?;
    Ok(RequestKey::new(method, url))
}

fn encode_headers(headers: &HeaderMap) -> Result<String, Error> {
    let pairs: Vec<(&str, &str)> = headers
        .iter()
        .filter_map(|(name, value)| match value.to_str() {
            Ok(v) => Some((name.as_str(), v)),
            Err(_) => {
                tracing::debug!(header = %name, "dropping non-ASCII header value from snapshot");
                None
            }
        })
        .collect();

    serde_json::to_string(&pairs).map_err(|e| Error::CorruptSnapshot(e.to_string()))
}

fn decode_headers(json: &str) -> Result<HeaderMap, Error> {
    let pairs: Vec<(String, String)> = serde_json::from_str(json).map_err(|e| Error::CorruptSnapshot(e.to_string()))?;

    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::CorruptSnapshot(e.to_string()))?;
        let value = HeaderValue::from_str(&value).map_err(|e| Error::CorruptSnapshot(e.to_string()))?;
        headers.append(name, value);
    }
    Ok(headers)
}
