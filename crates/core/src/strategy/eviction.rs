//! FIFO size bound for the api store.
//!
//! Entries are trimmed strictly by insertion order; reads do not refresh an
//! entry's position.

use crate::Error;
use crate::cache::CacheStorage;

/// Delete the oldest keys of `store` until at most `max_entries` remain.
///
/// Returns the number of keys deleted.
pub async fn trim_fifo(storage: &dyn CacheStorage, store: &str, max_entries: usize) -> Result<usize, Error> {
    let keys = storage.keys(store).await?;
    if keys.len() <= max_entries {
        return Ok(0);
    }

    let excess = keys.len() - max_entries;
    let mut deleted = 0;
    for key in keys.into_iter().take(excess) {
        if storage.delete(store, &key).await? {
            deleted += 1;
        }
    }

    tracing::debug!(store, deleted, max_entries, "trimmed store");
    Ok(deleted)
}
