use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheEntry, FlagCache};
use crate::error::CacheError;
use crate::flag::Flag;

/// Process-local cache over a sharded concurrent map.
///
/// Each shard has its own lock, so contention on one flag never blocks
/// lookups of unrelated flags.
#[derive(Default)]
pub struct LocalCache {
    entries: DashMap<String, CacheEntry>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagCache for LocalCache {
    fn get(&self, name: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(name).map(|e| e.value().clone()))
    }

    fn put(&self, name: &str, flag: Option<Flag>) -> Result<(), CacheError> {
        self.entries.insert(
            name.to_string(),
            CacheEntry {
                flag,
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn evict(&self, name: &str) -> Result<(), CacheError> {
        self.entries.remove(name);
        Ok(())
    }

    fn flush(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
