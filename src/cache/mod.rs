pub mod local;

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{CacheError, FlagError};
use crate::flag::Flag;

pub use local::LocalCache;

/// Default time-to-live of a cached flag.
pub const DEFAULT_TTL: Duration = Duration::from_secs(900);

/// A cached flag, or a cached confirmation that the flag does not exist.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub flag: Option<Flag>,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

/// Storage for cache entries.
///
/// Errors from a cache backend never reach callers of [`crate::FlagClient`];
/// the cache layer logs them and goes to the store instead.
pub trait FlagCache: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store `flag` (or `None` for a confirmed absence) stamped with now.
    fn put(&self, name: &str, flag: Option<Flag>) -> Result<(), CacheError>;

    fn evict(&self, name: &str) -> Result<(), CacheError>;

    fn flush(&self) -> Result<(), CacheError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot of a flag's cache generation, taken before reading or writing
/// the store. A result is only cached if nothing evicted or rewrote the
/// entry since the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    epoch: u64,
    flag: u64,
}

/// Eviction counters. `epoch` moves on every flush, the per-flag counter on
/// every eviction or local write of that flag.
#[derive(Default)]
struct Generations {
    epoch: RwLock<u64>,
    flags: DashMap<String, u64>,
}

/// Read-through, TTL-bounded cache in front of a flag store.
///
/// Expiry is lazy: an entry older than the TTL is a miss on its next access.
/// Invalidations evict entries early; the TTL only bounds staleness for a
/// node that missed one. A fetch or write that was already running when an
/// eviction landed does not put its result back.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn FlagCache>,
    ttl: Duration,
    generations: Arc<Generations>,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn FlagCache>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            generations: Arc::new(Generations::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend(&self) -> &Arc<dyn FlagCache> {
        &self.backend
    }

    pub fn generation(&self, name: &str) -> Generation {
        let epoch = self
            .generations
            .epoch
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Generation {
            epoch: *epoch,
            flag: self.generations.flags.get(name).map_or(0, |g| *g),
        }
    }

    /// Return the cached flag if still fresh, otherwise run `fetch` and
    /// cache what it returns.
    ///
    /// When `fetch` times out and an expired entry exists, that entry is
    /// returned instead of the error. Other fetch errors propagate.
    pub async fn lookup<F, Fut>(&self, name: &str, fetch: F) -> Result<Option<Flag>, FlagError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Flag>, FlagError>>,
    {
        let seen = self.generation(name);
        let cached = match self.backend.get(name) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(flag = name, error = %e, "cache read failed, reading store");
                None
            }
        };

        if let Some(entry) = &cached {
            if !entry.is_expired(self.ttl) {
                return Ok(entry.flag.clone());
            }
        }

        match fetch().await {
            Ok(found) => {
                if !self.put_if_current(name, seen, found.clone(), false) {
                    debug!(flag = name, "evicted during fetch, not caching");
                }
                Ok(found)
            }
            Err(e @ FlagError::Timeout { .. }) => match cached {
                Some(stale) => {
                    warn!(flag = name, error = %e, "store timed out, serving expired entry");
                    Ok(stale.flag)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Replace the local entry with a flag this process just wrote.
    ///
    /// `seen` is the generation taken before the store write. If another
    /// write or an eviction came in since, the entry is evicted instead so
    /// the next read goes to the store.
    pub fn store_written(&self, seen: Generation, flag: &Flag) {
        let value = if flag.is_empty() {
            None
        } else {
            Some(flag.clone())
        };
        if !self.put_if_current(flag.name(), seen, value, true) {
            debug!(flag = flag.name(), "overtaken by a newer change, evicting");
            self.invalidate(flag.name());
        }
    }

    pub fn invalidate(&self, name: &str) {
        debug!(flag = name, "evicting cached flag");
        let _epoch = self
            .generations
            .epoch
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut gen = self.generations.flags.entry(name.to_string()).or_insert(0);
        *gen += 1;
        if let Err(e) = self.backend.evict(name) {
            warn!(flag = name, error = %e, "cache evict failed");
        }
    }

    pub fn flush(&self) {
        let mut epoch = self
            .generations
            .epoch
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        self.generations.flags.clear();
        if let Err(e) = self.backend.flush() {
            warn!(error = %e, "cache flush failed");
        }
    }

    /// Put `flag` if the generation still matches `seen`. A local write also
    /// moves the generation so older in-flight results lose to it.
    fn put_if_current(
        &self,
        name: &str,
        seen: Generation,
        flag: Option<Flag>,
        write: bool,
    ) -> bool {
        let epoch = self
            .generations
            .epoch
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if *epoch != seen.epoch {
            return false;
        }
        let mut gen = self.generations.flags.entry(name.to_string()).or_insert(0);
        if *gen != seen.flag {
            return false;
        }
        if write {
            *gen += 1;
        }
        if let Err(e) = self.backend.put(name, flag) {
            warn!(flag = name, error = %e, "cache write failed");
        }
        true
    }
}
