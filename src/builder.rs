use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheLayer, FlagCache, LocalCache, DEFAULT_TTL};
use crate::client::FlagClient;
use crate::notify::{self, Notifier};
use crate::store::FlagStore;

pub struct FlagClientBuilder {
    store: Arc<dyn FlagStore>,
    cache_enabled: bool,
    cache_ttl: Duration,
    cache_backend: Option<Arc<dyn FlagCache>>,
    notifier: Option<Arc<dyn Notifier>>,
    store_timeout: Option<Duration>,
    node_id: Option<String>,
}

pub fn create_builder(store: Arc<dyn FlagStore>) -> FlagClientBuilder {
    FlagClientBuilder {
        store,
        cache_enabled: true,
        cache_ttl: DEFAULT_TTL,
        cache_backend: None,
        notifier: None,
        store_timeout: None,
        node_id: None,
    }
}

impl FlagClientBuilder {
    /// With the cache disabled every lookup reads the store.
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Replace the default [`LocalCache`].
    pub fn cache_backend(mut self, backend: Arc<dyn FlagCache>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// Origin id stamped on published invalidations. Defaults to a fresh
    /// UUID, so two clients never share one unless told to.
    pub fn node_id(mut self, node_id: &str) -> Self {
        self.node_id = Some(node_id.to_string());
        self
    }

    /// Build the client.
    ///
    /// With both a cache and a notifier, this also starts the invalidation
    /// listener, which needs a tokio runtime. Without one the client still
    /// works and relies on the TTL alone.
    pub fn build(self) -> FlagClient {
        let node_id = self
            .node_id
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

        let cache = if self.cache_enabled {
            let backend = self
                .cache_backend
                .unwrap_or_else(|| Arc::new(LocalCache::new()));
            Some(CacheLayer::new(backend, self.cache_ttl))
        } else {
            None
        };

        let listener = match (&cache, &self.notifier) {
            (Some(cache), Some(notifier)) => start_listener(cache, notifier.as_ref(), &node_id),
            _ => None,
        };

        FlagClient::from_parts(
            self.store,
            cache,
            self.notifier,
            self.store_timeout,
            node_id,
            listener,
        )
    }
}

fn start_listener(
    cache: &CacheLayer,
    notifier: &dyn Notifier,
    node_id: &str,
) -> Option<JoinHandle<()>> {
    if tokio::runtime::Handle::try_current().is_err() {
        warn!("no tokio runtime, cache relies on TTL only");
        return None;
    }
    match notifier.subscribe() {
        Ok(rx) => {
            debug!(node_id, "listening for invalidations");
            Some(notify::spawn_listener(cache.clone(), rx, node_id.to_string()))
        }
        Err(e) => {
            warn!(error = %e, "cannot subscribe to invalidations, cache relies on TTL only");
            None
        }
    }
}
