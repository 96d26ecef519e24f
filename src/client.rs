use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::builder::{self, FlagClientBuilder};
use crate::cache::{CacheLayer, Generation};
use crate::config::{Config, StorageBackend};
use crate::error::{ConfigError, FlagError, GateError, StoreError};
use crate::eval::{evaluate, evaluate_for};
use crate::flag::Flag;
use crate::gate::{Gate, GateKey};
use crate::notify::{Invalidation, Notifier};
use crate::store::{FlagStore, MemoryStore, SledStore};
use crate::target::{Identity, Target};

/// What a write applies to.
#[derive(Clone, Copy, Default)]
pub enum Scope<'a> {
    /// The boolean gate.
    #[default]
    Global,
    Actor(&'a dyn Identity),
    Group(&'a str),
}

/// `None` means no scope, the same as [`Scope::Global`].
impl<'a> From<Option<Scope<'a>>> for Scope<'a> {
    fn from(scope: Option<Scope<'a>>) -> Self {
        scope.unwrap_or_default()
    }
}

/// Reads and writes feature flags.
///
/// Reads go through the cache layer (unless disabled) and are evaluated
/// locally. Writes go to the store, refresh this client's own cache with the
/// flag the store returned, and publish an invalidation for everyone else.
pub struct FlagClient {
    store: Arc<dyn FlagStore>,
    cache: Option<CacheLayer>,
    notifier: Option<Arc<dyn Notifier>>,
    store_timeout: Option<Duration>,
    node_id: String,
    listener: Option<JoinHandle<()>>,
}

impl FlagClient {
    pub fn builder(store: Arc<dyn FlagStore>) -> FlagClientBuilder {
        builder::create_builder(store)
    }

    /// Open the configured store and build a client from `config`.
    ///
    /// `notifier` is the process's invalidation channel. It is ignored when
    /// notifications are disabled in the config.
    pub fn from_config(
        config: &Config,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Self, ConfigError> {
        let store: Arc<dyn FlagStore> = match config.store.backend {
            StorageBackend::Sled => Arc::new(SledStore::open(&config.store.data_dir)?),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let mut builder = Self::builder(store)
            .cache_enabled(config.cache.enabled)
            .cache_ttl(config.cache_ttl());
        if let Some(timeout) = config.store_timeout() {
            builder = builder.store_timeout(timeout);
        }
        match notifier {
            Some(n) if config.notifications.enabled => builder = builder.notifier(n),
            Some(_) => debug!("notifications disabled by config"),
            None => {}
        }
        Ok(builder.build())
    }

    pub(crate) fn from_parts(
        store: Arc<dyn FlagStore>,
        cache: Option<CacheLayer>,
        notifier: Option<Arc<dyn Notifier>>,
        store_timeout: Option<Duration>,
        node_id: String,
        listener: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
            store_timeout,
            node_id,
            listener,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn cache(&self) -> Option<&CacheLayer> {
        self.cache.as_ref()
    }

    // ── Reads ────────────────────────────────────────────────

    /// Global value of a flag. A flag that was never written is `false`.
    pub async fn is_enabled(&self, name: &str) -> Result<bool, FlagError> {
        let flag = self.get_flag(name).await?;
        Ok(evaluate(&flag))
    }

    /// Value of a flag for an item. `None` is the same as [`Self::is_enabled`].
    pub async fn is_enabled_for<'a>(
        &self,
        name: &str,
        target: impl Into<Option<Target<'a>>>,
    ) -> Result<bool, FlagError> {
        let target = target.into();
        let flag = self.get_flag(name).await?;
        Ok(match target {
            Some(t) => evaluate_for(&flag, &t),
            None => evaluate(&flag),
        })
    }

    /// Current gates of a flag, empty if it was never written.
    pub async fn get_flag(&self, name: &str) -> Result<Flag, FlagError> {
        let found = match &self.cache {
            Some(cache) => cache.lookup(name, || self.fetch(name)).await?,
            None => self.fetch(name).await?,
        };
        Ok(found.unwrap_or_else(|| Flag::new(name)))
    }

    /// Every stored flag, read from the store.
    pub async fn all_flags(&self) -> Result<Vec<Flag>, FlagError> {
        self.with_timeout("*", self.store.all_flags()).await
    }

    pub async fn all_flag_names(&self) -> Result<Vec<String>, FlagError> {
        self.with_timeout("*", self.store.flag_names()).await
    }

    // ── Writes ───────────────────────────────────────────────

    /// Enable a flag for a scope and return its resulting value there.
    ///
    /// Global and actor writes return the flag evaluated for that scope; a
    /// group write returns `true`, the value written.
    pub async fn enable<'a>(
        &self,
        name: &str,
        scope: impl Into<Scope<'a>>,
    ) -> Result<bool, FlagError> {
        self.set(name, scope.into(), true).await
    }

    /// Symmetric to [`Self::enable`].
    pub async fn disable<'a>(
        &self,
        name: &str,
        scope: impl Into<Scope<'a>>,
    ) -> Result<bool, FlagError> {
        self.set(name, scope.into(), false).await
    }

    /// Remove gates. [`Scope::Global`] removes the whole flag; actor and
    /// group scopes remove only that gate.
    pub async fn clear<'a>(&self, name: &str, scope: impl Into<Scope<'a>>) -> Result<(), FlagError> {
        let seen = self.generation(name);
        let flag = match scope.into() {
            Scope::Global => self.with_timeout(name, self.store.delete_flag(name)).await?,
            scoped => {
                let key = gate_key(scoped)?;
                self.with_timeout(name, self.store.delete_gate(name, &key))
                    .await?
            }
        };
        self.written(seen, &flag).await;
        Ok(())
    }

    /// Remove only the boolean gate, keeping actor and group gates.
    pub async fn clear_boolean(&self, name: &str) -> Result<(), FlagError> {
        let seen = self.generation(name);
        let flag = self
            .with_timeout(name, self.store.delete_gate(name, &GateKey::boolean()))
            .await?;
        self.written(seen, &flag).await;
        Ok(())
    }

    async fn set(&self, name: &str, scope: Scope<'_>, enabled: bool) -> Result<bool, FlagError> {
        let gate = match scope {
            Scope::Global => Gate::boolean(enabled),
            Scope::Actor(actor) => Gate::actor(actor, enabled)?,
            Scope::Group(group) => Gate::group(group, enabled)?,
        };

        let seen = self.generation(name);
        let flag = self
            .with_timeout(name, self.store.upsert_gate(name, gate))
            .await?;
        self.written(seen, &flag).await;

        // Evaluated from the flag the store returned, not the cache, so the
        // write is visible here whatever the TTL or broadcast delay.
        Ok(match scope {
            Scope::Global => evaluate(&flag),
            Scope::Actor(actor) => evaluate_for(&flag, &Target::actor(actor)),
            Scope::Group(_) => enabled,
        })
    }

    // ── Plumbing ─────────────────────────────────────────────

    async fn fetch(&self, name: &str) -> Result<Option<Flag>, FlagError> {
        self.with_timeout(name, self.store.get(name)).await
    }

    async fn with_timeout<T>(
        &self,
        name: &str,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, FlagError> {
        match self.store_timeout {
            Some(after) => match tokio::time::timeout(after, op).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(FlagError::Timeout {
                    flag: name.to_string(),
                    after,
                }),
            },
            None => Ok(op.await?),
        }
    }

    fn generation(&self, name: &str) -> Option<Generation> {
        self.cache.as_ref().map(|cache| cache.generation(name))
    }

    /// Refresh our own cache and tell other nodes to drop theirs.
    async fn written(&self, seen: Option<Generation>, flag: &Flag) {
        if let (Some(cache), Some(seen)) = (&self.cache, seen) {
            cache.store_written(seen, flag);
        }
        if let Some(notifier) = &self.notifier {
            let msg = Invalidation {
                flag_name: flag.name().to_string(),
                origin: self.node_id.clone(),
            };
            if let Err(e) = notifier.publish(msg).await {
                warn!(flag = flag.name(), error = %e, "failed to publish invalidation");
            }
        }
    }
}

impl Drop for FlagClient {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn gate_key(scope: Scope<'_>) -> Result<GateKey, GateError> {
    let key = match scope {
        Scope::Global => GateKey::boolean(),
        Scope::Actor(actor) => GateKey::actor(actor.actor_id()),
        Scope::Group(group) => GateKey::group(group),
    };
    if key.subject.as_deref() == Some("") {
        return Err(GateError::MissingSubject(key.kind));
    }
    Ok(key)
}
