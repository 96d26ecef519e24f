use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheLayer;
use crate::error::NotifyError;

/// Message telling every cache holder to drop its entry for `flag_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invalidation {
    pub flag_name: String,
    /// Node id of the client that wrote the flag.
    pub origin: String,
}

/// Broadcast channel for cache invalidations.
///
/// Delivery is best effort: a node that misses a message catches up once its
/// cached entry expires.
///
/// Subscribers receive a tokio broadcast receiver. A transport over an
/// external bus (Redis pub/sub, NATS, a database channel) bridges into one:
/// it keeps a `broadcast::Sender`, forwards every message it receives from
/// the bus into it from a task of its own, and hands out
/// `sender.subscribe()`. Dropping messages in the bridge is fine, the TTL
/// covers them; closing the sender stops the listeners.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, msg: Invalidation) -> Result<(), NotifyError>;

    fn subscribe(&self) -> Result<broadcast::Receiver<Invalidation>, NotifyError>;
}

/// In-process invalidation bus over a tokio broadcast channel.
///
/// Clients sharing one `BroadcastNotifier` see each other's writes the way
/// separate processes would through an external pub/sub bus.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Invalidation>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, msg: Invalidation) -> Result<(), NotifyError> {
        let _ = self.tx.send(msg); // ignore error if no subscribers
        Ok(())
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<Invalidation>, NotifyError> {
        Ok(self.tx.subscribe())
    }
}

/// Evict cache entries as invalidations arrive.
///
/// Messages from `node_id` itself are skipped, the writer already holds the
/// flag it wrote. If the receiver lagged and messages were dropped, the
/// whole cache is flushed since there is no telling which flags changed.
pub fn spawn_listener(
    cache: CacheLayer,
    mut rx: broadcast::Receiver<Invalidation>,
    node_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if msg.origin == node_id {
                        continue;
                    }
                    debug!(flag = %msg.flag_name, origin = %msg.origin, "invalidation received");
                    cache.invalidate(&msg.flag_name);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "invalidation listener lagged, flushing cache");
                    cache.flush();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("invalidation channel closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cache::LocalCache;
    use crate::flag::Flag;
    use crate::gate::Gate;

    fn cached(name: &str) -> Flag {
        Flag::with_gates(name, [Gate::boolean(true)])
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_listener_evicts_foreign_invalidations() {
        let bus = BroadcastNotifier::new();
        let cache = CacheLayer::new(Arc::new(LocalCache::new()), Duration::from_secs(60));
        cache.store_written(cache.generation("a"), &cached("a"));
        cache.store_written(cache.generation("b"), &cached("b"));

        let handle = spawn_listener(cache.clone(), bus.subscribe().unwrap(), "me".into());
        bus.publish(Invalidation {
            flag_name: "a".into(),
            origin: "other".into(),
        })
        .await
        .unwrap();
        bus.publish(Invalidation {
            flag_name: "b".into(),
            origin: "me".into(),
        })
        .await
        .unwrap();
        settle().await;

        assert!(cache.backend().get("a").unwrap().is_none());
        assert!(cache.backend().get("b").unwrap().is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn test_lagged_listener_flushes() {
        let bus = BroadcastNotifier::with_capacity(1);
        let cache = CacheLayer::new(Arc::new(LocalCache::new()), Duration::from_secs(60));
        cache.store_written(cache.generation("keep-me"), &cached("keep-me"));
        let rx = bus.subscribe().unwrap();

        for name in ["x", "y", "z"] {
            bus.publish(Invalidation {
                flag_name: name.into(),
                origin: "other".into(),
            })
            .await
            .unwrap();
        }
        let handle = spawn_listener(cache.clone(), rx, "me".into());
        settle().await;

        assert!(cache.backend().is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = BroadcastNotifier::new();
        assert!(bus
            .publish(Invalidation {
                flag_name: "f".into(),
                origin: "me".into(),
            })
            .await
            .is_ok());
    }

    /// Transport that goes through an outside queue and bridges back into a
    /// broadcast channel.
    struct QueueBridge {
        outbound: tokio::sync::mpsc::UnboundedSender<Invalidation>,
        inbound: broadcast::Sender<Invalidation>,
    }

    impl QueueBridge {
        fn start() -> Self {
            let (outbound, mut queue) = tokio::sync::mpsc::unbounded_channel::<Invalidation>();
            let (inbound, _) = broadcast::channel(16);
            let pump = inbound.clone();
            tokio::spawn(async move {
                while let Some(msg) = queue.recv().await {
                    let _ = pump.send(msg);
                }
            });
            Self { outbound, inbound }
        }
    }

    #[async_trait]
    impl Notifier for QueueBridge {
        async fn publish(&self, msg: Invalidation) -> Result<(), NotifyError> {
            self.outbound
                .send(msg)
                .map_err(|e| NotifyError::Unavailable(e.to_string()))
        }

        fn subscribe(&self) -> Result<broadcast::Receiver<Invalidation>, NotifyError> {
            Ok(self.inbound.subscribe())
        }
    }

    #[tokio::test]
    async fn test_bridged_transport_drives_listener() {
        let bus = QueueBridge::start();
        let cache = CacheLayer::new(Arc::new(LocalCache::new()), Duration::from_secs(60));
        cache.store_written(cache.generation("a"), &cached("a"));

        let handle = spawn_listener(cache.clone(), bus.subscribe().unwrap(), "me".into());
        bus.publish(Invalidation {
            flag_name: "a".into(),
            origin: "other".into(),
        })
        .await
        .unwrap();
        settle().await;

        assert!(cache.backend().get("a").unwrap().is_none());
        handle.abort();
    }
}
