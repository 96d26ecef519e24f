use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::FlagStore;
use crate::error::StoreError;
use crate::flag::Flag;
use crate::gate::{Gate, GateKey};

/// In-memory flag storage backed by a `RwLock<HashMap>`.
///
/// Shared between clients through an `Arc` it behaves like one store seen by
/// several processes.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Flag>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlagStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<Flag>, StoreError> {
        let data = self.data.read().await;
        Ok(data.get(name).cloned())
    }

    async fn upsert_gate(&self, name: &str, gate: Gate) -> Result<Flag, StoreError> {
        let mut data = self.data.write().await;
        let flag = data
            .entry(name.to_string())
            .or_insert_with(|| Flag::new(name));
        flag.merge(gate);
        Ok(flag.clone())
    }

    async fn delete_gate(&self, name: &str, key: &GateKey) -> Result<Flag, StoreError> {
        let mut data = self.data.write().await;
        let Some(flag) = data.get_mut(name) else {
            return Ok(Flag::new(name));
        };
        flag.remove(key);
        let remaining = flag.clone();
        if remaining.is_empty() {
            data.remove(name);
        }
        Ok(remaining)
    }

    async fn delete_flag(&self, name: &str) -> Result<Flag, StoreError> {
        let mut data = self.data.write().await;
        data.remove(name);
        Ok(Flag::new(name))
    }

    async fn flag_names(&self) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().await;
        let mut names: Vec<String> = data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_merges_and_returns_full_flag() {
        let store = MemoryStore::new();
        store.upsert_gate("f", Gate::boolean(true)).await.unwrap();
        let flag = store
            .upsert_gate("f", Gate::group("beta", true).unwrap())
            .await
            .unwrap();
        assert_eq!(flag.gates().len(), 2);
        assert_eq!(store.get("f").await.unwrap(), Some(flag));
    }

    #[tokio::test]
    async fn test_delete_gate_and_flag() {
        let store = MemoryStore::new();
        store.upsert_gate("f", Gate::boolean(true)).await.unwrap();
        store
            .upsert_gate("f", Gate::group("g", true).unwrap())
            .await
            .unwrap();

        let left = store.delete_gate("f", &GateKey::boolean()).await.unwrap();
        assert_eq!(left.gates().len(), 1);

        let left = store.delete_gate("f", &GateKey::group("g")).await.unwrap();
        assert!(left.is_empty());
        assert!(store.get("f").await.unwrap().is_none());

        store.upsert_gate("h", Gate::boolean(true)).await.unwrap();
        assert!(store.delete_flag("h").await.unwrap().is_empty());
        assert!(store.flag_names().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_do_not_lose_gates() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let gate = Gate::new(
                    crate::gate::GateKind::Actor,
                    Some(format!("user:{i}")),
                    true,
                )
                .unwrap();
                store.upsert_gate("f", gate).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let flag = store.get("f").await.unwrap().unwrap();
        assert_eq!(flag.gates().len(), 32);
    }
}
