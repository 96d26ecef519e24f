use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::FlagStore;
use crate::error::StoreError;
use crate::flag::Flag;
use crate::gate::{Gate, GateKey};

const FLAG_PREFIX: &str = "flag:";

/// Persistent flag storage backed by sled.
///
/// Writes are read-modify-write cycles closed by a compare-and-swap on the
/// flag's key, retried until no other writer got in between. That makes each
/// mutation atomic per flag without a process-wide lock, and keeps it atomic
/// across every handle sharing the same `sled::Db`.
///
/// sled calls block (every write ends with an fsync), so each operation runs
/// on the blocking pool and a caller's timeout can fire while it is pending.
pub struct SledStore {
    db: sled::Db,
}

/// On-disk record of one flag.
#[derive(Serialize, Deserialize)]
struct StoredFlag {
    gates: Vec<Gate>,
    updated_at: String,
}

impl SledStore {
    pub fn new(db: sled::Db) -> Self {
        Self { db }
    }

    /// Open a sled database at the given directory path.
    pub fn open(data_dir: &str) -> Result<Self, StoreError> {
        let db = sled::open(data_dir)?;
        info!(path = data_dir, "flag store opened");
        Ok(Self::new(db))
    }

    /// A throwaway database removed when dropped.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::new(db))
    }

    fn flag_key(name: &str) -> String {
        format!("{}{}", FLAG_PREFIX, name)
    }

    fn decode(name: &str, bytes: &[u8]) -> Result<Flag, StoreError> {
        let stored: StoredFlag =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
                flag: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Flag::with_gates(name, stored.gates))
    }

    fn encode(flag: &Flag) -> Result<Vec<u8>, StoreError> {
        let stored = StoredFlag {
            gates: flag.gates().to_vec(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        serde_json::to_vec(&stored).map_err(|e| {
            StoreError::Backend(format!("failed to serialize flag {}: {}", flag.name(), e))
        })
    }

    /// Run `op` against the database on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&sled::Db) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))?
    }

    /// Apply `mutate` to the current flag and swap the result in atomically.
    /// A flag left without gates is removed.
    fn update<F>(db: &sled::Db, name: &str, mutate: F) -> Result<Flag, StoreError>
    where
        F: Fn(&mut Flag),
    {
        let key = Self::flag_key(name);
        loop {
            let current = db.get(&key)?;
            let mut flag = match &current {
                Some(bytes) => Self::decode(name, bytes)?,
                None => Flag::new(name),
            };
            mutate(&mut flag);

            let next = if flag.is_empty() {
                None
            } else {
                Some(Self::encode(&flag)?)
            };

            match db.compare_and_swap(&key, current.as_ref(), next)? {
                Ok(()) => {
                    db.flush()?;
                    return Ok(flag);
                }
                Err(_) => {
                    debug!(flag = name, "concurrent write, retrying");
                }
            }
        }
    }
}

#[async_trait]
impl FlagStore for SledStore {
    async fn get(&self, name: &str) -> Result<Option<Flag>, StoreError> {
        let name = name.to_string();
        self.blocking(move |db| match db.get(Self::flag_key(&name))? {
            Some(bytes) => Self::decode(&name, &bytes).map(Some),
            None => Ok(None),
        })
        .await
    }

    async fn upsert_gate(&self, name: &str, gate: Gate) -> Result<Flag, StoreError> {
        let name = name.to_string();
        self.blocking(move |db| Self::update(db, &name, |flag| flag.merge(gate.clone())))
            .await
    }

    async fn delete_gate(&self, name: &str, key: &GateKey) -> Result<Flag, StoreError> {
        let name = name.to_string();
        let key = key.clone();
        self.blocking(move |db| {
            Self::update(db, &name, |flag| {
                flag.remove(&key);
            })
        })
        .await
    }

    async fn delete_flag(&self, name: &str) -> Result<Flag, StoreError> {
        let name = name.to_string();
        self.blocking(move |db| {
            db.remove(Self::flag_key(&name))?;
            db.flush()?;
            Ok(Flag::new(&name))
        })
        .await
    }

    async fn flag_names(&self) -> Result<Vec<String>, StoreError> {
        self.blocking(|db| {
            let mut names = Vec::new();
            for item in db.scan_prefix(FLAG_PREFIX) {
                let (key, _) = item?;
                let key_str = std::str::from_utf8(&key)
                    .map_err(|e| StoreError::Backend(format!("invalid key encoding: {}", e)))?;
                if let Some(name) = key_str.strip_prefix(FLAG_PREFIX) {
                    names.push(name.to_string());
                }
            }
            Ok(names)
        })
        .await
    }
}
