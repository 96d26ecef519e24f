pub mod memory;
pub mod sled_store;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::flag::Flag;
use crate::gate::{Gate, GateKey};

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// Durable source of truth for flags. Implementations must be thread-safe.
///
/// Every mutation is atomic per flag name: concurrent writes to different
/// gates of the same flag must all survive, and writes to the same gate are
/// last-write-wins in the store's own order.
#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Load a flag. `Ok(None)` means the flag has never been written (or was
    /// cleared) and is not an error.
    async fn get(&self, name: &str) -> Result<Option<Flag>, StoreError>;

    /// Merge `gate` into the stored flag, creating it if needed, and return
    /// the resulting flag.
    async fn upsert_gate(&self, name: &str, gate: Gate) -> Result<Flag, StoreError>;

    /// Remove one gate and return what is left.
    async fn delete_gate(&self, name: &str, key: &GateKey) -> Result<Flag, StoreError>;

    /// Remove every gate of a flag. Returns the now empty flag.
    async fn delete_flag(&self, name: &str) -> Result<Flag, StoreError>;

    /// Names of all stored flags, sorted.
    async fn flag_names(&self) -> Result<Vec<String>, StoreError>;

    async fn all_flags(&self) -> Result<Vec<Flag>, StoreError> {
        let mut flags = Vec::new();
        for name in self.flag_names().await? {
            if let Some(flag) = self.get(&name).await? {
                flags.push(flag);
            }
        }
        Ok(flags)
    }
}
