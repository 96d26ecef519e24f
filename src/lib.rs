//! Feature flags with boolean, actor and group gates.
//!
//! Flags live in a shared [`FlagStore`]. Each [`FlagClient`] keeps a
//! TTL-bounded local cache in front of it and evicts entries when another
//! client publishes an [`Invalidation`] for a flag it wrote.
//!
//! ```
//! use std::collections::HashSet;
//! use std::sync::Arc;
//!
//! use flaggate::{FlagClient, GroupMembership, Identity, MemoryStore, Scope, Target};
//!
//! struct User {
//!     id: u64,
//!     beta: bool,
//! }
//!
//! impl Identity for User {
//!     fn actor_id(&self) -> String {
//!         format!("user:{}", self.id)
//!     }
//! }
//!
//! impl GroupMembership for User {
//!     fn groups(&self) -> HashSet<String> {
//!         let mut groups = HashSet::new();
//!         if self.beta {
//!             groups.insert("beta".to_string());
//!         }
//!         groups
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), flaggate::FlagError> {
//! let client = FlagClient::builder(Arc::new(MemoryStore::new())).build();
//! client.enable("checkout-v2", Scope::Group("beta")).await?;
//!
//! let tester = User { id: 1, beta: true };
//! let other = User { id: 2, beta: false };
//! assert!(client.is_enabled_for("checkout-v2", Target::of(&tester)).await?);
//! assert!(!client.is_enabled_for("checkout-v2", Target::of(&other)).await?);
//! assert!(!client.is_enabled("checkout-v2").await?);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod eval;
pub mod flag;
pub mod gate;
pub mod notify;
pub mod store;
pub mod target;

pub use builder::FlagClientBuilder;
pub use cache::{CacheEntry, CacheLayer, FlagCache, Generation, LocalCache};
pub use client::{FlagClient, Scope};
pub use config::{Config, StorageBackend};
pub use error::{CacheError, ConfigError, FlagError, GateError, NotifyError, StoreError};
pub use eval::{evaluate, evaluate_for};
pub use flag::Flag;
pub use gate::{Gate, GateKey, GateKind};
pub use notify::{BroadcastNotifier, Invalidation, Notifier};
pub use store::{FlagStore, MemoryStore, SledStore};
pub use target::{GroupMembership, Identity, Target};
