//! Key-value storage backends and the durability tier ladder
//!
//! The whole engine persists through a string key-value store with
//! browser-storage semantics: `get` returns the value or nothing, `set` may
//! fail with a quota error, `remove` is unconditional. Quota failure is a
//! first-class, expected outcome - not an exceptional one.
//!
//! Capacity exhaustion is handled by an explicit [`TieredStore`]: an ordered
//! list of backing stores with decreasing durability. A write walks the
//! tiers in order and reports which tier ultimately took it, so callers can
//! emit one structured warning instead of nesting fallback logic at every
//! call site.
//!
//! # Example
//!
//! ```rust
//! use keepsake::storage::{KeyValueStore, MemoryStore, StorageTier, TieredStore};
//! use std::sync::Arc;
//!
//! let durable = Arc::new(MemoryStore::with_capacity(64));
//! let volatile = Arc::new(MemoryStore::new());
//! let tiers = TieredStore::new(vec![
//!     StorageTier::new("local", durable),
//!     StorageTier::new("session", volatile),
//! ]);
//!
//! // A write too large for the durable tier lands in the volatile one
//! let receipt = tiers.write_with_fallback("big", &"x".repeat(100)).unwrap();
//! assert!(receipt.degraded());
//! assert_eq!(receipt.tier_name, "session");
//! ```

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::{KeepsakeError, Result};

/// A string key-value store with browser-storage semantics
///
/// Implementations must treat `set` failure as an ordinary outcome: the
/// engine responds to [`KeepsakeError::QuotaExceeded`] by pruning and
/// falling back through the tier ladder, never by crashing.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`
    ///
    /// # Errors
    ///
    /// [`KeepsakeError::QuotaExceeded`] when the store's capacity is
    /// exhausted; [`KeepsakeError::Storage`] for any other backend failure.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing an absent key is a no-op
    fn remove(&self, key: &str);

    /// List all keys starting with `prefix`, in lexicographic order
    fn keys(&self, prefix: &str) -> Vec<String>;
}

/// In-memory key-value store, optionally capacity-bounded
///
/// Serves three roles: the default backing store for tests, the last-resort
/// memory tier of the degrade ladder, and a stand-in for session storage.
/// Capacity accounting counts key and value bytes, which is close enough to
/// how browser storage quotas behave for the ladder to be exercised.
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    capacity_bytes: Option<usize>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.read().len())
            .field("capacity_bytes", &self.capacity_bytes)
            .finish()
    }
}

impl MemoryStore {
    /// Create an unbounded in-memory store
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capacity_bytes: None,
        }
    }

    /// Create a store that rejects writes once `capacity_bytes` is exceeded
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capacity_bytes: Some(capacity_bytes),
        }
    }

    /// Total bytes currently held (keys + values)
    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(capacity) = self.capacity_bytes {
            let current: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if current + key.len() + value.len() > capacity {
                trace!(key, "memory store quota exceeded");
                return Err(KeepsakeError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn keys(&self, prefix: &str) -> Vec<String> {
        self.entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// One rung of the durability ladder
#[derive(Clone)]
pub struct StorageTier {
    /// Tier name used in warnings ("local", "session", "memory")
    pub name: String,
    /// The backing store for this tier
    pub store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for StorageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageTier").field("name", &self.name).finish()
    }
}

impl StorageTier {
    /// Create a named tier over a backing store
    pub fn new(name: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

/// Receipt describing where a tiered write ultimately landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Name of the tier that accepted the write
    pub tier_name: String,
    /// Index of that tier in the ladder (0 = most durable)
    pub tier_index: usize,
}

impl WriteReceipt {
    /// Whether the write landed below the most durable tier
    pub fn degraded(&self) -> bool {
        self.tier_index > 0
    }
}

/// An ordered list of backing stores with decreasing durability
///
/// Reads check tiers most-durable-first and return the first hit; writes
/// walk the ladder until one tier accepts. The ladder never drops data
/// silently: exhausting every tier surfaces the final quota error, and a
/// degraded write is visible in the returned [`WriteReceipt`].
pub struct TieredStore {
    tiers: Vec<StorageTier>,
}

impl std::fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredStore")
            .field("tiers", &self.tiers.iter().map(|t| t.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl TieredStore {
    /// Build a ladder from tiers ordered most-durable-first
    pub fn new(tiers: Vec<StorageTier>) -> Self {
        debug_assert!(!tiers.is_empty(), "tier ladder must not be empty");
        Self { tiers }
    }

    /// Conventional three-rung ladder: durable, session-scoped, in-process
    pub fn standard(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self::new(vec![
            StorageTier::new("local", durable),
            StorageTier::new("session", session),
            StorageTier::new("memory", Arc::new(MemoryStore::new())),
        ])
    }

    /// The most durable tier's store
    pub fn primary(&self) -> &Arc<dyn KeyValueStore> {
        &self.tiers[0].store
    }

    /// Number of tiers in the ladder
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Read `key`, checking tiers most-durable-first
    pub fn read(&self, key: &str) -> Option<String> {
        for tier in &self.tiers {
            if let Some(value) = tier.store.get(key) {
                return Some(value);
            }
        }
        None
    }

    /// Write `key`, trying each tier in order until one accepts
    ///
    /// A write that lands below the primary tier also clears the key from
    /// the tiers above it, so later reads cannot resurrect stale data.
    ///
    /// # Errors
    ///
    /// The last tier's error when every tier rejects the write.
    pub fn write_with_fallback(&self, key: &str, value: &str) -> Result<WriteReceipt> {
        let mut last_err = None;
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.store.set(key, value) {
                Ok(()) => {
                    if index > 0 {
                        for stale in &self.tiers[..index] {
                            stale.store.remove(key);
                        }
                        warn!(
                            key,
                            tier = %tier.name,
                            "write degraded to less durable storage tier"
                        );
                    } else {
                        trace!(key, tier = %tier.name, "write accepted");
                    }
                    return Ok(WriteReceipt {
                        tier_name: tier.name.clone(),
                        tier_index: index,
                    });
                }
                Err(err) if err.is_recoverable() => {
                    debug!(key, tier = %tier.name, %err, "tier rejected write, trying next");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| KeepsakeError::QuotaExceeded {
            key: key.to_string(),
        }))
    }

    /// Remove `key` from every tier
    pub fn remove(&self, key: &str) {
        for tier in &self.tiers {
            tier.store.remove(key);
        }
    }
}
