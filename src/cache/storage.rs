//! Storage backends.
//!
//! [`Storage`] is the narrow key/value contract the cache depends on. Any
//! implementation is interchangeable: each call is a single atomic operation
//! on one key (or on the whole store for [`Storage::flush`]), and concurrent
//! writers to the same key simply overwrite each other.
//!
//! Backends may expire entries on their own schedule. That expiry is only a
//! coarse upper bound; HTTP freshness is always re-checked on lookup.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::entry::CacheEntry;
use super::key::CacheKey;

/// Backend failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key holds no entry. A cache miss, not a fault.
    #[error("key is missing")]
    NotFound,

    #[error("internal error in storage: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Key/value storage for cache entries.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores `entry` under `key`, replacing any previous entry.
    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), StorageError>;

    /// Returns the entry under `key`, or [`StorageError::NotFound`].
    async fn get(&self, key: &CacheKey) -> Result<CacheEntry, StorageError>;

    /// Removes the entry under `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &CacheKey) -> Result<(), StorageError>;

    /// Removes every entry.
    async fn flush(&self) -> Result<(), StorageError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

struct Slot {
    entry: CacheEntry,
    stored_at: Instant,
}

/// In-process storage with an optional backend-level TTL and an optional
/// entry cap.
///
/// Expired entries are dropped when read and swept on every write. With a
/// cap, writing a new key into a full store evicts the oldest entry.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use httpcache::cache::MemoryStorage;
///
/// let storage = MemoryStorage::new(Duration::from_secs(300));
/// let forever = MemoryStorage::new(Duration::ZERO);
/// let bounded = MemoryStorage::new(Duration::ZERO).with_max_entries(10_000);
/// ```
pub struct MemoryStorage {
    slots: RwLock<HashMap<CacheKey, Slot>>,
    ttl: Duration,
    max_entries: Option<usize>,
}

impl MemoryStorage {
    /// Creates an empty store. Entries older than `ttl` are dropped on read;
    /// `Duration::ZERO` keeps entries until deleted.
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl,
            max_entries: None,
        }
    }

    /// Caps the number of entries held. A cap of zero is treated as one.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self
    }

    /// Number of entries currently held, including ones past their TTL that
    /// have not been swept yet.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    fn is_expired(&self, slot: &Slot) -> bool {
        !self.ttl.is_zero() && slot.stored_at.elapsed() >= self.ttl
    }

    /// Drops expired slots, then makes room for `incoming` if the store is full.
    fn evict_if_needed(&self, slots: &mut HashMap<CacheKey, Slot>, incoming: &CacheKey) {
        if !self.ttl.is_zero() {
            slots.retain(|_, slot| !self.is_expired(slot));
        }

        let Some(max_entries) = self.max_entries else {
            return;
        };
        if slots.contains_key(incoming) {
            return;
        }
        while slots.len() >= max_entries {
            let oldest = slots
                .iter()
                .min_by_key(|(_, slot)| slot.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    slots.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(Duration::from_secs(super::config::DEFAULT_TTL_SECS))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), StorageError> {
        let slot = Slot {
            entry,
            stored_at: Instant::now(),
        };
        let mut slots = self.slots.write().await;
        self.evict_if_needed(&mut slots, key);
        slots.insert(key.clone(), slot);
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<CacheEntry, StorageError> {
        {
            let slots = self.slots.read().await;
            match slots.get(key) {
                None => return Err(StorageError::NotFound),
                Some(slot) if !self.is_expired(slot) => return Ok(slot.entry.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a writer may have replaced the slot.
        let mut slots = self.slots.write().await;
        if slots.get(key).is_some_and(|slot| self.is_expired(slot)) {
            slots.remove(key);
            return Err(StorageError::NotFound);
        }
        slots
            .get(key)
            .map(|slot| slot.entry.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StorageError> {
        self.slots.write().await.remove(key);
        Ok(())
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.slots.write().await.clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Storage that never holds anything. Every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStorage;

#[async_trait]
impl Storage for NullStorage {
    async fn set(&self, _: &CacheKey, _: CacheEntry) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get(&self, _: &CacheKey) -> Result<CacheEntry, StorageError> {
        Err(StorageError::NotFound)
    }

    async fn delete(&self, _: &CacheKey) -> Result<(), StorageError> {
        Ok(())
    }

    async fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
