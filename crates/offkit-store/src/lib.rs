//! # OffKit Store
//!
//! Named response-snapshot stores for the OffKit cache engine.
//!
//! ## Features
//!
//! - **Snapshots**: Stored responses (status, headers, body) that read back
//!   byte-identical to what was written
//! - **Named stores**: One store per versioned cache name
//! - **Backends**: Pluggable persistence behind the [`StoreBackend`] trait
//!
//! ## Architecture
//!
//! ```text
//! StoreBackend (trait)
//!     │
//!     └── MemoryBackend
//!             └── CacheStore ("prefetch-cache-v1", ...)
//!                     └── url → ResponseSnapshot
//! ```

use async_trait::async_trait;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};

// ==================== Errors ====================

/// Errors raised by cache store operations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

// ==================== Snapshot ====================

/// A stored response snapshot.
///
/// Once written under a key, lookups return it unchanged regardless of later
/// network state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    /// The request URL this snapshot is keyed on.
    pub url: String,

    /// HTTP status code.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// When the snapshot was written (ms since epoch).
    pub stored_at: u64,
}

impl ResponseSnapshot {
    /// Create a snapshot with the given key and body, no headers.
    pub fn new(url: impl Into<String>, status: u16, body: Vec<u8>, stored_at: u64) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HashMap::new(),
            body,
            stored_at,
        }
    }
}

// ==================== Cache Store ====================

/// A single named store mapping request URLs to response snapshots.
#[derive(Debug, Default, Clone)]
pub struct CacheStore {
    /// Store name, e.g. `prefetch-cache-v1`.
    pub name: String,

    entries: HashMap<String, ResponseSnapshot>,
}

impl CacheStore {
    /// Create a new empty store.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Store a snapshot under a URL, replacing any previous entry.
    pub fn put(&mut self, url: &str, snapshot: ResponseSnapshot) {
        trace!(store = %self.name, %url, "Storing snapshot");
        self.entries.insert(url.to_string(), snapshot);
    }

    /// Look up a snapshot by exact URL.
    pub fn lookup(&self, url: &str) -> Option<&ResponseSnapshot> {
        self.entries.get(url)
    }

    /// Remove an entry. Returns whether it existed.
    pub fn remove(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    /// All stored URLs.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Backend ====================

/// Persistence seam for named stores.
///
/// Writes are atomic at the key level; callers do no locking of their own.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Open a store by name, creating it if absent.
    async fn open(&self, name: &str) -> Result<(), StoreError>;

    /// Write a snapshot into a named store. The store is created on first
    /// write if it does not exist yet.
    async fn put(&self, name: &str, url: &str, snapshot: ResponseSnapshot)
        -> Result<(), StoreError>;

    /// Look up a snapshot in one named store.
    async fn lookup(&self, name: &str, url: &str) -> Result<Option<ResponseSnapshot>, StoreError>;

    /// Names of all stores that currently exist.
    async fn store_names(&self) -> Result<Vec<String>, StoreError>;

    /// URLs stored under one name. Empty if the store does not exist.
    async fn keys(&self, name: &str) -> Result<Vec<String>, StoreError>;

    /// Delete an entire store. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;

    /// Look a URL up across every store, in no particular order; first hit
    /// wins.
    async fn lookup_any(&self, url: &str) -> Result<Option<ResponseSnapshot>, StoreError> {
        for name in self.store_names().await? {
            if let Some(snapshot) = self.lookup(&name, url).await? {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }
}

// ==================== Memory Backend ====================

/// In-memory [`StoreBackend`] keeping all stores in one locked map.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    stores: Arc<RwLock<HashMap<String, CacheStore>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        let mut stores = self.stores.write().await;
        if !stores.contains_key(name) {
            debug!(store = %name, "Creating store");
            stores.insert(name.to_string(), CacheStore::new(name));
        }
        Ok(())
    }

    async fn put(&self, name: &str, url: &str, snapshot: ResponseSnapshot)
        -> Result<(), StoreError> {
        let mut stores = self.stores.write().await;
        stores
            .entry(name.to_string())
            .or_insert_with(|| CacheStore::new(name))
            .put(url, snapshot);
        Ok(())
    }

    async fn lookup(&self, name: &str, url: &str) -> Result<Option<ResponseSnapshot>, StoreError> {
        let stores = self.stores.read().await;
        Ok(stores.get(name).and_then(|store| store.lookup(url)).cloned())
    }

    async fn store_names(&self) -> Result<Vec<String>, StoreError> {
        let stores = self.stores.read().await;
        Ok(stores.keys().cloned().collect())
    }

    async fn keys(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let stores = self.stores.read().await;
        Ok(stores
            .get(name)
            .map(|store| store.keys().into_iter().map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let mut stores = self.stores.write().await;
        let existed = stores.remove(name).is_some();
        if existed {
            debug!(store = %name, "Deleted store");
        }
        Ok(existed)
    }
}
