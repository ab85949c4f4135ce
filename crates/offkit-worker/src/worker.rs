//! The cache lifecycle state machine.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use hashbrown::HashMap;
use http::HeaderMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use offkit_net::{cache_busted, FetchMode, Fetcher, NetError, Request, Response};
use offkit_store::{ResponseSnapshot, StoreBackend, StoreError};

use crate::config::WorkerConfig;
use crate::registry::CacheRegistry;

// ==================== Errors ====================

/// Errors surfaced by worker lifecycle operations.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("State error: {0}")]
    State(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Bad manifest entry `{entry}`: {source}")]
    Manifest {
        entry: String,
        source: url::ParseError,
    },
}

// ==================== State ====================

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Fresh worker; its cache version has not been populated.
    Uninstalled,
    /// Manifest prefetch finished; stale versions not yet retired.
    Installed,
    /// Controlling requests.
    Active,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Uninstalled => write!(f, "uninstalled"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Active => write!(f, "active"),
        }
    }
}

// ==================== Served Response ====================

/// Response handed back to the requesting client.
#[derive(Debug, Clone)]
pub struct ServedResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Whether the response came from a cache store (no network involved).
    pub from_cache: bool,
}

impl ServedResponse {
    /// Serve a stored snapshot, unmodified.
    pub fn from_snapshot(snapshot: ResponseSnapshot) -> Self {
        Self {
            status: snapshot.status,
            headers: snapshot.headers,
            body: snapshot.body,
            from_cache: true,
        }
    }

    /// Serve a live network response.
    pub fn from_network(response: Response) -> Self {
        Self {
            status: response.status.as_u16(),
            headers: header_pairs(&response.headers),
            body: response.body.to_vec(),
            from_cache: false,
        }
    }

    /// Whether the status is 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ==================== Worker ====================

/// The versioned-cache worker.
///
/// One value per worker version: it prefetches the manifest into the
/// current `prefetch` cache at install time, deletes caches from other
/// versions at activation, and then answers requests cache-first. Stores
/// live in the shared [`StoreBackend`] and outlive any one worker, so a new
/// version sees — and eventually retires — its predecessor's caches.
pub struct CacheWorker {
    config: WorkerConfig,
    registry: CacheRegistry,
    backend: Arc<dyn StoreBackend>,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<WorkerState>,
}

impl CacheWorker {
    /// Create an uninstalled worker over a shared store backend and fetcher.
    pub fn new(
        config: WorkerConfig,
        backend: Arc<dyn StoreBackend>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let registry = config.registry();
        Self {
            config,
            registry,
            backend,
            fetcher,
            state: RwLock::new(WorkerState::Uninstalled),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// The worker's configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The worker's cache registry.
    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Populate the current prefetch cache from the manifest.
    ///
    /// All manifest resources are fetched concurrently, each with the same
    /// cache-bust timestamp so one install pass is internally consistent. A
    /// resource that fails to fetch is skipped with a warning and the
    /// install still succeeds; a store that cannot be opened fails the
    /// whole install and the worker stays uninstalled.
    pub async fn install(&self) -> Result<(), WorkerError> {
        self.expect_state(WorkerState::Uninstalled, "install").await?;

        let cache_name = self.registry.prefetch();
        let bust_ms = epoch_millis();
        info!(
            cache = %cache_name,
            resources = self.config.manifest.len(),
            "Handling install event"
        );

        self.backend.open(cache_name).await?;

        let prefetches = self
            .config
            .manifest
            .iter()
            .map(|entry| self.prefetch_resource(cache_name, entry, bust_ms));
        join_all(prefetches).await;

        *self.state.write().await = WorkerState::Installed;
        info!(cache = %cache_name, "Pre-fetching complete");
        Ok(())
    }

    /// Delete every store whose name is not current in the registry.
    ///
    /// Deletions run concurrently and stand alone: one failing is logged
    /// and leaves the others, and the activation itself, unaffected.
    pub async fn activate(&self) -> Result<(), WorkerError> {
        self.expect_state(WorkerState::Installed, "activate").await?;

        let expected = self.registry.expected_names();
        let stale: Vec<String> = self
            .backend
            .store_names()
            .await?
            .into_iter()
            .filter(|name| !expected.contains(name))
            .collect();

        let deletions = stale.iter().map(|name| async move {
            info!(cache = %name, "Deleting out of date cache");
            if let Err(e) = self.backend.delete(name).await {
                warn!(cache = %name, error = %e, "Cache deletion failed");
            }
        });
        join_all(deletions).await;

        *self.state.write().await = WorkerState::Active;
        info!(version = self.registry.version(), "Worker activated");
        Ok(())
    }

    /// Answer a request cache-first.
    ///
    /// The lookup spans every store, not just this worker's own. On a miss
    /// the request goes to the network with its own mode and headers; HTTP
    /// error statuses come back as ordinary responses. Only a
    /// transport-level failure is an error, and it is re-raised so the
    /// caller observes the failed load.
    pub async fn intercept(&self, request: Request) -> Result<ServedResponse, WorkerError> {
        self.expect_state(WorkerState::Active, "intercept").await?;

        debug!(url = %request.url, "Handling fetch event");

        if let Some(snapshot) = self.backend.lookup_any(request.url.as_str()).await? {
            debug!(url = %request.url, "Found response in cache");
            return Ok(ServedResponse::from_snapshot(snapshot));
        }

        debug!(url = %request.url, "No response found in cache, fetching from network");
        match self.fetcher.fetch(request).await {
            Ok(response) => Ok(ServedResponse::from_network(response)),
            Err(e) => {
                error!(error = %e, "Fetching failed");
                Err(e.into())
            }
        }
    }

    async fn expect_state(
        &self,
        expected: WorkerState,
        operation: &str,
    ) -> Result<(), WorkerError> {
        let state = *self.state.read().await;
        if state != expected {
            return Err(WorkerError::State(format!(
                "cannot {} while {}",
                operation, state
            )));
        }
        Ok(())
    }

    async fn prefetch_resource(&self, cache_name: &str, entry: &str, bust_ms: u64) {
        if let Err(e) = self.try_prefetch(cache_name, entry, bust_ms).await {
            // One failed resource never aborts the install; it is simply
            // absent from the cache and served from the network later.
            warn!(resource = %entry, error = %e, "Not caching resource");
        }
    }

    async fn try_prefetch(
        &self,
        cache_name: &str,
        entry: &str,
        bust_ms: u64,
    ) -> Result<(), WorkerError> {
        let url = self
            .config
            .resolve(entry)
            .map_err(|source| WorkerError::Manifest {
                entry: entry.to_string(),
                source,
            })?;

        let request = Request::get(cache_busted(&url, bust_ms)).mode(FetchMode::NoCors);
        let response = self.fetcher.fetch(request).await?;
        if response.is_error_status() {
            return Err(WorkerError::Network(NetError::RequestFailed(format!(
                "request for {} failed with status {}",
                url, response.status
            ))));
        }

        // The original URL, not the cache-busted one, is the storage key so
        // later lookups by plain request URL succeed.
        let snapshot = snapshot_from_response(&url, response, bust_ms);
        self.backend.put(cache_name, url.as_str(), snapshot).await?;
        debug!(url = %url, cache = %cache_name, "Cached resource");
        Ok(())
    }
}

// ==================== Helpers ====================

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn snapshot_from_response(url: &Url, response: Response, stored_at: u64) -> ResponseSnapshot {
    ResponseSnapshot {
        url: url.to_string(),
        status: response.status.as_u16(),
        headers: header_pairs(&response.headers),
        body: response.body.to_vec(),
        stored_at,
    }
}

fn header_pairs(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
