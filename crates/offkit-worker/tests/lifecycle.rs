//! End-to-end lifecycle coverage over a scripted fetcher and an in-memory
//! store backend.

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, StatusCode};
use url::Url;

use offkit_common::{init_logging, LogConfig};
use offkit_net::{Fetcher, NetError, Request, Response};
use offkit_store::{MemoryBackend, ResponseSnapshot, StoreBackend, StoreError};
use offkit_worker::{
    CacheWorker, LifecycleEvent, WorkerConfig, WorkerError, WorkerEvent, WorkerHost, WorkerState,
};

static LOG: Once = Once::new();

fn init() {
    LOG.call_once(|| init_logging(LogConfig::default()));
}

// ==================== Scripted fetcher ====================

#[derive(Debug, Clone, Copy)]
enum Route {
    Reply(u16, &'static [u8]),
    Unreachable,
}

/// Fetcher answering from a fixed path → outcome table, recording every
/// outbound URL.
#[derive(Default)]
struct ScriptedFetcher {
    routes: HashMap<String, Route>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self::default()
    }

    fn reply(mut self, path: &str, status: u16, body: &'static [u8]) -> Self {
        self.routes.insert(path.to_string(), Route::Reply(status, body));
        self
    }

    fn unreachable(mut self, path: &str) -> Self {
        self.routes.insert(path.to_string(), Route::Unreachable);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        self.calls.lock().unwrap().push(request.url.to_string());
        match self.routes.get(request.url.path()) {
            Some(Route::Reply(status, body)) => Ok(Response {
                url: request.url.clone(),
                status: StatusCode::from_u16(*status).unwrap(),
                headers: HeaderMap::new(),
                body: Bytes::copy_from_slice(body),
            }),
            Some(Route::Unreachable) | None => Err(NetError::RequestFailed(format!(
                "connection refused: {}",
                request.url
            ))),
        }
    }
}

// ==================== Helpers ====================

fn base_url() -> Url {
    Url::parse("https://app.example.com/").unwrap()
}

fn abs(path: &str) -> Url {
    base_url().join(path).unwrap()
}

fn worker(
    version: u32,
    manifest: &[&str],
    backend: &MemoryBackend,
    fetcher: &Arc<ScriptedFetcher>,
) -> CacheWorker {
    let manifest = manifest.iter().map(|s| s.to_string()).collect();
    CacheWorker::new(
        WorkerConfig::new(base_url(), version, manifest),
        Arc::new(backend.clone()),
        Arc::clone(fetcher) as Arc<dyn Fetcher>,
    )
}

// ==================== Install + intercept ====================

#[tokio::test]
async fn install_caches_successes_and_skips_failures() {
    init();
    let backend = MemoryBackend::new();
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .reply("/a.js", 200, b"var a = 1;")
            .reply("/b.js", 404, b""),
    );

    let worker = worker(1, &["/a.js", "/b.js"], &backend, &fetcher);
    worker.install().await.unwrap();
    assert_eq!(worker.state().await, WorkerState::Installed);

    // Only the successful resource is retrievable by its plain URL.
    let keys = backend.keys("prefetch-cache-v1").await.unwrap();
    assert_eq!(keys, vec![abs("/a.js").to_string()]);

    worker.activate().await.unwrap();

    // Cache hit: stored body, zero network calls.
    let calls_before = fetcher.calls().len();
    let served = worker.intercept(Request::get(abs("/a.js"))).await.unwrap();
    assert!(served.from_cache);
    assert_eq!(served.body, b"var a = 1;");
    assert_eq!(fetcher.calls().len(), calls_before);

    // Cache miss: live fetch, error status passed through unchanged.
    let served = worker.intercept(Request::get(abs("/b.js"))).await.unwrap();
    assert!(!served.from_cache);
    assert_eq!(served.status, 404);
    assert_eq!(fetcher.calls().len(), calls_before + 1);
}

#[tokio::test]
async fn install_fetches_are_cache_busted() {
    init();
    let backend = MemoryBackend::new();
    let fetcher = Arc::new(ScriptedFetcher::new().reply("/style.css", 200, b"body{}"));

    let worker = worker(1, &["/style.css"], &backend, &fetcher);
    worker.install().await.unwrap();

    // The outbound URL carries the bust marker; the stored key does not.
    let calls = fetcher.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("cache-bust="));
    let keys = backend.keys("prefetch-cache-v1").await.unwrap();
    assert_eq!(keys, vec![abs("/style.css").to_string()]);
}

#[tokio::test]
async fn reinstall_overwrites_in_place_with_fresh_bust() {
    init();
    let backend = MemoryBackend::new();
    let fetcher = Arc::new(ScriptedFetcher::new().reply("/style.css", 200, b"body{}"));

    worker(1, &["/style.css"], &backend, &fetcher)
        .install()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    worker(1, &["/style.css"], &backend, &fetcher)
        .install()
        .await
        .unwrap();

    // Same stored key both passes, no duplicates.
    let keys = backend.keys("prefetch-cache-v1").await.unwrap();
    assert_eq!(keys, vec![abs("/style.css").to_string()]);

    // Distinct outbound request URLs, differing only by bust marker.
    let calls = fetcher.calls();
    assert_eq!(calls.len(), 2);
    assert_ne!(calls[0], calls[1]);
    assert!(calls.iter().all(|c| c.starts_with(&format!("{}?cache-bust=", abs("/style.css")))));
}

#[tokio::test]
async fn bad_manifest_entry_is_skipped() {
    init();
    let backend = MemoryBackend::new();
    let fetcher = Arc::new(ScriptedFetcher::new().reply("/ok.js", 200, b"ok"));

    // The unparsable entry is logged and skipped; the install succeeds.
    let worker = worker(1, &["/ok.js", "https://"], &backend, &fetcher);
    worker.install().await.unwrap();

    let keys = backend.keys("prefetch-cache-v1").await.unwrap();
    assert_eq!(keys, vec![abs("/ok.js").to_string()]);
}

// ==================== Activation ====================

#[tokio::test]
async fn activation_deletes_out_of_date_caches() {
    init();
    let backend = MemoryBackend::new();

    // Left over from the previous version.
    backend
        .put(
            "prefetch-cache-v1",
            abs("/old.js").as_str(),
            ResponseSnapshot::new(abs("/old.js").as_str(), 200, b"old".to_vec(), 0),
        )
        .await
        .unwrap();

    let fetcher = Arc::new(ScriptedFetcher::new().reply("/a.js", 200, b"a"));
    let worker = worker(2, &["/a.js"], &backend, &fetcher);
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    let names = backend.store_names().await.unwrap();
    assert_eq!(names, vec!["prefetch-cache-v2".to_string()]);
    assert_eq!(worker.state().await, WorkerState::Active);
}

// ==================== Interception failures ====================

#[tokio::test]
async fn transport_failure_propagates_to_caller() {
    init();
    let backend = MemoryBackend::new();
    let fetcher = Arc::new(ScriptedFetcher::new().unreachable("/offline.js"));

    let worker = worker(1, &[], &backend, &fetcher);
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    let result = worker.intercept(Request::get(abs("/offline.js"))).await;
    assert!(matches!(result, Err(WorkerError::Network(_))));
}

// ==================== Install failures ====================

/// Backend whose stores cannot be opened at all.
struct UnavailableBackend;

#[async_trait]
impl StoreBackend for UnavailableBackend {
    async fn open(&self, _name: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn put(
        &self,
        _name: &str,
        _url: &str,
        _snapshot: ResponseSnapshot,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }

    async fn lookup(
        &self,
        _name: &str,
        _url: &str,
    ) -> Result<Option<ResponseSnapshot>, StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }

    async fn store_names(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }

    async fn keys(&self, _name: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }

    async fn delete(&self, _name: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }
}

#[tokio::test]
async fn unavailable_store_fails_the_install() {
    init();
    let fetcher = Arc::new(ScriptedFetcher::new().reply("/a.js", 200, b"a"));
    let worker = CacheWorker::new(
        WorkerConfig::new(base_url(), 1, vec!["/a.js".to_string()]),
        Arc::new(UnavailableBackend),
        fetcher.clone() as Arc<dyn Fetcher>,
    );

    let result = worker.install().await;
    assert!(matches!(result, Err(WorkerError::Store(_))));
    // The worker never became installed and fetched nothing.
    assert_eq!(worker.state().await, WorkerState::Uninstalled);
    assert!(fetcher.calls().is_empty());
}

// ==================== Lifecycle ordering ====================

#[tokio::test]
async fn lifecycle_order_is_enforced() {
    init();
    let backend = MemoryBackend::new();
    let fetcher = Arc::new(ScriptedFetcher::new());
    let worker = worker(1, &[], &backend, &fetcher);

    assert!(matches!(
        worker.activate().await,
        Err(WorkerError::State(_))
    ));
    assert!(matches!(
        worker.intercept(Request::get(abs("/a.js"))).await,
        Err(WorkerError::State(_))
    ));

    worker.install().await.unwrap();
    assert!(matches!(worker.install().await, Err(WorkerError::State(_))));

    worker.activate().await.unwrap();
    assert!(matches!(
        worker.activate().await,
        Err(WorkerError::State(_))
    ));
}

// ==================== Host adapter ====================

#[tokio::test]
async fn host_dispatch_drives_the_lifecycle() {
    init();
    let backend = MemoryBackend::new();
    let fetcher = Arc::new(ScriptedFetcher::new().reply("/a.js", 200, b"var a = 1;"));
    let worker = Arc::new(worker(1, &["/a.js"], &backend, &fetcher));
    let (host, mut events) = WorkerHost::new(worker);

    assert!(host.dispatch(LifecycleEvent::Install).await.unwrap().is_none());
    assert_eq!(
        events.try_recv().unwrap(),
        WorkerEvent::StateChange(WorkerState::Installed)
    );

    assert!(host.dispatch(LifecycleEvent::Activate).await.unwrap().is_none());
    assert_eq!(
        events.try_recv().unwrap(),
        WorkerEvent::StateChange(WorkerState::Active)
    );

    let served = host
        .dispatch(LifecycleEvent::Fetch(Request::get(abs("/a.js"))))
        .await
        .unwrap()
        .unwrap();
    assert!(served.from_cache);
    assert_eq!(served.body, b"var a = 1;");
}

#[tokio::test]
async fn host_rejects_out_of_order_triggers() {
    init();
    let backend = MemoryBackend::new();
    let fetcher = Arc::new(ScriptedFetcher::new());
    let worker = Arc::new(worker(1, &[], &backend, &fetcher));
    let (host, mut events) = WorkerHost::new(worker);

    let result = host.dispatch(LifecycleEvent::Activate).await;
    assert!(matches!(result, Err(WorkerError::State(_))));
    assert!(events.try_recv().is_err());
}
