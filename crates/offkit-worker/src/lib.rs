//! # OffKit Worker
//!
//! The cache lifecycle state machine for OffKit: populate a versioned cache
//! from a resource manifest at install time, retire stale cache versions at
//! activation, and answer every later request cache-first.
//!
//! ## Architecture
//!
//! ```text
//! WorkerHost (install / activate / fetch triggers)
//!     │
//!     └── CacheWorker (Uninstalled → Installed → Active)
//!             ├── CacheRegistry (role → versioned store name)
//!             ├── StoreBackend (offkit-store)
//!             └── Fetcher (offkit-net)
//! ```

pub mod config;
pub mod host;
pub mod registry;
pub mod worker;

pub use config::WorkerConfig;
pub use host::{LifecycleEvent, WorkerEvent, WorkerHost};
pub use registry::{CacheRegistry, PREFETCH_ROLE};
pub use worker::{CacheWorker, ServedResponse, WorkerError, WorkerState};
