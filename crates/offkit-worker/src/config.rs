//! Worker configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::registry::CacheRegistry;

/// Immutable configuration handed to a worker at construction.
///
/// Tests substitute manifests and versions here instead of patching module
/// globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Cache version. Operators bump this to force a full cache
    /// invalidation on the next install/activate cycle.
    pub cache_version: u32,

    /// The worker's own location; relative manifest entries resolve against
    /// it.
    pub base_url: Url,

    /// Resources to prefetch at install time, absolute or relative to
    /// `base_url`. Declarative input, supplied externally.
    pub manifest: Vec<String>,
}

impl WorkerConfig {
    /// Create a configuration.
    pub fn new(base_url: Url, cache_version: u32, manifest: Vec<String>) -> Self {
        Self {
            cache_version,
            base_url,
            manifest,
        }
    }

    /// Build the registry for this configuration's version.
    pub fn registry(&self) -> CacheRegistry {
        CacheRegistry::new(self.cache_version)
    }

    /// Resolve a manifest entry against the worker location. Absolute
    /// entries pass through unchanged.
    pub fn resolve(&self, entry: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(entry)
    }
}
