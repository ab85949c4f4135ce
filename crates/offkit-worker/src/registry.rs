//! Role-to-name cache registry.

use hashbrown::{HashMap, HashSet};

/// The cache role populated from the manifest at install time.
pub const PREFETCH_ROLE: &str = "prefetch";

/// Maps logical cache roles to concrete versioned store names.
///
/// Exactly one concrete name is current per role at any time. Bumping the
/// version and re-running the lifecycle is the only way to invalidate a
/// role's cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRegistry {
    version: u32,
    prefetch: String,
    extra: HashMap<String, String>,
}

impl CacheRegistry {
    /// Registry holding only the `prefetch` role.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            prefetch: versioned_name(PREFETCH_ROLE, version),
            extra: HashMap::new(),
        }
    }

    /// Registry with additional roles beyond `prefetch`, all at the same
    /// version.
    pub fn with_extra_roles(version: u32, roles: &[&str]) -> Self {
        let extra = roles
            .iter()
            .filter(|role| **role != PREFETCH_ROLE)
            .map(|role| (role.to_string(), versioned_name(role, version)))
            .collect();
        Self {
            version,
            prefetch: versioned_name(PREFETCH_ROLE, version),
            extra,
        }
    }

    /// The registry's version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Current store name for the prefetch role.
    pub fn prefetch(&self) -> &str {
        &self.prefetch
    }

    /// Current store name for a role, if registered.
    pub fn current(&self, role: &str) -> Option<&str> {
        if role == PREFETCH_ROLE {
            Some(&self.prefetch)
        } else {
            self.extra.get(role).map(String::as_str)
        }
    }

    /// Every role's current store name. Stores outside this set belong to
    /// older versions and are deleted at activation.
    pub fn expected_names(&self) -> HashSet<String> {
        let mut names: HashSet<String> = self.extra.values().cloned().collect();
        names.insert(self.prefetch.clone());
        names
    }
}

fn versioned_name(role: &str, version: u32) -> String {
    format!("{}-cache-v{}", role, version)
}
