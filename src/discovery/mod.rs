//! # Discovery
//! Pluggable source adapters and the runtime registry that maps source name
//! to implementation. New sources register without touching the orchestrator.

pub mod base;
pub mod change_cache;
pub mod feed;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::error::{DiscoveryResult, InitError};
use crate::types::{CandidateOpportunity, DiscoveryContext, SourceType};

pub use base::{backoff_delay, extract_each, DiscovererBase};
pub use change_cache::ChangeCache;
pub use feed::FeedDiscoverer;

/// A source adapter.
///
/// `discover` must be safe to re-run and must not fail on a single bad
/// item: skip it, log it, keep going. `check_health` reports `false`
/// instead of failing.
#[async_trait]
pub trait Discoverer: Send + Sync {
    fn name(&self) -> &str;

    fn source_type(&self) -> SourceType;

    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Rate limit, timeout and retry settings used when config has no entry.
    fn default_config(&self) -> SourceConfig {
        SourceConfig::default()
    }

    async fn initialize(&self) -> Result<(), InitError> {
        Ok(())
    }

    async fn check_health(&self) -> bool {
        true
    }

    async fn discover(
        &self,
        context: Option<&DiscoveryContext>,
    ) -> DiscoveryResult<Vec<CandidateOpportunity>>;
}

#[derive(Clone)]
struct Entry {
    discoverer: Arc<dyn Discoverer>,
    /// `initialize` succeeded.
    ready: bool,
    config: SourceConfig,
}

/// Snapshot of one registered discoverer.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscovererInfo {
    pub name: String,
    pub source_type: SourceType,
    pub version: String,
    pub ready: bool,
    pub enabled: bool,
}

#[derive(Default)]
pub struct DiscovererRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    overrides: HashMap<String, SourceConfig>,
}

impl DiscovererRegistry {
    /// `overrides` are the configured per-source settings; they win over a
    /// discoverer's own defaults.
    pub fn new(overrides: HashMap<String, SourceConfig>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            overrides,
        }
    }

    /// Register and initialize. Duplicate names are rejected outright; a
    /// failed `initialize` keeps the entry but excludes it from runs.
    pub async fn register(&self, discoverer: Arc<dyn Discoverer>) -> Result<(), InitError> {
        let name = discoverer.name().to_string();
        if self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&name)
        {
            return Err(InitError::DuplicateName(name));
        }

        let init = discoverer.initialize().await;
        let config = self
            .overrides
            .get(&name)
            .cloned()
            .unwrap_or_else(|| discoverer.default_config());

        {
            let mut w = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if w.contains_key(&name) {
                return Err(InitError::DuplicateName(name));
            }
            w.insert(
                name.clone(),
                Entry {
                    discoverer: discoverer.clone(),
                    ready: init.is_ok(),
                    config,
                },
            );
        }

        match init {
            Ok(()) => {
                info!(
                    target: "discovery",
                    source = %name,
                    source_type = discoverer.source_type().as_str(),
                    version = discoverer.version(),
                    "discoverer registered"
                );
                Ok(())
            }
            Err(e) => {
                warn!(target: "discovery", source = %name, error = %e, "initialize failed; discoverer excluded");
                Err(e)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Discoverer>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|e| e.discoverer.clone())
    }

    /// Registered, initialized and enabled.
    pub fn is_available(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|e| e.ready && e.config.enabled)
    }

    pub fn config_for(&self, name: &str) -> Option<SourceConfig> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|e| e.config.clone())
    }

    /// Names of available discoverers, sorted.
    pub fn available(&self) -> Vec<String> {
        let r = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut v: Vec<String> = r
            .iter()
            .filter(|(_, e)| e.ready && e.config.enabled)
            .map(|(k, _)| k.clone())
            .collect();
        v.sort();
        v
    }

    pub fn list(&self) -> Vec<DiscovererInfo> {
        let r = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut v: Vec<DiscovererInfo> = r
            .iter()
            .map(|(name, e)| DiscovererInfo {
                name: name.clone(),
                source_type: e.discoverer.source_type(),
                version: e.discoverer.version().to_string(),
                ready: e.ready,
                enabled: e.config.enabled,
            })
            .collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: &'static str,
        init_ok: bool,
    }

    #[async_trait]
    impl Discoverer for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn source_type(&self) -> SourceType {
            SourceType::Manual
        }
        async fn initialize(&self) -> Result<(), InitError> {
            if self.init_ok {
                Ok(())
            } else {
                Err(InitError::MissingCredential("API_KEY".into()))
            }
        }
        async fn discover(
            &self,
            _context: Option<&DiscoveryContext>,
        ) -> DiscoveryResult<Vec<CandidateOpportunity>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn duplicates_rejected_and_failed_init_excluded() {
        let reg = DiscovererRegistry::default();
        reg.register(Arc::new(Stub { name: "a", init_ok: true })).await.unwrap();
        let dup = reg.register(Arc::new(Stub { name: "a", init_ok: true })).await;
        assert!(matches!(dup, Err(InitError::DuplicateName(_))));

        let bad = reg.register(Arc::new(Stub { name: "b", init_ok: false })).await;
        assert!(matches!(bad, Err(InitError::MissingCredential(_))));

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.available(), vec!["a".to_string()]);
        assert!(!reg.is_available("b"));
    }

    #[tokio::test]
    async fn config_override_can_disable() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "a".to_string(),
            SourceConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let reg = DiscovererRegistry::new(overrides);
        reg.register(Arc::new(Stub { name: "a", init_ok: true })).await.unwrap();
        assert!(!reg.is_available("a"));
        assert!(reg.get("a").is_some());
    }
}
