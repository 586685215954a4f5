//! Named providers and the registry that resolves them.
//!
//! Plugins refer to each other by tag. A provider is registered only after
//! it has been fully constructed, so resolving a tag never yields a
//! half-built provider.

pub mod domain_set;
pub mod ip_set;
mod rule_set;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

pub use domain_set::DomainSet;
pub use ip_set::IpSet;
pub use rule_set::RuleSetProvider;

use crate::matcher::SharedMatcher;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider '{tag}' not found or not ready")]
    NotFound { tag: String },

    #[error("Provider '{tag}' does not provide a {capability}")]
    Capability {
        tag: String,
        capability: &'static str,
    },

    #[error("Provider '{tag}' is already registered")]
    Duplicate { tag: String },

    #[error("Provider registry has been shut down")]
    RegistryClosed,
}

/// A named plugin instance that may expose matcher capabilities.
pub trait Provider: Send + Sync {
    fn tag(&self) -> &str;

    /// Live domain matcher, if this provider has one.
    fn domain_matcher(&self) -> Option<SharedMatcher<str>> {
        None
    }

    /// Live address matcher, if this provider has one.
    fn ip_matcher(&self) -> Option<SharedMatcher<IpAddr>> {
        None
    }

    /// Release watchers and background work. Must be idempotent.
    fn close(&self) {}
}

/// Tag to provider lookup.
///
/// Lookups clone the provider handle and release the lock before returning,
/// so a provider may be resolved from inside another provider's reload.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fully constructed provider under its tag.
    pub fn register(&self, provider: Arc<dyn Provider>) -> Result<(), ProviderError> {
        let tag = provider.tag().to_string();
        let mut providers = self.providers.write();
        if providers.contains_key(&tag) {
            return Err(ProviderError::Duplicate { tag });
        }
        crate::debug_event!("registry", "registered", "{tag}");
        providers.insert(tag, provider);
        Ok(())
    }

    pub fn resolve(&self, tag: &str) -> Option<Arc<dyn Provider>> {
        self.providers.read().get(tag).cloned()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.providers.read().contains_key(tag)
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    /// Unregister a provider. The caller decides whether to close it.
    pub fn remove(&self, tag: &str) -> Option<Arc<dyn Provider>> {
        self.providers.write().remove(tag)
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Close and unregister every provider.
    pub fn close_all(&self) {
        let drained: Vec<_> = std::mem::take(&mut *self.providers.write())
            .into_values()
            .collect();
        for provider in drained {
            provider.close();
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
