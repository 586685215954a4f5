//! Builds every configured plugin and tears them down in order.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::collect::{CollectAction, CollectRegistry};
use crate::config::Settings;
use crate::hosts::Hosts;
use crate::intel::{IntelGate, StaticVerdicts, VerdictLookup};
use crate::log_event;
use crate::provider::{DomainSet, IpSet, Provider, ProviderRegistry};

/// Owns the provider and collect registries plus every plugin built from [`Settings`].
pub struct PluginHost {
    registry: Arc<ProviderRegistry>,
    collect: Arc<CollectRegistry>,
    domain_sets: BTreeMap<String, Arc<DomainSet>>,
    ip_sets: BTreeMap<String, Arc<IpSet>>,
    hosts: BTreeMap<String, Arc<Hosts>>,
    collect_actions: BTreeMap<String, Arc<CollectAction>>,
    intel: BTreeMap<String, Arc<IntelGate>>,
}

impl PluginHost {
    /// Build with no remote verdict source; intel gates only apply their
    /// whitelists and cache.
    pub fn build(settings: &Settings) -> crate::Result<Self> {
        Self::build_with_lookup(settings, Arc::new(StaticVerdicts::default()))
    }

    /// Build every plugin in configuration order.
    ///
    /// A provider is registered as soon as it is built, so later plugins may
    /// reference it. On the first error everything built so far is closed.
    pub fn build_with_lookup(
        settings: &Settings,
        lookup: Arc<dyn VerdictLookup>,
    ) -> crate::Result<Self> {
        let mut host = Self {
            registry: Arc::new(ProviderRegistry::new()),
            collect: CollectRegistry::new(settings.collect.clone()),
            domain_sets: BTreeMap::new(),
            ip_sets: BTreeMap::new(),
            hosts: BTreeMap::new(),
            collect_actions: BTreeMap::new(),
            intel: BTreeMap::new(),
        };

        if let Err(e) = host.build_all(settings, lookup) {
            host.close();
            return Err(e);
        }

        log_event!(
            "host",
            "ready",
            "{} plugins: {}",
            host.registry.len(),
            host.registry.tags().join(", ")
        );
        Ok(host)
    }

    fn build_all(&mut self, settings: &Settings, lookup: Arc<dyn VerdictLookup>) -> crate::Result<()> {
        for args in &settings.domain_sets {
            let set = Arc::new(DomainSet::new(args, &settings.reload, &self.registry)?);
            self.register(set.clone())?;
            self.domain_sets.insert(args.tag.clone(), set);
        }

        for args in &settings.ip_sets {
            let set = Arc::new(IpSet::new(args, &settings.reload, &self.registry)?);
            self.register(set.clone())?;
            self.ip_sets.insert(args.tag.clone(), set);
        }

        for args in &settings.hosts {
            let hosts = Arc::new(Hosts::new(args, &settings.reload)?);
            self.register(hosts.clone())?;
            self.hosts.insert(args.tag.clone(), hosts);
        }

        for args in &settings.collect_actions {
            let action = Arc::new(CollectAction::new(args, &self.collect)?);
            self.register(action.clone())?;
            self.collect_actions.insert(args.tag.clone(), action);
        }

        for args in &settings.intel {
            let gate = Arc::new(IntelGate::new(args, &settings.reload, Arc::clone(&lookup))?);
            self.register(gate.clone())?;
            self.intel.insert(args.tag.clone(), gate);
        }

        Ok(())
    }

    /// Register a built provider; on a duplicate tag the provider is closed first.
    fn register(&self, provider: Arc<dyn Provider>) -> crate::Result<()> {
        if let Err(e) = self.registry.register(Arc::clone(&provider)) {
            provider.close();
            return Err(e.into());
        }
        Ok(())
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn collect_registry(&self) -> &Arc<CollectRegistry> {
        &self.collect
    }

    pub fn domain_set(&self, tag: &str) -> Option<&Arc<DomainSet>> {
        self.domain_sets.get(tag)
    }

    pub fn ip_set(&self, tag: &str) -> Option<&Arc<IpSet>> {
        self.ip_sets.get(tag)
    }

    pub fn hosts(&self, tag: &str) -> Option<&Arc<Hosts>> {
        self.hosts.get(tag)
    }

    pub fn collect_action(&self, tag: &str) -> Option<&Arc<CollectAction>> {
        self.collect_actions.get(tag)
    }

    pub fn intel(&self, tag: &str) -> Option<&Arc<IntelGate>> {
        self.intel.get(tag)
    }

    /// Close watchers first, then release collect stores, then clear the registry.
    ///
    /// Safe to call more than once.
    pub fn close(&self) {
        for set in self.domain_sets.values() {
            Provider::close(set.as_ref());
        }
        for set in self.ip_sets.values() {
            Provider::close(set.as_ref());
        }
        for hosts in self.hosts.values() {
            hosts.close();
        }
        for gate in self.intel.values() {
            gate.close();
        }
        for action in self.collect_actions.values() {
            action.close();
        }
        self.registry.close_all();
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("plugins", &self.registry.tags())
            .field("collect_stores", &self.collect.len())
            .finish()
    }
}
