//! Hot-reloadable shared state for a DNS plugin pipeline.
//!
//! Named rule sets are published as atomically swapped matcher snapshots
//! and reloaded when their files change. Composite sets reference other
//! providers by live handle, so a reload anywhere is visible everywhere.
//! Collect stores turn query traffic into durable, deduplicated entry files
//! that the rule sets can in turn watch.

pub mod cli;
pub mod collect;
pub mod config;
pub mod error;
pub mod host;
pub mod hosts;
pub mod intel;
pub mod logging;
pub mod matcher;
pub mod provider;
pub mod rules;
pub mod watcher;

pub use collect::{CollectAction, CollectError, CollectHandle, CollectRegistry, CollectStore};
pub use config::Settings;
pub use error::{Error, Result};
pub use host::PluginHost;
pub use hosts::Hosts;
pub use intel::{IntelGate, Verdict, VerdictLookup};
pub use matcher::{DynamicMatcherGroup, Matcher, MatcherGroup, SharedMatcher};
pub use provider::{DomainSet, IpSet, Provider, ProviderError, ProviderRegistry};
pub use rules::{CompositeMatcher, RuleError, RuleSetBuilder, RuleSource};
pub use watcher::{ReloadWatcher, WatchError};
