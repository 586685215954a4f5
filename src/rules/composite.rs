//! Local rules plus referenced providers behind one atomically published group.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{RuleSetBuilder, RuleSource};
use crate::log_event;
use crate::matcher::{DynamicMatcherGroup, Matcher, MatcherGroup, SharedMatcher};
use crate::provider::{ProviderError, ProviderRegistry};

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Rules compiled from expressions and files
    pub local_rules: usize,
    /// Referenced providers folded into the group
    pub referenced: usize,
}

/// A matcher whose published group is the local rule set followed by the
/// live matchers of referenced providers, in configuration order.
///
/// Referenced matchers are held by handle, not copied, so a reload inside a
/// referenced provider is visible here without rebuilding this composite.
pub struct CompositeMatcher<B: RuleSetBuilder> {
    tag: String,
    builder: B,
    source: RuleSource,
    sets: Vec<String>,
    registry: Weak<ProviderRegistry>,
    group: Arc<DynamicMatcherGroup<B::Key, B::Value>>,
    rebuild_lock: Mutex<()>,
}

impl<B: RuleSetBuilder> CompositeMatcher<B> {
    /// Create an unpublished composite; call [`rebuild`](Self::rebuild) before use.
    pub fn new(
        tag: impl Into<String>,
        builder: B,
        source: RuleSource,
        sets: Vec<String>,
        registry: Weak<ProviderRegistry>,
    ) -> Self {
        Self {
            tag: tag.into(),
            builder,
            source,
            sets,
            registry,
            group: Arc::new(DynamicMatcherGroup::new()),
            rebuild_lock: Mutex::new(()),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn source(&self) -> &RuleSource {
        &self.source
    }

    pub fn sets(&self) -> &[String] {
        &self.sets
    }

    /// Live handle to the published group. Later rebuilds are visible through it.
    pub fn matcher(&self) -> SharedMatcher<B::Key, B::Value> {
        self.group.clone()
    }

    /// Number of matchers in the current snapshot.
    pub fn group_len(&self) -> usize {
        self.group.snapshot().len()
    }

    /// Compile, resolve references and publish a new group.
    ///
    /// On error nothing is published and the previous group stays live.
    pub fn rebuild(&self) -> crate::Result<RebuildSummary> {
        self.rebuild_with(false)
    }

    /// Rebuild triggered by a file change.
    ///
    /// Same as [`rebuild`](Self::rebuild), but a compiled set the builder
    /// rejects as a reload result also keeps the previous group.
    pub fn reload(&self) -> crate::Result<RebuildSummary> {
        self.rebuild_with(true)
    }

    fn rebuild_with(&self, reloading: bool) -> crate::Result<RebuildSummary> {
        let _guard = self.rebuild_lock.lock();

        let local = self.builder.compile(&self.source)?;
        if reloading && !self.builder.accept_reload(&local) {
            return Err(crate::Error::Config {
                tag: self.tag.clone(),
                reason: "reload produced an empty rule set, keeping previous rules".to_string(),
            });
        }

        let local_rules = B::rule_count(&local);
        let mut matchers: Vec<SharedMatcher<B::Key, B::Value>> =
            Vec::with_capacity(self.sets.len() + 1);
        if local_rules > 0 {
            matchers.push(Arc::new(local));
        }
        for tag in &self.sets {
            matchers.push(self.resolve(tag)?);
        }

        let summary = RebuildSummary {
            local_rules,
            referenced: self.sets.len(),
        };
        self.group.publish(MatcherGroup::new(matchers));

        log_event!(
            "rules",
            if reloading { "reloaded" } else { "built" },
            "{}: {} local rules, {} referenced sets",
            self.tag,
            summary.local_rules,
            summary.referenced
        );
        Ok(summary)
    }

    fn resolve(&self, tag: &str) -> Result<SharedMatcher<B::Key, B::Value>, ProviderError> {
        let registry = self.registry.upgrade().ok_or(ProviderError::RegistryClosed)?;
        let provider = registry.resolve(tag).ok_or_else(|| ProviderError::NotFound {
            tag: tag.to_string(),
        })?;
        B::referenced(provider.as_ref()).ok_or_else(|| ProviderError::Capability {
            tag: tag.to_string(),
            capability: B::CAPABILITY,
        })
    }
}

impl<B: RuleSetBuilder> Matcher<B::Key, B::Value> for CompositeMatcher<B> {
    fn find(&self, key: &B::Key) -> Option<B::Value> {
        self.group.find(key)
    }
}

impl<B: RuleSetBuilder> std::fmt::Debug for CompositeMatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeMatcher")
            .field("tag", &self.tag)
            .field("sets", &self.sets)
            .field("files", &self.source.files)
            .field("group_len", &self.group_len())
            .finish()
    }
}
