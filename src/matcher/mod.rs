//! Matcher capability and hot-swappable matcher groups.
//!
//! A [`Matcher`] answers "does this key match, and with what value".
//! Groups combine matchers with first-hit-wins semantics, and
//! [`DynamicMatcherGroup`] publishes a whole group behind an atomically
//! replaceable snapshot so readers never observe a partially rebuilt set.
//!
//! # Architecture
//!
//! ```text
//! DynamicMatcherGroup ──ArcSwap──> MatcherGroup (immutable)
//!                                    ├─ local DomainMatcher / IpMatcher
//!                                    └─ referenced provider's DynamicMatcherGroup
//! ```

pub mod domain;
pub mod ip;

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

pub use domain::{DomainMatcher, RuleKind};
pub use ip::IpMatcher;

/// A lookup capability over keys of type `K` yielding values of type `V`.
pub trait Matcher<K: ?Sized, V = ()>: Send + Sync {
    /// Return the associated value when `key` matches.
    fn find(&self, key: &K) -> Option<V>;

    fn is_match(&self, key: &K) -> bool {
        self.find(key).is_some()
    }
}

/// Shared handle to any matcher.
pub type SharedMatcher<K, V = ()> = Arc<dyn Matcher<K, V>>;

/// Ordered union of matchers, evaluated with short-circuit OR.
pub struct MatcherGroup<K: ?Sized, V = ()> {
    matchers: Vec<SharedMatcher<K, V>>,
}

impl<K: ?Sized, V> MatcherGroup<K, V> {
    pub fn new(matchers: Vec<SharedMatcher<K, V>>) -> Self {
        Self { matchers }
    }

    pub fn empty() -> Self {
        Self {
            matchers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl<K: ?Sized, V> Matcher<K, V> for MatcherGroup<K, V> {
    fn find(&self, key: &K) -> Option<V> {
        self.matchers.iter().find_map(|m| m.find(key))
    }
}

impl<K: ?Sized, V> fmt::Debug for MatcherGroup<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherGroup")
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

/// Holds exactly one published [`MatcherGroup`] at a time.
///
/// `find` loads the snapshot once per call, so a lookup racing a
/// [`publish`](Self::publish) sees either the old or the new group in full.
pub struct DynamicMatcherGroup<K: ?Sized, V = ()> {
    current: ArcSwap<MatcherGroup<K, V>>,
}

impl<K: ?Sized, V> DynamicMatcherGroup<K, V> {
    /// Create a group that matches nothing until the first publish.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(MatcherGroup::empty()),
        }
    }

    /// Replace the published group in one step.
    pub fn publish(&self, group: MatcherGroup<K, V>) {
        self.current.store(Arc::new(group));
    }

    /// The currently published group.
    pub fn snapshot(&self) -> Arc<MatcherGroup<K, V>> {
        self.current.load_full()
    }
}

impl<K: ?Sized, V> Default for DynamicMatcherGroup<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ?Sized, V> Matcher<K, V> for DynamicMatcherGroup<K, V> {
    fn find(&self, key: &K) -> Option<V> {
        let group = self.current.load();
        group.find(key)
    }
}

impl<K: ?Sized, V> fmt::Debug for DynamicMatcherGroup<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMatcherGroup")
            .field("matchers", &self.current.load().len())
            .finish()
    }
}
