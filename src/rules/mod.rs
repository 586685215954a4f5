//! Rule set compilation and composite matchers.
//!
//! A [`RuleSetBuilder`] compiles inline expressions and backing files into a
//! local matcher. A [`CompositeMatcher`] folds that local matcher together
//! with the live matchers of referenced providers and publishes the result
//! as one snapshot.

mod composite;
mod error;
pub mod loader;

use std::net::IpAddr;

pub use composite::CompositeMatcher;
pub use error::RuleError;
pub use loader::RuleSource;

use crate::matcher::ip::IpMatcherBuilder;
use crate::matcher::{DomainMatcher, IpMatcher, Matcher, RuleKind, SharedMatcher};
use crate::provider::Provider;

/// Compiles one kind of rule set and knows how to reference providers of the same kind.
pub trait RuleSetBuilder: Send + Sync + 'static {
    type Key: ?Sized + 'static;
    type Value: 'static;
    type Local: Matcher<Self::Key, Self::Value> + 'static;

    /// Capability name used in resolution errors, e.g. "domain matcher".
    const CAPABILITY: &'static str;

    /// Compile inline expressions and files into a local matcher.
    fn compile(&self, source: &RuleSource) -> Result<Self::Local, RuleError>;

    /// Number of rules in a compiled local matcher.
    fn rule_count(local: &Self::Local) -> usize;

    /// The referenced provider's live matcher, if it exposes this capability.
    fn referenced(provider: &dyn Provider) -> Option<SharedMatcher<Self::Key, Self::Value>>;

    /// Whether a reloaded local matcher may replace the published one.
    fn accept_reload(&self, _local: &Self::Local) -> bool {
        true
    }
}

/// Domain rules; unprefixed expressions are `domain:` rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainRules;

impl RuleSetBuilder for DomainRules {
    type Key = str;
    type Value = ();
    type Local = DomainMatcher<()>;

    const CAPABILITY: &'static str = "domain matcher";

    fn compile(&self, source: &RuleSource) -> Result<Self::Local, RuleError> {
        let mut m = DomainMatcher::new(RuleKind::Domain);
        source.load_into(|rule| m.add(rule, ()))?;
        Ok(m)
    }

    fn rule_count(local: &Self::Local) -> usize {
        local.len()
    }

    fn referenced(provider: &dyn Provider) -> Option<SharedMatcher<str>> {
        provider.domain_matcher()
    }
}

/// Address and prefix rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpRules;

impl RuleSetBuilder for IpRules {
    type Key = IpAddr;
    type Value = ();
    type Local = IpMatcher;

    const CAPABILITY: &'static str = "ip matcher";

    fn compile(&self, source: &RuleSource) -> Result<Self::Local, RuleError> {
        let mut b = IpMatcherBuilder::new();
        source.load_into(|rule| b.add(rule))?;
        Ok(b.build())
    }

    fn rule_count(local: &Self::Local) -> usize {
        local.len()
    }

    fn referenced(provider: &dyn Provider) -> Option<SharedMatcher<IpAddr>> {
        provider.ip_matcher()
    }
}
