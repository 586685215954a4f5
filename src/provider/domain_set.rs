//! `domain_set`: a named, hot-reloadable domain rule provider.

use std::sync::Arc;

use super::rule_set::{RuleSetOptions, RuleSetProvider};
use super::{Provider, ProviderRegistry};
use crate::config::{DomainSetArgs, ReloadConfig};
use crate::matcher::SharedMatcher;
use crate::rules::DomainRules;

pub type DomainSet = RuleSetProvider<DomainRules>;

impl DomainSet {
    pub fn new(
        args: &DomainSetArgs,
        reload: &ReloadConfig,
        registry: &Arc<ProviderRegistry>,
    ) -> crate::Result<Self> {
        Self::build(
            RuleSetOptions {
                tag: args.tag.clone(),
                builder: DomainRules,
                expressions: args.exps.clone(),
                sets: args.sets.clone(),
                files: args.files.clone(),
                auto_reload: args.auto_reload,
                debounce: reload.debounce_for(args.debounce_ms),
                include_rename: reload.include_rename,
            },
            registry,
        )
    }
}

impl Provider for DomainSet {
    fn tag(&self) -> &str {
        RuleSetProvider::tag(self)
    }

    fn domain_matcher(&self) -> Option<SharedMatcher<str>> {
        Some(self.matcher())
    }

    fn close(&self) {
        RuleSetProvider::close(self)
    }
}
