//! `ip_set`: a named, hot-reloadable address and prefix provider.

use std::net::IpAddr;
use std::sync::Arc;

use super::rule_set::{RuleSetOptions, RuleSetProvider};
use super::{Provider, ProviderRegistry};
use crate::config::{IpSetArgs, ReloadConfig};
use crate::matcher::SharedMatcher;
use crate::rules::IpRules;

pub type IpSet = RuleSetProvider<IpRules>;

impl IpSet {
    pub fn new(
        args: &IpSetArgs,
        reload: &ReloadConfig,
        registry: &Arc<ProviderRegistry>,
    ) -> crate::Result<Self> {
        Self::build(
            RuleSetOptions {
                tag: args.tag.clone(),
                builder: IpRules,
                expressions: args.ips.clone(),
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

impl Provider for IpSet {
    fn tag(&self) -> &str {
        RuleSetProvider::tag(self)
    }

    fn ip_matcher(&self) -> Option<SharedMatcher<IpAddr>> {
        Some(self.matcher())
    }

    fn close(&self) {
        RuleSetProvider::close(self)
    }
}
