//! `hosts`: static name to address overrides with hot reload.
//!
//! Each record is `<domain-rule> <ip> [<ip>...]`. Unprefixed rules match the
//! full name only. A reload that yields no records is treated as a failed
//! reload and the previous table stays live.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::config::{HostsArgs, ReloadConfig};
use crate::matcher::{DomainMatcher, Matcher, RuleKind};
use crate::provider::Provider;
use crate::rules::{CompositeMatcher, RuleError, RuleSetBuilder, RuleSource};
use crate::watcher::ReloadWatcher;

/// Addresses bound to one hosts record.
pub type HostAddrs = Arc<[IpAddr]>;

/// Parse one hosts record into its rule and addresses.
pub fn parse_record(record: &str) -> Result<(&str, HostAddrs), RuleError> {
    let mut fields = record.split_whitespace();
    let rule = fields.next().ok_or_else(|| RuleError::InvalidRule {
        rule: record.to_string(),
        reason: "empty record".to_string(),
    })?;

    let addrs = fields
        .map(|f| {
            f.parse::<IpAddr>().map_err(|e| RuleError::InvalidRule {
                rule: record.to_string(),
                reason: format!("bad address '{f}': {e}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if addrs.is_empty() {
        return Err(RuleError::InvalidRule {
            rule: record.to_string(),
            reason: "no address".to_string(),
        });
    }
    Ok((rule, addrs.into()))
}

/// Compiles hosts records; rejects empty tables on reload.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostsRules;

impl RuleSetBuilder for HostsRules {
    type Key = str;
    type Value = HostAddrs;
    type Local = DomainMatcher<HostAddrs>;

    const CAPABILITY: &'static str = "hosts table";

    fn compile(&self, source: &RuleSource) -> Result<Self::Local, RuleError> {
        let mut m = DomainMatcher::new(RuleKind::Full);
        source.load_into(|record| {
            let (rule, addrs) = parse_record(record)?;
            m.add(rule, addrs)
        })?;
        Ok(m)
    }

    fn rule_count(local: &Self::Local) -> usize {
        local.len()
    }

    fn referenced(_provider: &dyn Provider) -> Option<crate::matcher::SharedMatcher<str, HostAddrs>> {
        None
    }

    fn accept_reload(&self, local: &Self::Local) -> bool {
        !local.is_empty()
    }
}

pub struct Hosts {
    table: Arc<CompositeMatcher<HostsRules>>,
    watcher: Option<ReloadWatcher>,
}

impl Hosts {
    pub fn new(args: &HostsArgs, reload: &ReloadConfig) -> crate::Result<Self> {
        let table = Arc::new(CompositeMatcher::new(
            args.tag.clone(),
            HostsRules,
            RuleSource::new(args.entries.clone(), args.files.clone()),
            Vec::new(),
            std::sync::Weak::new(),
        ));
        table.rebuild()?;

        let watcher = if args.auto_reload && !args.files.is_empty() {
            let target = Arc::clone(&table);
            Some(
                ReloadWatcher::builder(args.tag.clone())
                    .paths(&args.files)
                    .debounce(reload.debounce())
                    .include_rename(reload.include_rename)
                    .on_reload(move || target.reload().map(|_| ()))
                    .build()?,
            )
        } else {
            None
        };

        Ok(Self { table, watcher })
    }

    pub fn tag(&self) -> &str {
        self.table.tag()
    }

    /// All addresses bound to `name`.
    pub fn lookup(&self, name: &str) -> Option<HostAddrs> {
        self.table.find(name)
    }

    /// IPv4 addresses for an A query; empty when the name has none.
    pub fn lookup_v4(&self, name: &str) -> Vec<Ipv4Addr> {
        self.lookup(name)
            .map(|addrs| {
                addrs
                    .iter()
                    .filter_map(|a| match a {
                        IpAddr::V4(v4) => Some(*v4),
                        IpAddr::V6(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// IPv6 addresses for an AAAA query; empty when the name has none.
    pub fn lookup_v6(&self, name: &str) -> Vec<Ipv6Addr> {
        self.lookup(name)
            .map(|addrs| {
                addrs
                    .iter()
                    .filter_map(|a| match a {
                        IpAddr::V6(v6) => Some(*v6),
                        IpAddr::V4(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Re-read entries and files now. An empty result keeps the current table.
    pub fn reload(&self) -> crate::Result<()> {
        self.table.reload().map(|_| ())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| !w.is_closed())
    }
}

impl Provider for Hosts {
    fn tag(&self) -> &str {
        Hosts::tag(self)
    }

    fn close(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.close();
        }
    }
}

impl std::fmt::Debug for Hosts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hosts")
            .field("table", &self.table)
            .field("watching", &self.is_watching())
            .finish()
    }
}
