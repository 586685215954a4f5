//! Allow lists consulted before any verdict lookup.

use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;

use crate::matcher::domain::normalize;
use crate::matcher::ip::IpMatcherBuilder;
use crate::matcher::IpMatcher;
use crate::rules::RuleError;

/// Exact-name domain allow list.
#[derive(Debug)]
pub struct DomainWhitelist {
    current: ArcSwap<HashSet<String>>,
}

impl DomainWhitelist {
    pub fn new<S: AsRef<str>>(domains: impl IntoIterator<Item = S>) -> Self {
        let w = Self {
            current: ArcSwap::from_pointee(HashSet::new()),
        };
        w.store(domains);
        w
    }

    /// Replace the whole list.
    pub fn store<S: AsRef<str>>(&self, domains: impl IntoIterator<Item = S>) {
        let set: HashSet<String> = domains
            .into_iter()
            .map(|d| normalize(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        self.current.store(Arc::new(set));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.current.load().contains(&normalize(name))
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Address and prefix allow list.
#[derive(Debug)]
pub struct IpWhitelist {
    current: ArcSwap<IpMatcher>,
}

impl IpWhitelist {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(IpMatcherBuilder::new().build()),
        }
    }

    /// Replace the whole list; on a bad entry the current list is kept.
    pub fn store<S: AsRef<str>>(&self, ips: impl IntoIterator<Item = S>) -> Result<(), RuleError> {
        let mut builder = IpMatcherBuilder::new();
        for ip in ips {
            builder.add(ip.as_ref())?;
        }
        self.current.store(Arc::new(builder.build()));
        Ok(())
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.current.load().contains(addr)
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IpWhitelist {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Deserialize)]
struct AllowList {
    #[serde(default)]
    allow: Vec<String>,
}

/// On-disk whitelist document.
///
/// ```yaml
/// domain:
///   allow: [example.com]
/// ip:
///   allow: [10.0.0.0/8, 192.0.2.1]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct WhitelistFile {
    #[serde(default)]
    domain: AllowList,
    #[serde(default)]
    ip: AllowList,
}

impl WhitelistFile {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| whitelist_error(path, e))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| whitelist_error(path, e))
    }

    pub fn domains(&self) -> &[String] {
        &self.domain.allow
    }

    pub fn ips(&self) -> &[String] {
        &self.ip.allow
    }

    /// Publish both lists. The IP list is validated first so a bad file changes nothing.
    pub fn apply(&self, domains: &DomainWhitelist, ips: &IpWhitelist) -> crate::Result<()> {
        ips.store(&self.ip.allow)?;
        domains.store(&self.domain.allow);
        Ok(())
    }
}

fn whitelist_error(path: &Path, e: impl std::fmt::Display) -> crate::Error {
    crate::Error::Whitelist {
        path: PathBuf::from(path),
        reason: e.to_string(),
    }
}
