//! Whitelist, cache and batch lookup combined into a block/pass decision.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::cache::VerdictCache;
use super::whitelist::{DomainWhitelist, IpWhitelist, WhitelistFile};
use super::{Verdict, VerdictLookup};
use crate::config::{IntelArgs, ReloadConfig};
use crate::matcher::domain::normalize;
use crate::provider::Provider;
use crate::watcher::ReloadWatcher;
use crate::{debug_event, log_event};

pub struct IntelGate {
    tag: String,
    domains: Arc<DomainWhitelist>,
    ips: Arc<IpWhitelist>,
    cache: VerdictCache,
    lookup: Arc<dyn VerdictLookup>,
    watcher: Option<ReloadWatcher>,
}

impl IntelGate {
    /// Load the whitelist (if any) and start watching it when `auto_reload` is set.
    pub fn new(
        args: &IntelArgs,
        reload: &ReloadConfig,
        lookup: Arc<dyn VerdictLookup>,
    ) -> crate::Result<Self> {
        let domains = Arc::new(DomainWhitelist::new(Vec::<String>::new()));
        let ips = Arc::new(IpWhitelist::new());

        let watcher = match &args.whitelist_file {
            Some(path) => {
                WhitelistFile::load(path)?.apply(&domains, &ips)?;
                log_event!(
                    "intel",
                    "whitelist loaded",
                    "{}: {} domains, {} ip rules",
                    args.tag,
                    domains.len(),
                    ips.len()
                );
                if args.auto_reload {
                    Some(watch_whitelist(&args.tag, path.clone(), reload, &domains, &ips)?)
                } else {
                    None
                }
            }
            None => None,
        };

        Ok(Self {
            tag: args.tag.clone(),
            domains,
            ips,
            cache: VerdictCache::new(Duration::from_secs(args.cache_ttl_secs)),
            lookup,
            watcher,
        })
    }

    pub fn cache(&self) -> &VerdictCache {
        &self.cache
    }

    pub fn is_whitelisted(&self, ioc: &str) -> bool {
        match ioc.parse::<IpAddr>() {
            Ok(addr) => self.ips.contains(addr),
            Err(_) => self.domains.contains(ioc),
        }
    }

    /// Decide on a set of indicators (query names or answer addresses).
    ///
    /// Indicators are lowercased without the trailing dot before anything
    /// else. Whitelisted ones are skipped, cached verdicts are used as-is,
    /// and the rest go to the lookup in one deduplicated batch. A failed or
    /// uninterpretable lookup passes the query.
    pub async fn check<I, S>(&self, iocs: I) -> Verdict
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cache.purge_if_due();

        let mut batch = BTreeSet::new();
        for ioc in iocs {
            let ioc = normalize(ioc.as_ref());
            if ioc.is_empty() || self.is_whitelisted(&ioc) {
                continue;
            }
            match self.cache.get(&ioc) {
                Some(true) => return Verdict::Block(ioc),
                Some(false) => {}
                None => {
                    batch.insert(ioc);
                }
            }
        }

        if batch.is_empty() {
            return Verdict::Pass;
        }

        let batch: Vec<String> = batch.into_iter().collect();
        let results = match self.lookup.lookup(&batch).await {
            Ok(Some(results)) => results,
            Ok(None) => {
                debug_event!("intel", "no verdict", "{}: {} indicators", self.tag, batch.len());
                return Verdict::Pass;
            }
            Err(e) => {
                tracing::error!("[intel] lookup failed for {}: {e}", self.tag);
                return Verdict::Pass;
            }
        };

        let results: HashMap<String, bool> = results
            .into_iter()
            .map(|(ioc, malicious)| (normalize(&ioc), malicious))
            .collect();
        for (ioc, malicious) in &results {
            self.cache.insert(ioc.as_str(), *malicious);
        }

        match batch.into_iter().find(|ioc| results.get(ioc) == Some(&true)) {
            Some(ioc) => {
                tracing::warn!("[intel] malicious indicator {ioc} blocked by {}", self.tag);
                Verdict::Block(ioc)
            }
            None => Verdict::Pass,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| !w.is_closed())
    }
}

fn watch_whitelist(
    tag: &str,
    path: PathBuf,
    reload: &ReloadConfig,
    domains: &Arc<DomainWhitelist>,
    ips: &Arc<IpWhitelist>,
) -> crate::Result<ReloadWatcher> {
    let (domains, ips) = (Arc::clone(domains), Arc::clone(ips));
    let file = path.clone();
    let watcher = ReloadWatcher::builder(tag)
        .paths([path])
        .debounce(reload.debounce())
        .include_rename(reload.include_rename)
        .on_reload(move || WhitelistFile::load(&file)?.apply(&domains, &ips))
        .build()?;
    Ok(watcher)
}

impl Provider for IntelGate {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn close(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.close();
        }
    }
}

impl std::fmt::Debug for IntelGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntelGate")
            .field("tag", &self.tag)
            .field("whitelisted_domains", &self.domains.len())
            .field("whitelisted_ips", &self.ips.len())
            .field("cached", &self.cache.len())
            .field("watching", &self.is_watching())
            .finish()
    }
}
