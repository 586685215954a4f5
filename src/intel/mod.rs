//! Threat-intel gate.
//!
//! Indicators are checked against hot-reloaded allow lists, then a TTL
//! cache, and only the remainder is sent to a [`VerdictLookup`] in one
//! batch. The lookup transport is pluggable; a lookup that cannot interpret
//! its response reports "no verdict" instead of failing.

mod cache;
mod gate;
mod whitelist;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub use cache::VerdictCache;
pub use gate::IntelGate;
pub use whitelist::{DomainWhitelist, IpWhitelist, WhitelistFile};

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Verdict lookup failed: {reason}")]
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The named indicator is malicious
    Block(String),
    Pass,
}

impl Verdict {
    pub fn is_block(&self) -> bool {
        matches!(self, Verdict::Block(_))
    }
}

/// Batch verdict source.
#[async_trait]
pub trait VerdictLookup: Send + Sync {
    /// Look up a batch of indicators.
    ///
    /// `Ok(None)` means the source answered but gave nothing usable.
    /// Indicators missing from the returned map have no verdict.
    async fn lookup(&self, iocs: &[String]) -> Result<Option<HashMap<String, bool>>, LookupError>;
}

/// Fixed verdict table. Useful when no remote source is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticVerdicts {
    verdicts: HashMap<String, bool>,
}

impl StaticVerdicts {
    pub fn new<S: Into<String>>(verdicts: impl IntoIterator<Item = (S, bool)>) -> Self {
        Self {
            verdicts: verdicts.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[async_trait]
impl VerdictLookup for StaticVerdicts {
    async fn lookup(&self, iocs: &[String]) -> Result<Option<HashMap<String, bool>>, LookupError> {
        if self.verdicts.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            iocs.iter()
                .filter_map(|ioc| self.verdicts.get(ioc).map(|v| (ioc.clone(), *v)))
                .collect(),
        ))
    }
}
