//! IP address and prefix matcher.

use std::net::IpAddr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use super::Matcher;
use crate::rules::RuleError;

/// Parse `addr` or `addr/len` into a prefix. Bare addresses become host prefixes.
pub fn parse_prefix(s: &str) -> Result<IpNet, RuleError> {
    let s = s.trim();
    let parsed = if s.contains('/') {
        s.parse::<IpNet>().map_err(|e| e.to_string())
    } else {
        s.parse::<IpAddr>()
            .map(IpNet::from)
            .map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| RuleError::InvalidRule {
        rule: s.to_string(),
        reason,
    })
}

/// Collects prefixes before they are aggregated into an [`IpMatcher`].
#[derive(Debug, Default)]
pub struct IpMatcherBuilder {
    v4: Vec<Ipv4Net>,
    v6: Vec<Ipv6Net>,
}

impl IpMatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: &str) -> Result<(), RuleError> {
        self.push(parse_prefix(rule)?);
        Ok(())
    }

    pub fn push(&mut self, net: IpNet) {
        match net {
            IpNet::V4(n) => self.v4.push(n),
            IpNet::V6(n) => self.v6.push(n),
        }
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sort and merge overlapping prefixes.
    pub fn build(self) -> IpMatcher {
        let entries = self.len();
        IpMatcher {
            v4: Ipv4Net::aggregate(&self.v4),
            v6: Ipv6Net::aggregate(&self.v6),
            entries,
        }
    }
}

/// Sorted, non-overlapping prefix lists searched by network address.
#[derive(Debug, Clone, Default)]
pub struct IpMatcher {
    v4: Vec<Ipv4Net>,
    v6: Vec<Ipv6Net>,
    entries: usize,
}

impl IpMatcher {
    /// Number of prefixes the matcher was built from.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(a) => {
                let idx = self.v4.partition_point(|n| n.network() <= a);
                idx > 0 && self.v4[idx - 1].contains(&a)
            }
            IpAddr::V6(a) => {
                // Mapped v4 addresses are looked up as v4
                if let Some(v4) = a.to_ipv4_mapped() {
                    return self.contains(IpAddr::V4(v4));
                }
                let idx = self.v6.partition_point(|n| n.network() <= a);
                idx > 0 && self.v6[idx - 1].contains(&a)
            }
        }
    }
}

impl Matcher<IpAddr> for IpMatcher {
    fn find(&self, key: &IpAddr) -> Option<()> {
        self.contains(*key).then_some(())
    }
}
