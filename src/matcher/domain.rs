//! Domain rule matcher.
//!
//! Rules carry an optional kind prefix:
//!
//! | Prefix     | Matches                                         |
//! |------------|-------------------------------------------------|
//! | `full:`    | the exact name                                  |
//! | `domain:`  | the name and any subdomain on a label boundary  |
//! | `keyword:` | any name containing the pattern                 |
//! | `regexp:`  | any name the regular expression matches         |
//!
//! Unprefixed rules use the matcher's default kind.

use std::collections::HashMap;

use regex::Regex;

use super::Matcher;
use crate::rules::RuleError;

/// How a domain rule is compared against a query name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Full,
    Domain,
    Keyword,
    Regexp,
}

impl RuleKind {
    /// Split a `kind:pattern` rule, falling back to `default` when no known prefix is present.
    pub fn split(rule: &str, default: RuleKind) -> (RuleKind, &str) {
        match rule.split_once(':') {
            Some(("full", rest)) => (RuleKind::Full, rest),
            Some(("domain", rest)) => (RuleKind::Domain, rest),
            Some(("keyword", rest)) => (RuleKind::Keyword, rest),
            Some(("regexp", rest)) => (RuleKind::Regexp, rest),
            _ => (default, rule),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Full => "full",
            RuleKind::Domain => "domain",
            RuleKind::Keyword => "keyword",
            RuleKind::Regexp => "regexp",
        }
    }
}

/// Lowercase and strip the trailing root dot.
pub fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Mixed-kind domain matcher with an associated value per rule.
///
/// Lookup priority: full, then the longest matching domain suffix, then
/// keywords and regular expressions in insertion order.
#[derive(Debug, Clone)]
pub struct DomainMatcher<V> {
    default_kind: RuleKind,
    full: HashMap<String, V>,
    domain: HashMap<String, V>,
    keyword: Vec<(String, V)>,
    regexp: Vec<(Regex, V)>,
}

impl<V: Clone> DomainMatcher<V> {
    pub fn new(default_kind: RuleKind) -> Self {
        Self {
            default_kind,
            full: HashMap::new(),
            domain: HashMap::new(),
            keyword: Vec::new(),
            regexp: Vec::new(),
        }
    }

    /// Add one rule. A repeated full/domain rule replaces the earlier value.
    pub fn add(&mut self, rule: &str, value: V) -> Result<(), RuleError> {
        let (kind, pattern) = RuleKind::split(rule.trim(), self.default_kind);
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(RuleError::InvalidRule {
                rule: rule.to_string(),
                reason: format!("empty {} pattern", kind.as_str()),
            });
        }

        match kind {
            RuleKind::Full => {
                self.full.insert(normalize(pattern), value);
            }
            RuleKind::Domain => {
                self.domain.insert(normalize(pattern), value);
            }
            RuleKind::Keyword => {
                self.keyword.push((pattern.to_ascii_lowercase(), value));
            }
            RuleKind::Regexp => {
                let re = Regex::new(pattern).map_err(|e| RuleError::InvalidRule {
                    rule: rule.to_string(),
                    reason: e.to_string(),
                })?;
                self.regexp.push((re, value));
            }
        }
        Ok(())
    }

    /// Number of stored rules.
    pub fn len(&self) -> usize {
        self.full.len() + self.domain.len() + self.keyword.len() + self.regexp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, name: &str) -> Option<&V> {
        if let Some(v) = self.full.get(name) {
            return Some(v);
        }

        if !self.domain.is_empty() {
            let mut suffix = name;
            loop {
                if let Some(v) = self.domain.get(suffix) {
                    return Some(v);
                }
                match suffix.split_once('.') {
                    Some((_, rest)) if !rest.is_empty() => suffix = rest,
                    _ => break,
                }
            }
        }

        if let Some((_, v)) = self.keyword.iter().find(|(k, _)| name.contains(k.as_str())) {
            return Some(v);
        }

        self.regexp
            .iter()
            .find(|(re, _)| re.is_match(name))
            .map(|(_, v)| v)
    }
}

impl<V: Clone + Send + Sync> Matcher<str, V> for DomainMatcher<V> {
    fn find(&self, key: &str) -> Option<V> {
        let name = normalize(key);
        if name.is_empty() {
            return None;
        }
        self.lookup(&name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain_set(rules: &[&str]) -> DomainMatcher<()> {
        let mut m = DomainMatcher::new(RuleKind::Domain);
        for rule in rules {
            m.add(rule, ()).unwrap();
        }
        m
    }

    #[test]
    fn test_domain_rule_matches_subdomains_on_label_boundary() {
        let m = domain_set(&["domain:example.com"]);
        assert!(m.is_match("example.com"));
        assert!(m.is_match("a.b.example.com."));
        assert!(m.is_match("WWW.Example.COM"));
        assert!(!m.is_match("notexample.com"));
        assert!(!m.is_match("example.org"));
    }

    #[test]
    fn test_full_rule_matches_exact_name_only() {
        let m = domain_set(&["full:a.com"]);
        assert!(m.is_match("a.com"));
        assert!(m.is_match("a.com."));
        assert!(!m.is_match("www.a.com"));
    }

    #[test]
    fn test_keyword_and_regexp_rules() {
        let m = domain_set(&["keyword:tracker", r"regexp:^ad[0-9]+\."]);
        assert!(m.is_match("cdn.tracker.net"));
        assert!(m.is_match("ad12.example.com"));
        assert!(!m.is_match("adx.example.com"));
    }

    #[test]
    fn test_unprefixed_rule_uses_default_kind() {
        let mut m = DomainMatcher::new(RuleKind::Full);
        m.add("router.lan", 1u8).unwrap();
        assert_eq!(m.find("router.lan"), Some(1));
        assert_eq!(m.find("x.router.lan"), None);

        let m = domain_set(&["example.net"]);
        assert!(m.is_match("x.example.net"));
    }

    #[test]
    fn test_full_takes_priority_over_domain() {
        let mut m = DomainMatcher::new(RuleKind::Domain);
        m.add("domain:example.com", "suffix").unwrap();
        m.add("full:www.example.com", "exact").unwrap();
        assert_eq!(m.find("www.example.com"), Some("exact"));
        assert_eq!(m.find("api.example.com"), Some("suffix"));
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let mut m: DomainMatcher<()> = DomainMatcher::new(RuleKind::Domain);
        assert!(m.add("full:", ()).is_err());
        assert!(m.add("regexp:(unclosed", ()).is_err());
        assert!(m.is_empty());
    }

    #[test]
    fn test_empty_query_never_matches() {
        let m = domain_set(&["keyword:a"]);
        assert!(!m.is_match("."));
        assert!(!m.is_match(""));
    }
}
