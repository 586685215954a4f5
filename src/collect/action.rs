//! `collect_action`: turn query names into collect store entries.

use std::sync::Arc;

use super::{CollectHandle, CollectRegistry};
use crate::config::CollectArgs;
use crate::provider::Provider;

/// Rule prefix written in front of each collected name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryFormat {
    Domain,
    #[default]
    Full,
    Keyword,
}

impl EntryFormat {
    /// Case-insensitive; unknown values fall back to `full`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "domain" => Self::Domain,
            "keyword" => Self::Keyword,
            _ => Self::Full,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Full => "full",
            Self::Keyword => "keyword",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    Add,
    Delete,
}

impl Operation {
    /// Case-insensitive; unknown values fall back to `add`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Self::Delete,
            _ => Self::Add,
        }
    }
}

/// Formats a query name and adds it to or removes it from a shared store.
pub struct CollectAction {
    tag: String,
    handle: CollectHandle,
    format: EntryFormat,
    operation: Operation,
}

impl CollectAction {
    pub fn new(args: &CollectArgs, registry: &Arc<CollectRegistry>) -> crate::Result<Self> {
        if args.file_path.as_os_str().is_empty() {
            return Err(crate::Error::Config {
                tag: args.tag.clone(),
                reason: "file_path is required".to_string(),
            });
        }

        Ok(Self {
            tag: args.tag.clone(),
            handle: registry.get_or_create(&args.file_path)?,
            format: EntryFormat::parse(&args.format),
            operation: Operation::parse(&args.operation),
        })
    }

    pub fn format(&self) -> EntryFormat {
        self.format
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn handle(&self) -> &CollectHandle {
        &self.handle
    }

    /// The entry `name` maps to, or `None` for the root name.
    pub fn entry_for(&self, name: &str) -> Option<String> {
        let name = name.strip_suffix('.').unwrap_or(name);
        if name.is_empty() {
            return None;
        }
        Some(format!("{}:{}", self.format.as_str(), name))
    }

    /// Apply the configured operation for a query name. Returns whether the store changed.
    pub fn exec(&self, query_name: &str) -> bool {
        let Some(entry) = self.entry_for(query_name) else {
            return false;
        };
        match self.operation {
            Operation::Add => self.handle.add(&entry),
            Operation::Delete => self.handle.delete(&entry),
        }
    }
}

impl Provider for CollectAction {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn close(&self) {
        self.handle.close();
    }
}

impl std::fmt::Debug for CollectAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectAction")
            .field("tag", &self.tag)
            .field("path", &self.handle.path())
            .field("format", &self.format)
            .field("operation", &self.operation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectConfig;
    use tempfile::TempDir;

    fn action(
        registry: &Arc<CollectRegistry>,
        path: &std::path::Path,
        format: &str,
        operation: &str,
    ) -> CollectAction {
        let args = CollectArgs {
            tag: format!("{format}-{operation}"),
            file_path: path.to_path_buf(),
            format: format.to_string(),
            operation: operation.to_string(),
        };
        CollectAction::new(&args, registry).unwrap()
    }

    #[test]
    fn test_parse_falls_back() {
        assert_eq!(EntryFormat::parse("DOMAIN"), EntryFormat::Domain);
        assert_eq!(EntryFormat::parse("regexp"), EntryFormat::Full);
        assert_eq!(EntryFormat::parse(""), EntryFormat::Full);
        assert_eq!(Operation::parse("Delete"), Operation::Delete);
        assert_eq!(Operation::parse("remove"), Operation::Add);
    }

    #[test]
    fn test_entry_formatting() {
        let temp_dir = TempDir::new().unwrap();
        let registry = CollectRegistry::new(CollectConfig::default());
        let a = action(&registry, &temp_dir.path().join("k.txt"), "keyword", "add");

        assert_eq!(a.entry_for("ads.example.com."), Some("keyword:ads.example.com".into()));
        assert_eq!(a.entry_for("."), None);
        assert_eq!(a.entry_for(""), None);
    }

    #[test]
    fn test_add_and_delete_actions_share_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seen.txt");
        let registry = CollectRegistry::new(CollectConfig::default());

        let add = action(&registry, &path, "full", "add");
        let del = action(&registry, &path, "full", "delete");
        assert_eq!(registry.ref_count(&path), 2);

        assert!(add.exec("a.com."));
        assert!(!add.exec("a.com."));
        assert!(del.handle().contains("full:a.com"));

        assert!(del.exec("a.com."));
        assert!(!add.handle().contains("full:a.com"));

        add.close();
        del.close();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_file_path_rejected() {
        let registry = CollectRegistry::new(CollectConfig::default());
        let args = CollectArgs {
            tag: "c".to_string(),
            ..Default::default()
        };
        let err = CollectAction::new(&args, &registry).unwrap_err();
        assert!(err.to_string().contains("file_path is required"));
    }
}
