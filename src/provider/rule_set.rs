//! Shared plumbing for file-backed rule set providers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::matcher::{Matcher, SharedMatcher};
use crate::provider::ProviderRegistry;
use crate::rules::{CompositeMatcher, RuleSetBuilder, RuleSource};
use crate::watcher::ReloadWatcher;

/// A composite matcher registered under a tag, optionally reloaded from its files.
pub struct RuleSetProvider<B: RuleSetBuilder> {
    composite: Arc<CompositeMatcher<B>>,
    watcher: Option<ReloadWatcher>,
}

/// Construction parameters shared by domain and address sets.
pub(crate) struct RuleSetOptions<B> {
    pub tag: String,
    pub builder: B,
    pub expressions: Vec<String>,
    pub sets: Vec<String>,
    pub files: Vec<PathBuf>,
    pub auto_reload: bool,
    pub debounce: Duration,
    pub include_rename: bool,
}

impl<B: RuleSetBuilder> RuleSetProvider<B> {
    /// Build the initial group and, when asked, start watching the backing files.
    ///
    /// Fails if any rule is invalid, a referenced tag is unknown or the
    /// watcher cannot be started.
    pub(crate) fn build(
        options: RuleSetOptions<B>,
        registry: &Arc<ProviderRegistry>,
    ) -> crate::Result<Self> {
        let watch_files = options.auto_reload && !options.files.is_empty();
        let files = options.files.clone();

        let composite = Arc::new(CompositeMatcher::new(
            options.tag,
            options.builder,
            RuleSource::new(options.expressions, options.files),
            options.sets,
            Arc::downgrade(registry),
        ));
        composite.rebuild()?;

        let watcher = if watch_files {
            let target = Arc::clone(&composite);
            let watcher = ReloadWatcher::builder(composite.tag())
                .paths(&files)
                .debounce(options.debounce)
                .include_rename(options.include_rename)
                .on_reload(move || target.reload().map(|_| ()))
                .build()?;
            Some(watcher)
        } else {
            None
        };

        Ok(Self { composite, watcher })
    }

    pub fn tag(&self) -> &str {
        self.composite.tag()
    }

    pub fn matcher(&self) -> SharedMatcher<B::Key, B::Value> {
        self.composite.matcher()
    }

    pub fn composite(&self) -> &CompositeMatcher<B> {
        &self.composite
    }

    /// Re-read files and referenced sets now, outside the watcher.
    pub fn reload(&self) -> crate::Result<()> {
        self.composite.reload().map(|_| ())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| !w.is_closed())
    }

    pub fn close(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.close();
        }
    }
}

impl<B: RuleSetBuilder> Matcher<B::Key, B::Value> for RuleSetProvider<B> {
    fn find(&self, key: &B::Key) -> Option<B::Value> {
        self.composite.find(key)
    }
}

impl<B: RuleSetBuilder> std::fmt::Debug for RuleSetProvider<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSetProvider")
            .field("composite", &self.composite)
            .field("watching", &self.is_watching())
            .finish()
    }
}
