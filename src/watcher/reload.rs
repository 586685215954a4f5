//! Debounced reload trigger for a fixed set of files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::debouncer::Debouncer;
use super::error::WatchError;
use super::paths::WatchedPathSet;

/// Callback run after a watched file settles.
pub type ReloadFn = Arc<dyn Fn() -> crate::Result<()> + Send + Sync>;

/// Event channel depth between the notifier thread and the event loop.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Watches canonical file paths and invokes a reload callback once per settled burst.
///
/// The callback runs on the blocking pool, detached from the event loop, so a
/// slow or failing reload never delays processing of later events.
pub struct ReloadWatcher {
    name: String,
    paths: Arc<WatchedPathSet>,
    cancel: CancellationToken,
    /// Dropping the notifier stops event delivery.
    notifier: Mutex<Option<RecommendedWatcher>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReloadWatcher {
    /// Create a builder for configuring the watcher.
    pub fn builder(name: impl Into<String>) -> ReloadWatcherBuilder {
        ReloadWatcherBuilder::new(name)
    }

    /// Watch `paths` with the given debounce, calling `on_reload` after each settled burst.
    pub fn watch<P: AsRef<Path>>(
        name: impl Into<String>,
        paths: impl IntoIterator<Item = P>,
        debounce: Duration,
        on_reload: impl Fn() -> crate::Result<()> + Send + Sync + 'static,
    ) -> Result<Self, WatchError> {
        Self::builder(name)
            .paths(paths)
            .debounce(debounce)
            .on_reload(on_reload)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn paths(&self) -> &WatchedPathSet {
        &self.paths
    }

    /// Stop watching. Idempotent; reloads already running are not interrupted.
    pub fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.notifier.lock().take();
        self.task.lock().take();
        crate::debug_event!(self.name, "watcher closed");
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ReloadWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ReloadWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadWatcher")
            .field("name", &self.name)
            .field("paths", &self.paths.paths())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for constructing a ReloadWatcher.
pub struct ReloadWatcherBuilder {
    name: String,
    paths: Vec<PathBuf>,
    debounce: Duration,
    include_rename: bool,
    on_reload: Option<ReloadFn>,
}

impl ReloadWatcherBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paths: Vec::new(),
            debounce: Duration::from_millis(500),
            include_rename: true,
            on_reload: None,
        }
    }

    /// Add files to watch.
    pub fn paths<P: AsRef<Path>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.paths
            .extend(paths.into_iter().map(|p| p.as_ref().to_path_buf()));
        self
    }

    /// Set the settle window.
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Count rename-onto-path as a change.
    pub fn include_rename(mut self, include: bool) -> Self {
        self.include_rename = include;
        self
    }

    pub fn on_reload(
        mut self,
        on_reload: impl Fn() -> crate::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_reload = Some(Arc::new(on_reload));
        self
    }

    /// Register every path with the notifier and start the event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<ReloadWatcher, WatchError> {
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        let on_reload = self.on_reload.ok_or_else(|| WatchError::InitFailed {
            reason: "reload callback is required".to_string(),
        })?;

        let mut paths = WatchedPathSet::new();
        for path in &self.paths {
            let canonical =
                super::paths::canonical_path(path).map_err(|e| WatchError::PathWatchFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            paths.insert(canonical);
        }
        if paths.is_empty() {
            return Err(WatchError::NoPaths { name: self.name });
        }
        let paths = Arc::new(paths);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut notifier = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        for dir in paths.watch_dirs() {
            notifier
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                })?;
            crate::debug_event!(self.name, "watching", "{}", dir.display());
        }

        let cancel = CancellationToken::new();
        let event_loop = EventLoop {
            name: self.name.clone(),
            paths: paths.clone(),
            debouncer: Debouncer::new(self.debounce),
            include_rename: self.include_rename,
            on_reload,
            runtime: runtime.clone(),
        };
        let task = runtime.spawn(event_loop.run(rx, cancel.clone()));

        crate::log_event!(
            self.name,
            "watching",
            "{} files in {} directories",
            paths.len(),
            paths.dir_count()
        );

        Ok(ReloadWatcher {
            name: self.name,
            paths,
            cancel,
            notifier: Mutex::new(Some(notifier)),
            task: Mutex::new(Some(task)),
        })
    }
}

/// Whether an event kind counts as a content change.
fn is_change(kind: &EventKind, include_rename: bool) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Name(_)) => include_rename,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

struct EventLoop {
    name: String,
    paths: Arc<WatchedPathSet>,
    debouncer: Debouncer,
    include_rename: bool,
    on_reload: ReloadFn,
    runtime: Handle,
}

impl EventLoop {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<notify::Result<Event>>,
        cancel: CancellationToken,
    ) {
        loop {
            let deadline = self.debouncer.next_deadline();
            let settle = tokio::time::sleep_until(tokio::time::Instant::from_std(
                deadline.unwrap_or_else(Instant::now),
            ));

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                res = events.recv() => match res {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => {
                        tracing::warn!("[{}] file watch error: {e}", self.name);
                    }
                    None => break,
                },

                _ = settle, if deadline.is_some() => {
                    for path in self.debouncer.take_ready() {
                        self.spawn_reload(path);
                    }
                }
            }
        }
        crate::debug_event!(self.name, "event loop stopped");
    }

    fn handle_event(&mut self, event: Event) {
        if !is_change(&event.kind, self.include_rename) {
            return;
        }
        for path in event.paths {
            if self.paths.contains(&path) {
                crate::debug_event!(self.name, "changed", "{:?} {}", event.kind, path.display());
                self.debouncer.record(path);
            }
        }
    }

    fn spawn_reload(&self, path: PathBuf) {
        let name = self.name.clone();
        let on_reload = self.on_reload.clone();
        self.runtime.spawn_blocking(move || match on_reload() {
            Ok(()) => crate::log_event!(name, "reloaded", "{}", path.display()),
            Err(e) => tracing::error!("[{name}] reload failed after {} changed: {e}", path.display()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RenameMode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn counting_loop(
        paths: &[&str],
        debounce: Duration,
    ) -> (
        mpsc::Sender<notify::Result<Event>>,
        CancellationToken,
        Arc<AtomicUsize>,
        JoinHandle<()>,
    ) {
        let mut set = WatchedPathSet::new();
        for p in paths {
            set.insert(PathBuf::from(p));
        }
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let event_loop = EventLoop {
            name: "test".to_string(),
            paths: Arc::new(set),
            debouncer: Debouncer::new(debounce),
            include_rename: true,
            on_reload: Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            runtime: Handle::current(),
        };
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(event_loop.run(rx, cancel.clone()));
        (tx, cancel, count, task)
    }

    fn write_event(path: &str) -> notify::Result<Event> {
        Ok(Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from(path)))
    }

    #[test]
    fn test_change_kinds() {
        assert!(is_change(&EventKind::Create(CreateKind::File), false));
        assert!(is_change(
            &EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            false
        ));
        assert!(is_change(
            &EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            true
        ));
        assert!(!is_change(
            &EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            false
        ));
        assert!(!is_change(
            &EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            true
        ));
        assert!(!is_change(
            &EventKind::Remove(notify::event::RemoveKind::File),
            true
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_burst_collapses_into_one_reload() {
        let (tx, cancel, count, task) = counting_loop(&["/rules/a.txt"], Duration::from_millis(150));

        for _ in 0..8 {
            tx.send(write_event("/rules/a.txt")).await.unwrap();
            sleep(Duration::from_millis(20)).await;
        }
        // Still inside the settle window of the last write
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unwatched_paths_are_ignored() {
        let (tx, cancel, count, task) = counting_loop(&["/rules/a.txt"], Duration::from_millis(50));

        tx.send(write_event("/rules/a.txt.tmp")).await.unwrap();
        tx.send(write_event("/rules/b.txt")).await.unwrap();
        sleep(Duration::from_millis(250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_each_path_settles_independently() {
        let (tx, cancel, count, task) =
            counting_loop(&["/rules/a.txt", "/rules/b.txt"], Duration::from_millis(80));

        tx.send(write_event("/rules/a.txt")).await.unwrap();
        tx.send(write_event("/rules/b.txt")).await.unwrap();
        sleep(Duration::from_millis(400)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_notifier_errors_do_not_stop_the_loop() {
        let (tx, cancel, count, task) = counting_loop(&["/rules/a.txt"], Duration::from_millis(50));

        tx.send(Err(notify::Error::generic("queue overflow")))
            .await
            .unwrap();
        tx.send(write_event("/rules/a.txt")).await.unwrap();
        sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_drops_pending_settle() {
        let (tx, cancel, count, task) = counting_loop(&["/rules/a.txt"], Duration::from_millis(200));

        tx.send(write_event("/rules/a.txt")).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.unwrap();

        sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failing_reload_keeps_watching() {
        let mut set = WatchedPathSet::new();
        set.insert(PathBuf::from("/rules/a.txt"));
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let event_loop = EventLoop {
            name: "failing".to_string(),
            paths: Arc::new(set),
            debouncer: Debouncer::new(Duration::from_millis(40)),
            include_rename: true,
            on_reload: Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(crate::Error::Config {
                    tag: "failing".to_string(),
                    reason: "boom".to_string(),
                })
            }),
            runtime: Handle::current(),
        };
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(event_loop.run(rx, cancel.clone()));

        tx.send(write_event("/rules/a.txt")).await.unwrap();
        sleep(Duration::from_millis(200)).await;
        tx.send(write_event("/rules/a.txt")).await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = ReloadWatcher::builder("no-runtime")
            .paths(["/tmp/rules.txt"])
            .on_reload(|| Ok(()))
            .build();
        assert!(matches!(result, Err(WatchError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_missing_directory_fails_construction() {
        let result = ReloadWatcher::watch(
            "missing",
            ["/definitely/not/here/rules.txt"],
            Duration::from_millis(50),
            || Ok(()),
        );
        match result {
            Err(WatchError::PathWatchFailed { path, .. }) => {
                assert_eq!(path, PathBuf::from("/definitely/not/here"));
            }
            other => panic!("expected PathWatchFailed, got {other:?}"),
        }
    }
}
