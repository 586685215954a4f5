//! Deduplicated entry set mirrored to a backing file by a single writer thread.

use std::collections::{HashSet, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use parking_lot::{Condvar, Mutex};
use tempfile::NamedTempFile;

use super::CollectError;
use crate::config::{CollectConfig, RetryPolicy};
use crate::{debug_event, log_event};

/// A durable write, applied by the writer thread in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteOp {
    /// Append one line
    Append(String),
    /// Replace the file with the current cache contents
    Rewrite,
}

/// An operation that missed the queue, with the enqueue attempts it has left.
struct Pending {
    op: WriteOp,
    attempts_left: u32,
    backoff: Duration,
    /// Attempts already spent before it reached the backlog
    tried: u32,
}

/// Cache, queue sender and retry backlog. All live under one lock so that
/// queue order always equals cache mutation order.
struct State {
    entries: HashSet<String>,
    queue: Option<Sender<WriteOp>>,
    backlog: VecDeque<Pending>,
    /// The retrier holds an op taken from the front of the backlog
    in_flight: bool,
    closing: bool,
}

impl State {
    fn retrying(&self) -> bool {
        self.in_flight || !self.backlog.is_empty()
    }
}

struct Shared {
    path: PathBuf,
    state: Mutex<State>,
    /// Signals the retrier that the backlog grew or the store is closing
    wake: Condvar,
}

struct Workers {
    writer: JoinHandle<()>,
    retrier: JoinHandle<()>,
}

/// In-memory entry set for one canonical backing file.
///
/// `add` and `delete` update the set synchronously and never touch the
/// filesystem; the writer thread catches the file up afterwards.
///
/// Entries are single trimmed lines, matching what a reload of the file
/// would produce. Empty entries and entries with line breaks are refused.
pub struct CollectStore {
    shared: Arc<Shared>,
    add_retry: RetryPolicy,
    delete_retry: RetryPolicy,
    workers: Mutex<Option<Workers>>,
}

impl CollectStore {
    /// Load `path` into memory and start the writer.
    ///
    /// A missing file yields an empty store. `path` is expected to be canonical;
    /// [`CollectRegistry`](super::CollectRegistry) takes care of that.
    pub fn open(path: impl Into<PathBuf>, config: &CollectConfig) -> Result<Self, CollectError> {
        let path = path.into();
        let entries = load_entries(&path)?;
        debug_event!(
            "collect",
            "loaded",
            "{} entries from {}",
            entries.len(),
            path.display()
        );

        let (queue_tx, queue_rx) = bounded::<WriteOp>(config.queue_capacity.max(1));

        let shared = Arc::new(Shared {
            path,
            state: Mutex::new(State {
                entries,
                queue: Some(queue_tx.clone()),
                backlog: VecDeque::new(),
                in_flight: false,
                closing: false,
            }),
            wake: Condvar::new(),
        });

        let writer = {
            let shared = Arc::clone(&shared);
            spawn("collect-writer", move || run_writer(&shared, queue_rx))?
        };
        let retrier = {
            let shared = Arc::clone(&shared);
            spawn("collect-retry", move || run_retrier(&shared, queue_tx))?
        };

        Ok(Self {
            shared,
            add_retry: config.add_retry,
            delete_retry: config.delete_retry,
            workers: Mutex::new(Some(Workers { writer, retrier })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Insert `entry`; returns `false` when it was already present or is not
    /// a storable line.
    ///
    /// The durable append is best effort: if it cannot be queued within the
    /// add retry policy it is logged and dropped.
    pub fn add(&self, entry: &str) -> bool {
        let Some(entry) = self.storable(entry) else {
            return false;
        };
        let mut state = self.shared.state.lock();
        if state.entries.contains(entry) {
            return false;
        }
        state.entries.insert(entry.to_string());
        self.submit(&mut state, WriteOp::Append(entry.to_string()), self.add_retry);
        true
    }

    /// Remove `entry`; returns `false` when it was not present.
    ///
    /// Schedules a full rewrite, retried under the (longer) delete policy.
    pub fn delete(&self, entry: &str) -> bool {
        let Some(entry) = self.storable(entry) else {
            return false;
        };
        let mut state = self.shared.state.lock();
        if !state.entries.remove(entry) {
            return false;
        }
        self.submit(&mut state, WriteOp::Rewrite, self.delete_retry);
        true
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.shared.state.lock().entries.contains(entry.trim())
    }

    /// Current entries, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<_> = self.shared.state.lock().entries.iter().cloned().collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operations queued or waiting for a retry.
    pub fn pending(&self) -> usize {
        let state = self.shared.state.lock();
        let queued = state.queue.as_ref().map_or(0, |q| q.len());
        queued + state.backlog.len() + usize::from(state.in_flight)
    }

    pub fn is_closed(&self) -> bool {
        self.workers.lock().is_none()
    }

    /// Stop accepting durable writes and wait for everything queued to be applied.
    ///
    /// Later `add`/`delete` calls still update the cache but are not persisted.
    pub fn shutdown(&self) {
        let Some(workers) = self.workers.lock().take() else {
            return;
        };

        {
            let mut state = self.shared.state.lock();
            state.queue = None;
            state.closing = true;
        }
        self.shared.wake.notify_all();

        // The retrier empties the backlog and owns the last queue sender;
        // the writer drains once it exits.
        if workers.retrier.join().is_err() {
            tracing::error!("[collect] retry thread panicked");
        }
        if workers.writer.join().is_err() {
            tracing::error!("[collect] writer thread panicked");
        }
        log_event!("collect", "closed", "{}", self.shared.path.display());
    }

    /// Trimmed entry, or `None` when it would not survive a reload of the file.
    fn storable<'a>(&self, entry: &'a str) -> Option<&'a str> {
        let entry = entry.trim();
        if entry.is_empty() || entry.contains(['\n', '\r']) {
            tracing::warn!(
                "[collect] refusing entry {:?} for {}: not a single line",
                entry,
                self.shared.path.display()
            );
            return None;
        }
        Some(entry)
    }

    fn submit(&self, state: &mut State, op: WriteOp, policy: RetryPolicy) {
        let Some(queue) = &state.queue else {
            tracing::warn!(
                "[collect] store closed, not persisting {:?} for {}",
                op,
                self.shared.path.display()
            );
            return;
        };

        // Once anything is waiting for a retry, later ops queue behind it.
        let pending = if state.retrying() {
            Pending {
                op,
                attempts_left: policy.attempts,
                backoff: policy.backoff(),
                tried: 0,
            }
        } else {
            match queue.try_send(op) {
                Ok(()) => return,
                Err(TrySendError::Full(op)) => Pending {
                    op,
                    attempts_left: policy.attempts.saturating_sub(1),
                    backoff: policy.backoff(),
                    tried: 1,
                },
                Err(TrySendError::Disconnected(op)) => {
                    tracing::error!("[collect] writer gone, dropping {op:?}");
                    return;
                }
            }
        };

        if pending.attempts_left == 0 {
            dropped(&self.shared.path, &pending.op, pending.tried);
            return;
        }
        state.backlog.push_back(pending);
        self.shared.wake.notify_one();
    }
}

impl Drop for CollectStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CollectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectStore")
            .field("path", &self.shared.path)
            .field("entries", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn spawn<F>(name: &str, f: F) -> Result<JoinHandle<()>, CollectError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| CollectError::Spawn {
            reason: e.to_string(),
        })
}

fn dropped(path: &Path, op: &WriteOp, attempts: u32) {
    tracing::error!(
        "[collect] failed to queue {:?} for {} after {} attempts, durable write dropped",
        op,
        path.display(),
        attempts
    );
}

/// Read the backing file: one entry per trimmed, non-empty line.
fn load_entries(path: &Path) -> Result<HashSet<String>, CollectError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(source) => {
            return Err(CollectError::Load {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Single consumer: applies operations in order until every sender is gone.
fn run_writer(shared: &Shared, queue: Receiver<WriteOp>) {
    for op in queue {
        let result = match &op {
            WriteOp::Append(entry) => append_line(&shared.path, entry),
            WriteOp::Rewrite => {
                let mut entries: Vec<String> =
                    shared.state.lock().entries.iter().cloned().collect();
                entries.sort();
                rewrite_file(&shared.path, &entries)
            }
        };
        match result {
            Ok(()) => debug_event!("collect", "applied", "{:?} to {}", op, shared.path.display()),
            Err(e) => tracing::error!(
                "[collect] failed to apply {:?} to {}: {}",
                op,
                shared.path.display(),
                e
            ),
        }
    }
}

/// Feeds the backlog into the queue front to back until the store closes
/// and the backlog is empty.
fn run_retrier(shared: &Shared, queue: Sender<WriteOp>) {
    loop {
        let pending = {
            let mut state = shared.state.lock();
            loop {
                if let Some(pending) = state.backlog.pop_front() {
                    state.in_flight = true;
                    break pending;
                }
                if state.closing {
                    return;
                }
                shared.wake.wait(&mut state);
            }
        };
        // The lock is released while waiting for queue space.
        deliver(shared, &queue, pending);
        shared.state.lock().in_flight = false;
    }
}

/// Spend the op's remaining attempts, each waiting up to one backoff for queue space.
fn deliver(shared: &Shared, queue: &Sender<WriteOp>, pending: Pending) {
    let Pending {
        mut op,
        attempts_left,
        backoff,
        tried,
    } = pending;
    for _ in 0..attempts_left {
        match queue.send_timeout(op, backoff) {
            Ok(()) => return,
            Err(SendTimeoutError::Timeout(back)) => op = back,
            Err(SendTimeoutError::Disconnected(back)) => {
                tracing::error!("[collect] writer gone, dropping {back:?}");
                return;
            }
        }
    }
    dropped(&shared.path, &op, tried + attempts_left);
}

fn append_line(path: &Path, entry: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{entry}")
}

/// Write all entries to a temp file beside `path`, then rename it over `path`.
fn rewrite_file(path: &Path, entries: &[String]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        for entry in entries {
            writeln!(out, "{entry}")?;
        }
        out.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn file_entries(path: &Path) -> Vec<String> {
        let mut lines: Vec<String> = fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect();
        lines.sort();
        lines.dedup();
        lines
    }

    fn wait_for_file(path: &Path, expected: &[&str]) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if file_entries(path) == expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = CollectStore::open(temp_dir.path().join("none.txt"), &CollectConfig::default())
            .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_and_delete_visible_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            CollectStore::open(temp_dir.path().join("c.txt"), &CollectConfig::default()).unwrap();

        assert!(store.add("full:x.com"));
        assert!(!store.add("full:x.com"));
        assert!(store.contains("full:x.com"));

        assert!(store.delete("full:x.com"));
        assert!(!store.delete("full:x.com"));
        assert!(!store.contains("full:x.com"));
    }

    #[test]
    fn test_add_then_delete_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("collected.txt");
        fs::write(&path, "full:a.com\n").unwrap();

        let store = CollectStore::open(&path, &CollectConfig::default()).unwrap();
        assert_eq!(store.entries(), vec!["full:a.com"]);

        store.add("full:b.com");
        assert_eq!(store.entries(), vec!["full:a.com", "full:b.com"]);
        assert!(wait_for_file(&path, &["full:a.com", "full:b.com"]));

        store.delete("full:a.com");
        assert_eq!(store.entries(), vec!["full:b.com"]);
        assert!(wait_for_file(&path, &["full:b.com"]));
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("drain.txt");
        let store = CollectStore::open(&path, &CollectConfig::default()).unwrap();

        for i in 0..200 {
            store.add(&format!("full:host{i}.test"));
        }
        store.delete("full:host0.test");
        store.shutdown();

        let on_disk = file_entries(&path);
        assert_eq!(on_disk.len(), 199);
        assert!(!on_disk.contains(&"full:host0.test".to_string()));
        assert!(store.is_closed());
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn test_writes_after_shutdown_stay_in_memory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("late.txt");
        let store = CollectStore::open(&path, &CollectConfig::default()).unwrap();
        store.shutdown();

        assert!(store.add("full:late.com"));
        assert!(store.contains("full:late.com"));
        assert!(file_entries(&path).is_empty());
    }

    #[test]
    fn test_tiny_queue_keeps_order_through_retries() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tiny.txt");
        let config = CollectConfig {
            queue_capacity: 1,
            add_retry: RetryPolicy {
                attempts: 50,
                backoff_ms: 20,
            },
            delete_retry: RetryPolicy {
                attempts: 50,
                backoff_ms: 20,
            },
        };
        let store = CollectStore::open(&path, &config).unwrap();

        store.add("full:a.com");
        store.add("full:b.com");
        store.delete("full:a.com");
        store.add("full:c.com");
        store.shutdown();

        assert_eq!(file_entries(&path), vec!["full:b.com", "full:c.com"]);
    }

    #[test]
    fn test_backlog_outgrows_queue_without_dropping() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("burst.txt");
        let config = CollectConfig {
            queue_capacity: 1,
            add_retry: RetryPolicy {
                attempts: 20,
                backoff_ms: 20,
            },
            delete_retry: RetryPolicy {
                attempts: 40,
                backoff_ms: 20,
            },
        };
        let store = CollectStore::open(&path, &config).unwrap();

        // Far more ops than the queue holds; most of them wait in the backlog.
        for i in 0..120 {
            store.add(&format!("full:host{i}.test"));
            if i % 3 == 0 {
                store.delete(&format!("full:host{i}.test"));
            }
        }
        store.shutdown();

        assert_eq!(store.pending(), 0);
        assert_eq!(store.len(), 80);
        assert_eq!(file_entries(&path), store.entries());
    }

    #[test]
    fn test_entries_must_be_single_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lines.txt");
        let store = CollectStore::open(&path, &CollectConfig::default()).unwrap();

        assert!(!store.add("a\nb"));
        assert!(!store.add("a\rb"));
        assert!(!store.add(""));
        assert!(!store.add("   "));
        assert!(store.add("  full:padded.com  "));
        assert!(!store.add("full:padded.com"));
        assert!(store.contains("full:padded.com"));
        assert_eq!(store.len(), 1);
        assert!(!store.delete(""));

        store.shutdown();
        let reopened = CollectStore::open(&path, &CollectConfig::default()).unwrap();
        assert_eq!(reopened.entries(), store.entries());
    }

    #[test]
    fn test_rewrite_replaces_file_atomically() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("r.txt");
        fs::write(&path, "old\n").unwrap();

        rewrite_file(&path, &["one".to_string(), "two".to_string()]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
        let leftovers = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
