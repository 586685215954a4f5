//! Process-wide, refcounted lookup of collect stores by canonical path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{CollectError, CollectStore};
use crate::config::CollectConfig;
use crate::log_event;
use crate::watcher::canonical_path;

struct Entry {
    store: Arc<CollectStore>,
    refs: usize,
}

/// Owns every [`CollectStore`]; at most one per canonical path.
///
/// Lookup, refcounting and teardown all happen under one lock, so a path is
/// never served by two stores, even while the previous one is draining.
pub struct CollectRegistry {
    config: CollectConfig,
    stores: Mutex<HashMap<PathBuf, Entry>>,
}

impl CollectRegistry {
    pub fn new(config: CollectConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// Return a handle to the store for `path`, creating and loading it on first use.
    pub fn get_or_create(self: &Arc<Self>, path: &Path) -> Result<CollectHandle, CollectError> {
        let canonical = canonical_path(path).map_err(|e| CollectError::InvalidPath {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut stores = self.stores.lock();
        let store = match stores.get_mut(&canonical) {
            Some(entry) => {
                entry.refs += 1;
                Arc::clone(&entry.store)
            }
            None => {
                let store = Arc::new(CollectStore::open(canonical.clone(), &self.config)?);
                stores.insert(
                    canonical.clone(),
                    Entry {
                        store: Arc::clone(&store),
                        refs: 1,
                    },
                );
                log_event!("collect", "opened", "{}", canonical.display());
                store
            }
        };

        Ok(CollectHandle {
            registry: Arc::clone(self),
            store,
            released: AtomicBool::new(false),
        })
    }

    /// Active handles for `path`, zero when no store is open.
    pub fn ref_count(&self, path: &Path) -> usize {
        let Ok(canonical) = canonical_path(path) else {
            return 0;
        };
        self.stores.lock().get(&canonical).map_or(0, |e| e.refs)
    }

    /// Number of open stores.
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }

    fn release(&self, path: &Path) {
        let mut stores = self.stores.lock();
        let Some(entry) = stores.get_mut(path) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            if let Some(entry) = stores.remove(path) {
                entry.store.shutdown();
            }
        }
    }
}

impl std::fmt::Debug for CollectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectRegistry")
            .field("stores", &self.len())
            .finish()
    }
}

/// One reference to a shared store. Released on [`close`](Self::close) or drop.
pub struct CollectHandle {
    registry: Arc<CollectRegistry>,
    store: Arc<CollectStore>,
    released: AtomicBool,
}

impl CollectHandle {
    pub fn store(&self) -> &Arc<CollectStore> {
        &self.store
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn add(&self, entry: &str) -> bool {
        self.store.add(entry)
    }

    pub fn delete(&self, entry: &str) -> bool {
        self.store.delete(entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.store.contains(entry)
    }

    /// Drop this reference; the last one shuts the store down after draining.
    pub fn close(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.registry.release(self.store.path());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for CollectHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CollectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectHandle")
            .field("path", &self.path())
            .field("closed", &self.is_closed())
            .finish()
    }
}
