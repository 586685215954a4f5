//! File watching for hot-reloadable rule files.
//!
//! A [`ReloadWatcher`] registers the parent directories of a fixed set of
//! canonical file paths with a single `notify` watcher, filters events down
//! to that set, debounces them per path and runs a reload callback once the
//! file has settled.
//!
//! # Architecture
//!
//! ```text
//! notify thread ──mpsc──> EventLoop (tokio task)
//!                           - WatchedPathSet filter
//!                           - Debouncer (per-path settle timers)
//!                           - spawn_blocking(on_reload)
//! ```

mod debouncer;
mod error;
mod paths;
mod reload;

pub use debouncer::Debouncer;
pub use error::WatchError;
pub use paths::{WatchedPathSet, canonical_path};
pub use reload::{ReloadFn, ReloadWatcher, ReloadWatcherBuilder};
