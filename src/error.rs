//! Crate-level error type.
//!
//! Each subsystem keeps its own error enum; this type folds them together
//! for callers that build whole plugin graphs (see [`crate::host`]).

use thiserror::Error;

use crate::collect::CollectError;
use crate::provider::ProviderError;
use crate::rules::RuleError;
use crate::watcher::WatchError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error("Invalid configuration for '{tag}': {reason}")]
    Config { tag: String, reason: String },

    #[error("Failed to load whitelist {path}: {reason}")]
    Whitelist {
        path: std::path::PathBuf,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
