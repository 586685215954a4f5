//! Traffic-driven entry collection.
//!
//! A [`CollectStore`] keeps the authoritative entry set in memory and
//! mirrors it to a backing file from a single writer thread. Stores are
//! shared per canonical path through a [`CollectRegistry`]; plugins hold
//! [`CollectHandle`]s and the last one released shuts the store down after
//! draining its queue.
//!
//! # Architecture
//!
//! ```text
//! add/delete ──(cache lock)──> bounded queue ──> writer thread ──> append / tmp+rename
//!                  │ full, or backlog non-empty
//!                  └──> backlog (in State) ──> retry thread ──(send_timeout × attempts)──┘
//! ```

mod action;
mod registry;
mod store;

use std::path::PathBuf;
use thiserror::Error;

pub use action::{CollectAction, EntryFormat, Operation};
pub use registry::{CollectHandle, CollectRegistry};
pub use store::CollectStore;

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Failed to load collect file {path}: {source}")]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid collect path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Failed to start collect worker: {reason}")]
    Spawn { reason: String },
}
