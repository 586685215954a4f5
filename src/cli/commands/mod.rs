//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod init;
pub mod query;
pub mod watch;
