//! Errors raised while compiling rule sets.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Expression #{index} ({expression}): {source}")]
    Expression {
        index: usize,
        expression: String,
        source: Box<RuleError>,
    },

    #[error("File #{index} ({path}): {source}")]
    File {
        index: usize,
        path: PathBuf,
        source: Box<RuleError>,
    },

    #[error("Line {line}: {source}")]
    Line { line: usize, source: Box<RuleError> },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}
