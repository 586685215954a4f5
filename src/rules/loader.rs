//! Text loaders shared by every rule set.
//!
//! Backing files are UTF-8, one record per line. Lines are trimmed, blank
//! lines are skipped and `#` starts a comment.

use std::fs;
use std::path::{Path, PathBuf};

use super::RuleError;

/// Inline expressions plus backing files that compile into one local matcher.
#[derive(Debug, Clone, Default)]
pub struct RuleSource {
    pub expressions: Vec<String>,
    pub files: Vec<PathBuf>,
}

impl RuleSource {
    pub fn new(expressions: Vec<String>, files: Vec<PathBuf>) -> Self {
        Self { expressions, files }
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty() && self.files.is_empty()
    }

    /// Feed every expression, then every file line, to `add`.
    ///
    /// Errors are tagged with the expression or file index and line number.
    pub fn load_into<F>(&self, mut add: F) -> Result<(), RuleError>
    where
        F: FnMut(&str) -> Result<(), RuleError>,
    {
        for (index, expression) in self.expressions.iter().enumerate() {
            add(expression.as_str()).map_err(|e| RuleError::Expression {
                index,
                expression: expression.clone(),
                source: Box::new(e),
            })?;
        }

        for (index, path) in self.files.iter().enumerate() {
            load_file(path, &mut add).map_err(|e| RuleError::File {
                index,
                path: path.clone(),
                source: Box::new(e),
            })?;
        }

        Ok(())
    }
}

/// Strip comments and whitespace; `None` for lines that carry no record.
pub fn record(line: &str) -> Option<&str> {
    let line = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let line = line.trim();
    (!line.is_empty()).then_some(line)
}

/// Apply `add` to every record in the file at `path`.
pub fn load_file<F>(path: &Path, add: &mut F) -> Result<(), RuleError>
where
    F: FnMut(&str) -> Result<(), RuleError>,
{
    let content = fs::read_to_string(path).map_err(|source| RuleError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    for (idx, line) in content.lines().enumerate() {
        if let Some(rec) = record(line) {
            add(rec).map_err(|e| RuleError::Line {
                line: idx + 1,
                source: Box::new(e),
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_trims_and_strips_comments() {
        assert_eq!(record("  full:a.com  "), Some("full:a.com"));
        assert_eq!(record("domain:b.com # ads"), Some("domain:b.com"));
        assert_eq!(record("   "), None);
        assert_eq!(record("# whole line"), None);
    }

    #[test]
    fn test_load_into_visits_expressions_then_files() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("rules.txt");
        fs::write(&file, "\nfull:b.com\n\n  full:c.com\r\n").unwrap();

        let source = RuleSource::new(vec!["full:a.com".to_string()], vec![file]);
        let mut seen = Vec::new();
        source
            .load_into(|r| {
                seen.push(r.to_string());
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec!["full:a.com", "full:b.com", "full:c.com"]);
    }

    #[test]
    fn test_errors_identify_file_and_line() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("rules.txt");
        fs::write(&file, "ok\nbad\n").unwrap();

        let source = RuleSource::new(vec![], vec![file]);
        let err = source
            .load_into(|r| {
                if r == "bad" {
                    Err(RuleError::InvalidRule {
                        rule: r.to_string(),
                        reason: "nope".to_string(),
                    })
                } else {
                    Ok(())
                }
            })
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.starts_with("File #0"), "{msg}");
        assert!(msg.contains("Line 2"), "{msg}");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let source = RuleSource::new(vec![], vec![PathBuf::from("/nonexistent/rules.txt")]);
        let err = source.load_into(|_| Ok(())).unwrap_err();
        assert!(matches!(err, RuleError::File { index: 0, .. }));
    }
}
