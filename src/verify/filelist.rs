//! Parser for the expected file list.
//!
//! ```text
//! # comment
//! AUTHORS
//! include/ppapi/c/*.h
//! [linux,mac]tools/dump_syms
//! [glibc]toolchain/${PLATFORM}_x86_glibc/**
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::error::{BundleError, IoContext, Result};

use super::predicate::Predicate;

/// One line of the expected file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFileEntry {
    pub pattern: String,
    pub condition: Predicate,
    pub line: usize,
}

/// Parsed expected file list together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFileList {
    pub source: PathBuf,
    pub entries: Vec<ExpectedFileEntry>,
}

impl ExpectedFileList {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).io_context("reading expected file list", path)?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, source: &Path) -> Result<Self> {
        let mut entries = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let err = |message: String| BundleError::FileList {
                path: source.to_path_buf(),
                line,
                message,
            };

            let (condition, pattern) = match trimmed.strip_prefix('[') {
                Some(rest) => {
                    let (cond, pattern) = rest
                        .split_once(']')
                        .ok_or_else(|| err("unterminated '[' condition".to_string()))?;
                    (Predicate::parse(cond).map_err(err)?, pattern.trim())
                }
                None => (Predicate::always(), trimmed),
            };

            let pattern = pattern.replace('\\', "/");
            if pattern.is_empty() {
                return Err(err("missing path after condition".to_string()));
            }
            if pattern.starts_with('/') || pattern.split('/').any(|part| part == "..") {
                return Err(err(format!("path '{pattern}' must be relative")));
            }

            entries.push(ExpectedFileEntry {
                pattern,
                condition,
                line,
            });
        }

        Ok(Self {
            source: source.to_path_buf(),
            entries,
        })
    }

    /// Patterns whose condition holds for `config`, with variables expanded.
    pub fn active_patterns(&self, config: &BuildConfig) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.condition.eval(config))
            .map(|entry| config.expand(&entry.pattern))
            .collect()
    }
}
