//! Shared data models for tasks, diagnostics, and run reports.

use crate::classify::Category;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
/// What a run does to each file.
pub enum Operation {
    Check,
    Fix,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Check => "check",
            Operation::Fix => "fix",
        }
    }
}

#[derive(Debug, Clone)]
/// One file scheduled for processing. Created during the walk and consumed
/// exactly once by a worker.
pub struct FileTask {
    /// Path used for I/O and subprocess arguments.
    pub path: PathBuf,
    /// Root-relative path with a leading `./`, used by every rule.
    pub rel_path: String,
    pub category: Category,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A single reported problem. `line` is 1-based; `None` marks whole-file errors.
pub struct Diagnostic {
    pub file: String,
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn at(file: &str, line: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            file: file.to_string(),
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn whole_file(file: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            file: file.to_string(),
            line: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(n) => write!(f, "{}:{}: {}", self.file, n, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
/// Diagnostics for one file, in order of first detection. Empty means clean.
pub struct FileResult {
    pub file: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileResult {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[derive(Debug, Default, Serialize)]
/// Aggregate of every file result produced by a run.
pub struct RunReport {
    pub results: Vec<FileResult>,
    pub files: usize,
}

impl RunReport {
    pub fn push(&mut self, result: FileResult) {
        self.files += 1;
        self.results.push(result);
    }

    pub fn has_diagnostics(&self) -> bool {
        self.results.iter().any(|r| !r.is_clean())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileResult> {
        self.results.iter().filter(|r| !r.is_clean())
    }

    pub fn diagnostic_count(&self) -> usize {
        self.results.iter().map(|r| r.diagnostics.len()).sum()
    }
}
