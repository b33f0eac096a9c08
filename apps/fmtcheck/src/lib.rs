//! fmtcheck core library.
//!
//! This crate exposes programmatic APIs for checking and fixing the format of
//! C++, proto and Bazel files in a source tree.
//!
//! High-level modules:
//! - `cli`: CLI argument parsing (binary uses this).
//! - `config`: Discovery and effective configuration resolution.
//! - `classify`: File categories and path exclusion.
//! - `region`: `// clang-format off|on` aware line transformation.
//! - `rules`: Line rules, replacement tables and file-scope checks.
//! - `tools`: External formatter invocation and diff parsing.
//! - `precheck`: Tool availability checks run before any work.
//! - `checker`: Per-file fix and check flows.
//! - `pipeline`: Tree walk and two-phase parallel execution.
//! - `models`: Tasks, diagnostics and run reports.
//! - `output`: Human/JSON printers.
pub mod checker;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod precheck;
pub mod region;
pub mod rules;
pub mod tools;
