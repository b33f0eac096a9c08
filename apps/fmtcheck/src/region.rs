//! Region-aware line transformation.
//!
//! Maps a per-line function across a file while tracking
//! `// clang-format off` / `// clang-format on` regions. Lines inside a
//! disabled region pass through untouched and the function is not called for
//! them. Malformed markers produce at most one diagnostic per file: the first
//! one seen, or "remains off" when the file ends inside a disabled region.

use crate::error::{Error, Result};
use crate::models::Diagnostic;
use std::fs;
use std::path::Path;

pub const FORMAT_OFF: &str = "// clang-format off";
pub const FORMAT_ON: &str = "// clang-format on";

#[derive(Debug)]
/// Region state for one file scan.
pub struct RegionState {
    pub enabled: bool,
    pub violation: Option<Diagnostic>,
}

impl Default for RegionState {
    fn default() -> Self {
        RegionState {
            enabled: true,
            violation: None,
        }
    }
}

impl RegionState {
    fn record(&mut self, file: &str, line: usize, message: &str) {
        if self.violation.is_none() {
            self.violation = Some(Diagnostic::at(file, line, message));
        }
    }

    /// Update the state for one line. Returns whether the line is in an
    /// enabled region after any marker on it has been applied.
    pub fn observe(&mut self, file: &str, line_number: usize, line: &str) -> bool {
        if line.contains(FORMAT_OFF) {
            if !self.enabled {
                self.record(file, line_number, "clang-format nested off");
            }
            self.enabled = false;
        }
        if line.contains(FORMAT_ON) {
            if self.enabled {
                self.record(file, line_number, "clang-format nested on");
            }
            self.enabled = true;
        }
        self.enabled
    }

    /// Close the scan after `last_line` lines.
    pub fn finish(mut self, file: &str, last_line: usize) -> Option<Diagnostic> {
        if !self.enabled {
            self.record(file, last_line, "clang-format remains off");
        }
        self.violation
    }
}

/// Output of a transform over one file's text.
pub struct Transformed {
    pub lines: Vec<String>,
    pub violation: Option<Diagnostic>,
}

impl Transformed {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Apply `line_fn(line, zero_based_index)` to every line of `text` that sits
/// in an enabled region. Lines are split on `\n` so that joining the output
/// reproduces unmodified input byte for byte.
pub fn transform_lines<F>(file: &str, text: &str, mut line_fn: F) -> Transformed
where
    F: FnMut(&str, usize) -> String,
{
    let mut state = RegionState::default();
    let mut lines = Vec::new();
    let mut count = 0;
    for (idx, line) in text.split('\n').enumerate() {
        count = idx + 1;
        if state.observe(file, idx + 1, line) {
            lines.push(line_fn(line, idx));
        } else {
            lines.push(line.to_string());
        }
    }
    Transformed {
        lines,
        violation: state.finish(file, count),
    }
}

pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Run `line_fn` over the file at `path`, optionally writing the result back.
///
/// With `write == false` the function is used only for its side effects
/// (typically collecting diagnostics) and the file is left untouched.
pub fn evaluate_lines<F>(path: &Path, file: &str, line_fn: F, write: bool) -> Result<Option<Diagnostic>>
where
    F: FnMut(&str, usize) -> String,
{
    let original = read_file(path)?;
    let out = transform_lines(file, &original, line_fn);
    if write {
        let text = out.text();
        if text != original {
            fs::write(path, text).map_err(|e| Error::io(path, e))?;
        } else {
            log::debug!("{}: unchanged, not rewritten", file);
        }
    }
    Ok(out.violation)
}
