//! External formatter and linter invocations.
//!
//! A `ToolCommand` is a program plus arguments, optionally piped into
//! `diff <file> -` so the tool's canonical output is compared against the
//! file on disk. No shell is involved. Diff range lines (`7a8,9`,
//! `26,27c26`, ...) are turned into per-line diagnostics.

use crate::error::Result;
use crate::models::Diagnostic;
use regex::Regex;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;

const DIFF_PROGRAM: &str = "diff";

#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// When set, stdout of `program` is compared with this file via `diff`.
    pub diff_against: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ToolCommand {
            program: program.into(),
            args: Vec::new(),
            diff_against: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        let s = path.to_string_lossy().to_string();
        self.arg(s)
    }

    pub fn diff_with(mut self, file: &Path) -> Self {
        self.diff_against = Some(file.to_path_buf());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            write!(f, " {}", a)?;
        }
        if let Some(file) = &self.diff_against {
            write!(f, " | {} {} -", DIFF_PROGRAM, file.display())?;
        }
        Ok(())
    }
}

#[derive(Debug)]
/// Exit status and merged stdout/stderr text of a finished command.
pub struct ToolOutput {
    pub code: Option<i32>,
    pub text: String,
}

fn merged_text(out: &Output) -> String {
    let mut text = String::from_utf8_lossy(&out.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&out.stderr));
    text
}

/// Run `cmd`, feeding the producer's stdout into `diff` when requested.
///
/// A producer that fails in a piped command is reported as `code: None` so
/// callers treat it as an execution fault rather than a diff.
pub fn execute(cmd: &ToolCommand) -> std::io::Result<ToolOutput> {
    let produced = cmd.command().stdin(Stdio::null()).output()?;
    let Some(file) = &cmd.diff_against else {
        return Ok(ToolOutput {
            code: produced.status.code(),
            text: merged_text(&produced),
        });
    };
    if !produced.status.success() {
        log::debug!("{} exited with {:?}", cmd.program.display(), produced.status.code());
        return Ok(ToolOutput {
            code: None,
            text: merged_text(&produced),
        });
    }

    let mut child = Command::new(DIFF_PROGRAM)
        .arg(file)
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdin = child.stdin.take();
    let input = produced.stdout;
    let writer = thread::spawn(move || -> std::io::Result<()> {
        if let Some(mut stdin) = stdin {
            stdin.write_all(&input)?;
        }
        Ok(())
    });
    let out = child.wait_with_output()?;
    match writer.join() {
        Ok(res) => res?,
        Err(_) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "diff input writer panicked",
            ))
        }
    }
    Ok(ToolOutput {
        code: out.status.code(),
        text: merged_text(&out),
    })
}

const DIFF_RANGE: &str = r"^(\d+)(?:,(\d+))?(?:[acd](\d+)(?:,(\d+))?)?$";

/// Turns finished checking commands into diagnostics, reading diff range
/// lines (`7a8,9`, `26,27c26`, ...) for line numbers.
pub struct DiffReader {
    range: Regex,
}

impl DiffReader {
    pub fn new() -> Result<Self> {
        Ok(DiffReader {
            range: Regex::new(DIFF_RANGE)?,
        })
    }

    /// Line numbers on the original-file side of a diff range line.
    ///
    /// `7a8,9` yields `[7]`; `26,27c26` yields `[26, 27]`; content lines such
    /// as `< foo` yield nothing.
    pub fn line_numbers(&self, line: &str) -> Vec<usize> {
        let Some(caps) = self.range.captures(line.trim_end()) else {
            return Vec::new();
        };
        [caps.get(1), caps.get(2)]
            .into_iter()
            .flatten()
            .filter_map(|m| m.as_str().parse().ok())
            .collect()
    }

    /// Translate a finished command into diagnostics for `file`.
    ///
    /// Exit 0 passes any output through as whole-file messages; exit 1 is a
    /// content diff; anything else is an execution fault.
    pub fn diagnostics(&self, cmd: &ToolCommand, out: &ToolOutput, label: &str, file: &str) -> Vec<Diagnostic> {
        match out.code {
            Some(0) => out
                .text
                .trim()
                .lines()
                .filter(|l| !l.is_empty())
                .map(|l| Diagnostic::whole_file(file, l))
                .collect(),
            Some(1) => {
                // The header is recorded even when no line numbers can be recovered.
                let mut diags = vec![Diagnostic::whole_file(file, format!("{} for file: {}", label, file))];
                for line in out.text.lines() {
                    for n in self.line_numbers(line) {
                        diags.push(Diagnostic::at(file, n, label));
                    }
                }
                diags
            }
            _ => vec![execution_fault(cmd, file)],
        }
    }

    /// Run a checking command and return its diagnostics.
    pub fn run_and_diff(&self, cmd: &ToolCommand, label: &str, file: &str) -> Vec<Diagnostic> {
        match execute(cmd) {
            Ok(out) => self.diagnostics(cmd, &out, label, file),
            Err(e) => {
                log::debug!("failed to run {}: {}", cmd, e);
                vec![execution_fault(cmd, file)]
            }
        }
    }
}

fn execution_fault(cmd: &ToolCommand, file: &str) -> Diagnostic {
    Diagnostic::whole_file(file, format!("something went wrong while executing: {}", cmd))
}

/// Run a rewriting command; any failure is a single whole-file diagnostic.
pub fn run_rewrite(cmd: &ToolCommand, failure: &str, file: &str) -> Option<Diagnostic> {
    match execute(cmd) {
        Ok(out) if out.code == Some(0) => None,
        Ok(out) => {
            log::debug!("{} exited with {:?}: {}", cmd, out.code, out.text.trim());
            Some(Diagnostic::whole_file(file, failure))
        }
        Err(e) => {
            log::debug!("failed to run {}: {}", cmd, e);
            Some(Diagnostic::whole_file(file, failure))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> DiffReader {
        DiffReader::new().unwrap()
    }

    fn out(code: Option<i32>, text: &str) -> ToolOutput {
        ToolOutput {
            code,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_bad_range_pattern_is_a_regex_error() {
        assert!(DiffReader::new().is_ok());
        let err: crate::error::Error = Regex::new("(").unwrap_err().into();
        assert!(matches!(err, crate::error::Error::Regex(_)));
    }

    #[test]
    fn test_diff_line_numbers() {
        let r = reader();
        assert_eq!(r.line_numbers("7a8,9"), vec![7]);
        assert_eq!(r.line_numbers("26,27c26"), vec![26, 27]);
        assert_eq!(r.line_numbers("12,13d13"), vec![12, 13]);
        assert_eq!(r.line_numbers("5"), vec![5]);
        assert!(r.line_numbers("< int a;").is_empty());
        assert!(r.line_numbers("---").is_empty());
        assert!(r.line_numbers("").is_empty());
    }

    #[test]
    fn test_exit_one_yields_header_and_lines() {
        let cmd = ToolCommand::new("clang-format").arg("./a.cc").diff_with(Path::new("./a.cc"));
        let diags = reader().diagnostics(
            &cmd,
            &out(Some(1), "26,27c26\n< a\n< b\n---\n> ab\n7a8,9\n> x\n> y\n"),
            "clang-format check failed",
            "./a.cc",
        );
        let lines: Vec<_> = diags.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![None, Some(26), Some(27), Some(7)]);
        assert_eq!(diags[0].message, "clang-format check failed for file: ./a.cc");
    }

    #[test]
    fn test_exit_one_without_ranges_still_fails() {
        let cmd = ToolCommand::new("buildifier");
        let diags = reader().diagnostics(&cmd, &out(Some(1), ""), "buildifier check failed", "./BUILD");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "buildifier check failed for file: ./BUILD");
    }

    #[test]
    fn test_other_exit_codes_are_execution_faults() {
        let cmd = ToolCommand::new("clang-format").arg("./a.cc").diff_with(Path::new("./a.cc"));
        for code in [Some(2), Some(127), None] {
            let diags = reader().diagnostics(&cmd, &out(code, "1c1"), "x", "./a.cc");
            assert_eq!(diags.len(), 1);
            assert_eq!(
                diags[0].message,
                "something went wrong while executing: clang-format ./a.cc | diff ./a.cc -"
            );
        }
    }

    #[test]
    fn test_exit_zero_passes_output_through() {
        let cmd = ToolCommand::new("buildifier");
        assert!(reader().diagnostics(&cmd, &out(Some(0), "\n"), "x", "./BUILD").is_empty());
        let diags = reader().diagnostics(&cmd, &out(Some(0), "warning one\nwarning two\n"), "x", "./BUILD");
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[1].message, "warning two");
    }

    #[test]
    fn test_missing_program_is_execution_fault() {
        let cmd = ToolCommand::new("/nonexistent/fmtcheck-tool-xyz").arg("a.cc");
        let diags = reader().run_and_diff(&cmd, "x", "./a.cc");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.starts_with("something went wrong while executing"));
        assert_eq!(
            run_rewrite(&cmd, "rewrite failed", "./a.cc").map(|d| d.message),
            Some("rewrite failed".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_piped_diff_against_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.cc");
        std::fs::write(&file, "one\ntwo\nthree\n").unwrap();
        let same = ToolCommand::new("cat").path_arg(&file).diff_with(&file);
        assert!(reader().run_and_diff(&same, "cat check failed", "./a.cc").is_empty());

        let other = dir.path().join("b.cc");
        std::fs::write(&other, "one\nTWO\nthree\n").unwrap();
        let changed = ToolCommand::new("cat").path_arg(&other).diff_with(&file);
        let diags = reader().run_and_diff(&changed, "cat check failed", "./a.cc");
        assert_eq!(diags[0].line, None);
        assert_eq!(diags[1].line, Some(2));
    }
}
