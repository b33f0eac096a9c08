//! Output rendering for check and fix runs.
//!
//! Supports `human` (default) and `json` outputs. The human form prints a
//! `From PATH` header per failing file followed by indented entries, then a
//! final status line. The JSON form carries the failing files and a summary.

use crate::models::{Operation, RunReport};
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

pub fn error_prefix() -> String {
    if use_colors("human") {
        "error:".red().bold().to_string()
    } else {
        "error:".to_string()
    }
}

pub fn note_prefix() -> String {
    if use_colors("human") {
        "note:".cyan().bold().to_string()
    } else {
        "note:".to_string()
    }
}

/// Render the human report as plain or colored text.
pub fn render_human(report: &RunReport, operation: Operation, color: bool) -> String {
    let mut out = String::new();
    for r in report.failed() {
        if color {
            out.push_str(&format!("{} {}\n", "From".bold(), r.file.bold()));
        } else {
            out.push_str(&format!("From {}\n", r.file));
        }
        for d in &r.diagnostics {
            out.push_str(&format!("  {}\n", d));
        }
    }
    if report.has_diagnostics() {
        let line = "ERROR: check format failed. run 'fmtcheck fix'";
        if color {
            out.push_str(&format!("{}\n", line.red().bold()));
        } else {
            out.push_str(line);
            out.push('\n');
        }
    } else if operation == Operation::Check {
        if color {
            out.push_str(&format!("{}\n", "PASS".green().bold()));
        } else {
            out.push_str("PASS\n");
        }
    }
    out
}

/// Compose report JSON object (pure) for testing/snapshot purposes.
pub fn compose_report_json(report: &RunReport, operation: Operation) -> JsonVal {
    let items: Vec<_> = report
        .failed()
        .map(|r| json!({"file": r.file, "diagnostics": r.diagnostics}))
        .collect();
    let summary = json!({
        "operation": operation.as_str(),
        "files": report.files,
        "failed": report.failed().count(),
        "diagnostics": report.diagnostic_count(),
        "passed": !report.has_diagnostics(),
    });
    json!({"results": items, "summary": summary})
}

/// Print the run report in the requested format.
pub fn print_report(report: &RunReport, operation: Operation, output: &str) {
    match output {
        "json" => println!("{:#}", compose_report_json(report, operation)),
        _ => print!("{}", render_human(report, operation, use_colors(output))),
    }
}

/// Print pre-check failures, one `ERROR:` line per message.
pub fn print_pre_check_errors(messages: &[String]) {
    for m in messages {
        if use_colors("human") {
            println!("{} {}", "ERROR:".red().bold(), m);
        } else {
            println!("ERROR: {}", m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Diagnostic, FileResult};

    fn report() -> RunReport {
        let mut r = RunReport::default();
        r.push(FileResult {
            file: "./source/a.cc".into(),
            diagnostics: vec![],
        });
        r.push(FileResult {
            file: "./source/b.cc".into(),
            diagnostics: vec![
                Diagnostic::at("./source/b.cc", 3, "over-enthusiastic spaces"),
                Diagnostic::whole_file("./source/b.cc", "clang-format check failed for file: ./source/b.cc"),
            ],
        });
        r
    }

    #[test]
    fn test_render_human_failure() {
        let text = render_human(&report(), Operation::Check, false);
        assert_eq!(
            text,
            "From ./source/b.cc\n  ./source/b.cc:3: over-enthusiastic spaces\n  \
             clang-format check failed for file: ./source/b.cc\n\
             ERROR: check format failed. run 'fmtcheck fix'\n"
        );
    }

    #[test]
    fn test_render_human_pass_only_for_check() {
        let mut clean = RunReport::default();
        clean.push(FileResult {
            file: "./a.cc".into(),
            diagnostics: vec![],
        });
        assert_eq!(render_human(&clean, Operation::Check, false), "PASS\n");
        assert_eq!(render_human(&clean, Operation::Fix, false), "");
    }

    #[test]
    fn test_compose_report_json_shape() {
        let out = compose_report_json(&report(), Operation::Fix);
        assert_eq!(out["summary"]["files"], 2);
        assert_eq!(out["summary"]["failed"], 1);
        assert_eq!(out["summary"]["diagnostics"], 2);
        assert_eq!(out["summary"]["passed"], false);
        assert_eq!(out["summary"]["operation"], "fix");
        assert_eq!(out["results"][0]["file"], "./source/b.cc");
        assert_eq!(out["results"][0]["diagnostics"][0]["line"], 3);
        assert!(out["results"][0]["diagnostics"][1]["line"].is_null());
    }
}
