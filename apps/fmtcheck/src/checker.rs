//! Per-file fix and check flows.
//!
//! `FormatChecker` is the default `FileProcessor`: build-like files go
//! through the build fixer and buildifier, everything else through the line
//! rules, the header order tool and clang-format. A fix pass, when requested,
//! always runs before the check pass on the same file.

use crate::classify::{is_proto_file, is_starlark_file, is_workspace_file};
use crate::config::{Effective, ToolPaths};
use crate::error::Result;
use crate::models::{Diagnostic, FileTask, Operation};
use crate::pipeline::FileProcessor;
use crate::region::{evaluate_lines, read_file};
use crate::rules::RuleSet;
use crate::tools::{run_rewrite, DiffReader, ToolCommand};
use std::path::Path;

pub struct FormatChecker {
    rules: RuleSet,
    diff: DiffReader,
    tools: ToolPaths,
    include_order: String,
}

impl FormatChecker {
    pub fn new(rules: RuleSet, tools: ToolPaths, include_order: &[String]) -> Result<Self> {
        Ok(FormatChecker {
            rules,
            diff: DiffReader::new()?,
            tools,
            include_order: include_order.join(","),
        })
    }

    pub fn from_effective(eff: &Effective) -> Result<Self> {
        let rules = RuleSet::new(&eff.api_prefix, &eff.namespace, &eff.include_order)?;
        Self::new(rules, eff.tools.clone(), &eff.include_order)
    }

    /// Collect per-line diagnostics from `check` over enabled regions, then the
    /// region violation, if any.
    fn check_file_contents<F>(&self, task: &FileTask, mut check: F) -> Result<Vec<Diagnostic>>
    where
        F: FnMut(&str, &mut dyn FnMut(String)),
    {
        let file = task.rel_path.as_str();
        let mut diags = Vec::new();
        let violation = evaluate_lines(
            &task.path,
            file,
            |line, idx| {
                check(line, &mut |msg| diags.push(Diagnostic::at(file, idx + 1, msg)));
                line.to_string()
            },
            false,
        )?;
        diags.extend(violation);
        Ok(diags)
    }

    fn check_api_proto_package(&self, task: &FileTask) -> Result<Option<Diagnostic>> {
        let file = task.rel_path.as_str();
        if !(is_proto_file(file) && self.rules.is_api_file(file)) {
            return Ok(None);
        }
        let text = read_file(&task.path)?;
        if self.rules.package_name_for_proto(&text).is_some() {
            return Ok(None);
        }
        Ok(Some(Diagnostic::whole_file(
            file,
            format!("Unable to find package name for proto file: {}", file),
        )))
    }

    fn fix_build_path(&self, task: &FileTask) -> Vec<Diagnostic> {
        let file = task.rel_path.as_str();
        let mut diags = Vec::new();
        if !self.rules.is_api_file(file) && !is_starlark_file(file) && !is_workspace_file(file) {
            let cmd = ToolCommand::new(&self.tools.build_fixer)
                .path_arg(&task.path)
                .path_arg(&task.path);
            diags.extend(run_rewrite(
                &cmd,
                &format!("envoy_build_fixer rewrite failed for file: {}", file),
                file,
            ));
        }
        let cmd = ToolCommand::new(&self.tools.buildifier)
            .arg("-lint=fix")
            .arg("-mode=fix")
            .path_arg(&task.path);
        diags.extend(run_rewrite(
            &cmd,
            &format!("buildifier rewrite failed for file: {}", file),
            file,
        ));
        diags
    }

    fn check_build_path(&self, task: &FileTask) -> Result<Vec<Diagnostic>> {
        let file = task.rel_path.as_str();
        let mut diags = Vec::new();
        if self.rules.requires_api_proto_package(file) {
            let text = read_file(&task.path)?;
            if !text.lines().any(|l| l.contains("api_proto_package(")) {
                diags.push(Diagnostic::whole_file(
                    file,
                    "API build file does not provide api_proto_package()",
                ));
            }
        }
        let cmd = ToolCommand::new(&self.tools.buildifier)
            .arg("-mode=diff")
            .path_arg(&task.path);
        diags.extend(self.diff.run_and_diff(&cmd, "buildifier check failed", file));
        diags.extend(self.check_file_contents(task, |line, report| {
            self.rules.check_build_line(line, file, report)
        })?);
        Ok(diags)
    }

    fn header_order(&self, path: &Path) -> ToolCommand {
        ToolCommand::new(&self.tools.header_order)
            .arg("--include_dir_order")
            .arg(&self.include_order)
            .arg("--path")
            .path_arg(path)
    }

    fn fix_source_path(&self, task: &FileTask) -> Result<Vec<Diagnostic>> {
        let file = task.rel_path.as_str();
        // Region violations surface again in the check pass.
        evaluate_lines(&task.path, file, |line, _| self.rules.fix_source_line(line), true)?;

        let mut diags = Vec::new();
        if !is_proto_file(file) {
            let cmd = ToolCommand::new(&self.tools.header_order)
                .arg("--rewrite")
                .arg("--include_dir_order")
                .arg(&self.include_order)
                .arg("--path")
                .path_arg(&task.path);
            diags.extend(run_rewrite(
                &cmd,
                &format!("header_order.py rewrite error: {}", file),
                file,
            ));
        }
        let cmd = ToolCommand::new(&self.tools.clang_format)
            .arg("-i")
            .path_arg(&task.path);
        diags.extend(run_rewrite(
            &cmd,
            &format!("clang-format rewrite error: {}", file),
            file,
        ));
        diags.extend(self.check_api_proto_package(task)?);
        Ok(diags)
    }

    fn check_source_path(&self, task: &FileTask) -> Result<Vec<Diagnostic>> {
        let file = task.rel_path.as_str();
        let mut diags = self.check_file_contents(task, |line, report| {
            self.rules.check_source_line(line, file, report)
        })?;

        if !is_proto_file(file) {
            let text = read_file(&task.path)?;
            if let Some(msg) = self.rules.check_namespace(file, &text) {
                diags.push(Diagnostic::whole_file(file, msg));
            }
            let cmd = self.header_order(&task.path).diff_with(&task.path);
            diags.extend(self.diff.run_and_diff(&cmd, "header_order.py check failed", file));
        }
        let cmd = ToolCommand::new(&self.tools.clang_format)
            .path_arg(&task.path)
            .diff_with(&task.path);
        diags.extend(self.diff.run_and_diff(&cmd, "clang-format check failed", file));
        diags.extend(self.check_api_proto_package(task)?);
        Ok(diags)
    }
}

impl FileProcessor for FormatChecker {
    fn process(&self, task: &FileTask) -> Result<Vec<Diagnostic>> {
        let fix = task.operation == Operation::Fix;
        let mut diags = Vec::new();
        if task.category.is_build_like() {
            if fix {
                diags.extend(self.fix_build_path(task));
            }
            diags.extend(self.check_build_path(task)?);
        } else {
            if fix {
                diags.extend(self.fix_source_path(task)?);
            }
            diags.extend(self.check_source_path(task)?);
        }
        Ok(diags)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::classify::{classify, Category};
    use crate::rules::DEFAULT_INCLUDE_DIR_ORDER;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    /// A repo with pass-through fake tools: the formatters echo the file back
    /// unchanged and the rewriters succeed without touching it.
    fn setup() -> (TempDir, FormatChecker) {
        let dir = tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        let script = |name: &str, body: &str| -> PathBuf {
            let p = bin.join(name);
            fs::write(&p, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&p, fs::Permissions::from_mode(0o755)).unwrap();
            p
        };
        // clang-format: `-i FILE` succeeds, `FILE` prints it.
        let clang = script("clang-format", "[ \"$1\" = \"-i\" ] && exit 0\ncat \"$1\"");
        // header_order: the last argument is the path.
        let header = script(
            "header_order.py",
            "for a in \"$@\"; do last=\"$a\"; done\n[ \"$1\" = \"--rewrite\" ] && exit 0\ncat \"$last\"",
        );
        let buildifier = script("buildifier", "exit 0");
        let fixer = script("envoy_build_fixer.py", "exit 0");
        let tools = ToolPaths {
            clang_format: clang.to_string_lossy().to_string(),
            buildifier: buildifier.to_string_lossy().to_string(),
            buildozer: "buildozer".into(),
            header_order: header,
            build_fixer: fixer,
        };
        let dirs: Vec<String> = DEFAULT_INCLUDE_DIR_ORDER.iter().map(|s| s.to_string()).collect();
        let rules = RuleSet::new("./api/", "Proxy", &dirs).unwrap();
        (dir, FormatChecker::new(rules, tools, &dirs).unwrap())
    }

    fn task(root: &Path, rel: &str, body: &str, operation: Operation) -> FileTask {
        let path = root.join(rel.trim_start_matches("./"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        FileTask {
            path,
            rel_path: rel.to_string(),
            category: classify(rel),
            operation,
        }
    }

    #[test]
    fn test_clean_source_passes() {
        let (dir, checker) = setup();
        let t = task(
            dir.path(),
            "./source/common/a.cc",
            "namespace Proxy {\nint a = 1;\n} // namespace Proxy\n",
            Operation::Check,
        );
        assert!(checker.process(&t).unwrap().is_empty());
    }

    #[test]
    fn test_triple_space_after_period() {
        let (dir, checker) = setup();
        let body = "namespace Proxy {\n// Hello.   World\n}\n";
        let t = task(dir.path(), "./source/common/a.cc", body, Operation::Check);
        let diags = checker.process(&t).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, Some(2));

        let t = task(dir.path(), "./source/common/a.cc", body, Operation::Fix);
        assert!(checker.process(&t).unwrap().is_empty());
        assert_eq!(
            fs::read_to_string(&t.path).unwrap(),
            "namespace Proxy {\n// Hello. World\n}\n"
        );
    }

    #[test]
    fn test_second_fix_rewrites_nothing() {
        let (dir, checker) = setup();
        let body = "namespace Proxy {\n// Hello.   World\n// clang-format off\n// keep.   this\n\
                    // clang-format on\nint a = 1;\n} // namespace Proxy\n";
        let t = task(dir.path(), "./source/common/a.cc", body, Operation::Fix);
        assert!(checker.process(&t).unwrap().is_empty());
        let fixed = fs::read(&t.path).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&fixed),
            "namespace Proxy {\n// Hello. World\n// clang-format off\n// keep.   this\n\
             // clang-format on\nint a = 1;\n} // namespace Proxy\n"
        );
        let modified = fs::metadata(&t.path).unwrap().modified().unwrap();

        assert!(checker.process(&t).unwrap().is_empty());
        assert_eq!(fs::read(&t.path).unwrap(), fixed);
        assert_eq!(fs::metadata(&t.path).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_missing_namespace_is_one_diagnostic() {
        let (dir, checker) = setup();
        let body = "int a = 1;\n".repeat(50);
        let t = task(dir.path(), "./source/common/a.cc", &body, Operation::Check);
        let diags = checker.process(&t).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].message,
            "Unable to find Proxy namespace or NOLINT(namespace-proxy) for file: ./source/common/a.cc"
        );
    }

    #[test]
    fn test_region_violation_reported_after_line_checks() {
        let (dir, checker) = setup();
        let body = "namespace Proxy {\n// a.  b\n// clang-format off\n}\n";
        let t = task(dir.path(), "./source/common/a.cc", body, Operation::Check);
        let diags = checker.process(&t).unwrap();
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], "clang-format remains off");
    }

    #[test]
    fn test_proto_skips_namespace_and_checks_api_package() {
        let (dir, checker) = setup();
        let t = task(dir.path(), "./api/proxy/a.proto", "message A {}\n", Operation::Check);
        let diags = checker.process(&t).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].message,
            "Unable to find package name for proto file: ./api/proxy/a.proto"
        );

        let t = task(
            dir.path(),
            "./api/proxy/b.proto",
            "package proxy.v3;\nmessage A {}\n",
            Operation::Check,
        );
        assert!(checker.process(&t).unwrap().is_empty());
    }

    #[test]
    fn test_build_file_checks() {
        let (dir, checker) = setup();
        let t = task(
            dir.path(),
            "./source/BUILD",
            "deps = [\"@bazel_tools//x\", \"protobuf\"]\n",
            Operation::Fix,
        );
        let diags = checker.process(&t).unwrap();
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.line == Some(1)));

        let t = task(dir.path(), "./api/proxy/BUILD", "licenses()\n", Operation::Check);
        let diags = checker.process(&t).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].message,
            "API build file does not provide api_proto_package()"
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let (dir, checker) = setup();
        let t = FileTask {
            path: dir.path().join("gone.cc"),
            rel_path: "./gone.cc".into(),
            category: Category::PlainSource,
            operation: Operation::Check,
        };
        assert!(checker.process(&t).is_err());
    }
}
