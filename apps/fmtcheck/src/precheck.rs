//! Pre-run checks: required external tools and the repository root.

use crate::config::{PreCheck, ToolPaths};
use std::env;
use std::path::{Path, PathBuf};

/// Search `PATH` for `executable`. A name containing a path separator is
/// checked as given.
pub fn look_path(executable: &str) -> Option<PathBuf> {
    if executable.is_empty() {
        return None;
    }
    if executable.contains('/') {
        let p = PathBuf::from(executable);
        return is_executable_file(&p).then_some(p);
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(executable))
        .find(|candidate| is_executable_file(candidate))
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// Whether `path` carries the execute bit for "other" users.
#[cfg(unix)]
pub fn executable_by_others(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o001 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn executable_by_others(path: &Path) -> bool {
    path.exists()
}

fn not_shared(name: &str) -> String {
    format!("command {} exists, but cannot be executed by other users", name)
}

fn clang_format_missing(name: &str) -> String {
    format!(
        "Command {} not found. If you have clang-format in version 11.x.x installed, but the \
         binary name is different or it's not available in PATH, please use CLANG_FORMAT \
         environment variable to specify the path. Examples:\n    \
         export CLANG_FORMAT=clang-format-11.0.1\n    \
         export CLANG_FORMAT=/opt/bin/clang-format-11\n    \
         export CLANG_FORMAT=/usr/local/opt/llvm@11/bin/clang-format",
        name
    )
}

fn bazel_tool_missing(path: &str, name: &str, var: &str) -> String {
    format!(
        "Command {path} not found. If you have {name} installed, but the binary name is \
         different or it's not available in $GOPATH/bin, please use {var} environment variable \
         to specify the path. Example:\n    \
         export {var}=`which {name}`\n\
         If you don't have {name} installed, you can install it by:\n    \
         go get -u github.com/bazelbuild/buildtools/{name}"
    )
}

fn check_bazel_tool(name: &str, path: &str, var: &str, errors: &mut Vec<String>) {
    let found = look_path(path).or_else(|| {
        let literal = PathBuf::from(path);
        literal.exists().then_some(literal)
    });
    match found {
        Some(abs) => {
            if !executable_by_others(&abs) {
                errors.push(not_shared(path));
            }
        }
        None => errors.push(bazel_tool_missing(path, name, var)),
    }
}

/// Verify clang-format, buildifier and buildozer. Returns one message per
/// problem; an empty list means every tool is usable.
pub fn check_tools(tools: &ToolPaths) -> Vec<String> {
    let mut errors = Vec::new();

    match look_path(&tools.clang_format) {
        Some(abs) => {
            if !executable_by_others(&abs) {
                errors.push(not_shared(&tools.clang_format));
            }
        }
        None => errors.push(clang_format_missing(&tools.clang_format)),
    }

    check_bazel_tool("buildifier", &tools.buildifier, "BUILDIFIER_BIN", &mut errors);
    check_bazel_tool("buildozer", &tools.buildozer, "BUILDOZER_BIN", &mut errors);
    errors
}

pub fn check_vcs_root(root: &Path) -> Vec<String> {
    if root.join(".git").exists() {
        Vec::new()
    } else {
        vec![format!(
            "repository root {} is not a git checkout",
            root.display()
        )]
    }
}

/// Run the configured pre-checks in order and collect their messages.
pub fn run_pre_checks(checks: &[PreCheck], root: &Path, tools: &ToolPaths) -> Vec<String> {
    let mut errors = Vec::new();
    for check in checks {
        log::debug!("pre-check {:?}", check);
        match check {
            PreCheck::Tools => errors.extend(check_tools(tools)),
            PreCheck::VcsRoot => errors.extend(check_vcs_root(root)),
        }
    }
    errors
}
