//! File classification and path exclusion.
//!
//! Every rule in this crate works on root-relative paths with a leading
//! `./` (e.g. `./source/common/http/proxy_base.cc`). Classification is a pure
//! function of that string; nothing on disk is consulted.

use std::path::Path;

/// Path prefixes that are never checked.
pub const EXCLUDED_PREFIXES: &[&str] = &[
    "./generated/",
    "./build",
    "./.git/",
    "./bazel-",
    "./.cache",
    "./envoy",
    "./modsecurity",
    "./source/extensions.bzl",
    "./bazel/extensions_build_config",
];

/// Suffixes of files that are checked at all.
pub const CHECKED_SUFFIXES: &[&str] = &[
    "BUILD", "WORKSPACE", ".bzl", ".cc", ".h", ".m", ".mm", ".proto",
];

pub const PROTO_SUFFIX: &str = ".proto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    BuildFile,
    StarlarkFile,
    WorkspaceFile,
    ProtoFile,
    PlainSource,
}

impl Category {
    /// Build, starlark and workspace files go through the build-file path.
    pub fn is_build_like(self) -> bool {
        matches!(
            self,
            Category::BuildFile | Category::StarlarkFile | Category::WorkspaceFile
        )
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn is_build_file(path: &str) -> bool {
    let base = base_name(path);
    base == "BUILD" || base == "BUILD.bazel" || base.ends_with(".BUILD")
}

pub fn is_starlark_file(path: &str) -> bool {
    path.ends_with(".bzl")
}

pub fn is_workspace_file(path: &str) -> bool {
    base_name(path) == "WORKSPACE"
}

pub fn is_proto_file(path: &str) -> bool {
    path.ends_with(PROTO_SUFFIX)
}

pub fn classify(path: &str) -> Category {
    if is_build_file(path) {
        Category::BuildFile
    } else if is_starlark_file(path) {
        Category::StarlarkFile
    } else if is_workspace_file(path) {
        Category::WorkspaceFile
    } else if is_proto_file(path) {
        Category::ProtoFile
    } else {
        Category::PlainSource
    }
}

/// Exclusion rules: built-in prefixes, extra configured prefixes and globs,
/// and the checked-suffix allow-list.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    pub extra_prefixes: Vec<String>,
    pub globs: Vec<glob::Pattern>,
}

impl Exclusions {
    fn prefixes(&self) -> impl Iterator<Item = &str> {
        EXCLUDED_PREFIXES
            .iter()
            .copied()
            .chain(self.extra_prefixes.iter().map(String::as_str))
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        if self.prefixes().any(|p| path.starts_with(p)) {
            return true;
        }
        if self.globs.iter().any(|g| g.matches(path)) {
            return true;
        }
        !CHECKED_SUFFIXES.iter().any(|s| path.ends_with(s))
    }

    /// True when every file below the directory `dir` (root-relative, `./`
    /// form, no trailing slash) is excluded by prefix, so the walk can skip it.
    pub fn prunes_dir(&self, dir: &str) -> bool {
        let with_slash = format!("{}/", dir);
        self.prefixes().any(|p| with_slash.starts_with(p))
    }
}

/// Path relative to `root` in `./a/b` form. Paths outside `root` are returned
/// with separators normalized but otherwise untouched.
pub fn normalize(path: &Path, root: &Path) -> String {
    let rel = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    let s = rel.to_string_lossy().replace('\\', "/");
    if s.starts_with("./") || s.starts_with('/') || s.starts_with("../") {
        s
    } else if s.is_empty() || s == "." {
        ".".to_string()
    } else {
        format!("./{}", s)
    }
}
