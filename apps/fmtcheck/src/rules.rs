//! Line-level correctness rules and fixes.
//!
//! `RuleSet` holds everything the rules need (compiled patterns, replacement
//! tables, include directories, API prefix, namespace name). It is built once
//! per run and shared by reference across workers.
//!
//! Checks are independent: a single line may trigger any number of them and
//! every hit is reported, in table order. Fixes only consult the replacement
//! tables and a few pure text substitutions, never the check predicates.

use crate::classify::is_starlark_file;
use crate::error::Result;
use regex::Regex;

/// Ordered `old -> new` substitutions shared by checking and fixing.
pub struct ReplacementTable {
    pub entries: &'static [(&'static str, &'static str)],
    /// Message with `{old}` and `{new}` placeholders.
    pub message: &'static str,
}

impl ReplacementTable {
    pub fn check(&self, line: &str, report: &mut dyn FnMut(String)) {
        for (old, new) in self.entries {
            if line.contains(old) {
                report(self.message.replace("{old}", old).replace("{new}", new));
            }
        }
    }

    pub fn fix(&self, line: &str) -> String {
        let mut out = line.to_string();
        for (old, new) in self.entries {
            if out.contains(old) {
                out = out.replace(old, new);
            }
        }
        out
    }
}

pub const PROTOBUF_TYPE_ERRORS: ReplacementTable = ReplacementTable {
    entries: &[
        // Well-known types live in ProtobufWkt.
        ("Protobuf::Any", "ProtobufWkt::Any"),
        ("Protobuf::Empty", "ProtobufWkt::Empty"),
        ("Protobuf::ListValue", "ProtobufWkt::ListValue"),
        ("Protobuf::NULL_VALUE", "ProtobufWkt::NULL_VALUE"),
        ("Protobuf::StringValue", "ProtobufWkt::StringValue"),
        ("Protobuf::Struct", "ProtobufWkt::Struct"),
        ("Protobuf::Value", "ProtobufWkt::Value"),
        ("ProtobufWkt::Map", "Protobuf::Map"),
        ("ProtobufWkt::MapPair", "Protobuf::MapPair"),
        ("ProtobufUtil::MessageDifferencer", "Protobuf::util::MessageDifferencer"),
    ],
    message: "incorrect protobuf type reference {old}; should be {new}",
};

pub const LIBCXX_REPLACEMENTS: ReplacementTable = ReplacementTable {
    entries: &[("absl::make_unique<", "std::make_unique<")],
    message: "term {old} should be replaced with standard library term {new}",
};

pub const CODE_CONVENTION_REPLACEMENTS: ReplacementTable = ReplacementTable {
    // Redundant gmock cardinalities.
    entries: &[
        (".Times(1);", ";"),
        (".Times(1).WillOnce", ".WillOnce"),
        (".Times(1).WillRepeatedly", ".WillOnce"),
    ],
    message: "term {old} should be replaced with preferred term {new}",
};

pub const REPLACEMENT_TABLES: [&ReplacementTable; 3] = [
    &PROTOBUF_TYPE_ERRORS,
    &LIBCXX_REPLACEMENTS,
    &CODE_CONVENTION_REPLACEMENTS,
];

/// Tokens banned in favor of the absl time library.
const TIME_TOKENS: &[(&str, &str)] = &[
    ("std::put_time", "Don't use std::put_time; use absl::Time equivalent instead"),
    ("gmtime", "Don't use gmtime; use absl::Time equivalent instead"),
    ("mktime", "Don't use mktime; use absl::Time equivalent instead"),
    ("localtime", "Don't use localtime; use absl::Time equivalent instead"),
    ("strftime", "Don't use strftime; use absl::FormatTime instead"),
    ("strptime", "Don't use strptime; use absl::FormatTime instead"),
    ("strerror", "Don't use strerror; use Envoy::errorDetails instead"),
];

/// std types unavailable at runtime on older Apple platforms.
const ABSL_TOKENS: &[(&str, &str)] = &[
    ("std::any", "Don't use std::any; use absl::any instead"),
    ("std::get_if", "Don't use std::get_if; use absl::get_if instead"),
    (
        "std::holds_alternative",
        "Don't use std::holds_alternative; use absl::holds_alternative instead",
    ),
    (
        "std::make_optional",
        "Don't use std::make_optional; use absl::make_optional instead",
    ),
    ("std::monostate", "Don't use std::monostate; use absl::monostate instead"),
    ("std::optional", "Don't use std::optional; use absl::optional instead"),
];

const VARIANT_TOKENS: &[(&str, &str)] = &[
    ("std::variant", "Don't use std::variant; use absl::variant instead"),
    ("std::visit", "Don't use std::visit; use absl::visit instead"),
];

const STAT_LOOKUPS: &[&str] = &[
    ".counterFromString(",
    ".gaugeFromString(",
    ".histogramFromString(",
    ".textReadoutFromString(",
    "->counterFromString(",
    "->gaugeFromString(",
    "->histogramFromString(",
    "->textReadoutFromString(",
];

const INCLUDE_ANGLE: &str = "#include <";
const PACKED_EXEMPT_PATH: &str = "./envoy/common/platform.h";

/// Default header block include directory order.
pub const DEFAULT_INCLUDE_DIR_ORDER: &[&str] =
    &["envoy", "common", "source", "exe", "server", "extensions", "test"];

/// True if `token` occurs in `line` with no identifier character
/// (alphanumeric or `_`) directly before or after it.
pub fn token_in_line(token: &str, line: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let mut start = 0;
    while let Some(pos) = line[start..].find(token) {
        let idx = start + pos;
        let before_ok = !line[..idx].chars().next_back().is_some_and(is_ident);
        let after_ok = !line[idx + token.len()..].chars().next().is_some_and(is_ident);
        if before_ok && after_ok {
            return true;
        }
        start = idx + line[idx..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// Whether `path` is under one of `subdirs`. Top-level files count as inside
/// every subdirectory.
pub fn is_in_subdir(path: &str, subdirs: &[&str]) -> bool {
    if path.matches('/').count() <= 1 {
        return true;
    }
    subdirs
        .iter()
        .any(|d| path.starts_with(&format!("./{}/", d)))
}

/// Immutable rule configuration shared by every worker.
pub struct RuleSet {
    api_prefix: String,
    namespace: String,
    include_dirs: Vec<String>,
    dot_multi_space: Regex,
    virtual_includes: Regex,
    duration_value: Regex,
    designated_initializer: Regex,
    test_name_lower_case: Regex,
    old_mock_method: Regex,
    for_each_n: Regex,
    mangled_protobuf_name: Regex,
    proto_min_bytes: Regex,
    proto_package: Regex,
    namespace_decl: Regex,
}

impl RuleSet {
    pub fn new(api_prefix: &str, namespace: &str, include_dirs: &[String]) -> Result<Self> {
        Ok(RuleSet {
            api_prefix: api_prefix.to_string(),
            namespace: namespace.to_string(),
            include_dirs: include_dirs.to_vec(),
            dot_multi_space: Regex::new(r"\. +")?,
            virtual_includes: Regex::new(r"#include.*/_virtual_includes/")?,
            duration_value: Regex::new(r"\b[Dd]uration\(([0-9.]+)")?,
            designated_initializer: Regex::new(r"\{\s*\.\w+\s*=")?,
            test_name_lower_case: Regex::new(r"TEST(_.\(.*,\s|\()[a-z].*\)\s\{")?,
            old_mock_method: Regex::new(r"MOCK_METHOD\d")?,
            for_each_n: Regex::new(r"for_each_n\(")?,
            mangled_protobuf_name: Regex::new(r"envoy::[a-z0-9_:]+::[A-Z][a-z]\w*_\w*_[A-Z]{2}")?,
            proto_min_bytes: Regex::new(r"\bmin_bytes\b")?,
            proto_package: Regex::new(r"(?m)^package (\S+);")?,
            namespace_decl: Regex::new(&format!(
                r"(?m)^\s*namespace\s+{}\s*\{{",
                regex::escape(namespace)
            ))?,
        })
    }

    pub fn is_api_file(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix)
    }

    pub fn has_invalid_angle_bracket_directory(&self, line: &str) -> bool {
        let Some(rest) = line.strip_prefix(INCLUDE_ANGLE) else {
            return false;
        };
        match rest.find('/') {
            Some(slash) => self.include_dirs.iter().any(|d| d == &rest[..slash]),
            None => false,
        }
    }

    /// Run every source-file check against one line.
    pub fn check_source_line(&self, line: &str, path: &str, report: &mut dyn FnMut(String)) {
        let mut err = |m: &str| report(m.to_string());

        if line.contains(".  ") {
            err("over-enthusiastic spaces");
        }
        if self.has_invalid_angle_bracket_directory(line) {
            err("envoy includes should not have angle brackets");
        }
        for table in REPLACEMENT_TABLES {
            table.check(line, &mut |m| err(m.as_str()));
        }
        if self.virtual_includes.is_match(line) {
            err("Don't include the virtual includes headers.");
        }
        if line.starts_with("#include <mutex>") || line.starts_with("#include <condition_variable") {
            err("Don't use <mutex> or <condition_variable*>, switch to \
                 Thread::MutexBasicLockable in source/common/common/thread.h");
        }
        if line.starts_with("#include <shared_mutex>") {
            err("Don't use <shared_mutex>, use absl::Mutex for reader/writer locks.");
        }
        if let Some(arg) = self.duration_value.captures(line).and_then(|c| c.get(1)) {
            if arg.as_str() != "0" && arg.as_str() != "0.0" {
                err("Don't use ambiguous duration(value), use an explicit duration type, \
                     e.g. Event::TimeSystem::Milliseconds(value)");
            }
        }
        if token_in_line("std::get_time", line) {
            if path.contains("test/") {
                err("Don't use std::get_time; use TestUtility::parseTime in tests");
            } else {
                err("Don't use std::get_time; use the injectable time system");
            }
        }
        for (token, message) in TIME_TOKENS {
            if token_in_line(token, line) {
                err(*message);
            }
        }
        if line.contains("std::atomic_") {
            err("Don't use free std::atomic_* functions, use std::atomic<T> members instead.");
        }
        for (token, message) in ABSL_TOKENS {
            if token_in_line(token, line) {
                err(*message);
            }
        }
        if !line.contains("NOLINT(std::string_view)")
            && (token_in_line("std::string_view", line) || token_in_line("toStdStringView", line))
        {
            err("Don't use std::string_view or toStdStringView; use absl::string_view instead");
        }
        for (token, message) in VARIANT_TOKENS {
            if token_in_line(token, line) {
                err(*message);
            }
        }
        if line.contains("__attribute__((packed))") && path != PACKED_EXEMPT_PATH {
            err("Don't use __attribute__((packed)), use the PACKED_STRUCT macro defined \
                 in envoy/common/platform.h instead");
        }
        if self.designated_initializer.is_match(line) {
            err("Don't use designated initializers in struct initialization, \
                 they are not part of C++14");
        }
        if line.contains(" ?: ") {
            err("Don't use the '?:' operator, it is a non-standard GCC extension");
        }
        if line.starts_with("using testing::Test;") || line.starts_with("using testing::TestWithParams;") {
            err("Don't use 'using testing::Test;, elaborate the type instead");
        }
        if self.test_name_lower_case.is_match(line) {
            err("Test names should be CamelCase, starting with a capital letter");
        }
        if self.old_mock_method.is_match(line) {
            err("The MOCK_METHODn() macros should not be used, use MOCK_METHOD() instead");
        }
        if self.for_each_n.is_match(line) {
            err("std::for_each_n should not be used, use an alternative for loop instead");
        }
        if is_in_subdir(path, &["source"])
            && path.ends_with(".cc")
            && STAT_LOOKUPS.iter().any(|s| line.contains(s))
        {
            err("Don't lookup stats by name at runtime; use StatName saved during construction");
        }
        if self.mangled_protobuf_name.is_match(line) {
            err("Don't use mangled Protobuf names for enum constants");
        }
        if path.ends_with(crate::classify::PROTO_SUFFIX)
            && self.proto_min_bytes.is_match(line)
            && !["v1", "v2"].iter().any(|v| path.contains(v))
        {
            err("min_bytes is DEPRECATED, Use min_len.");
        }
    }

    /// Checks applied to build, starlark and workspace files.
    pub fn check_build_line(&self, line: &str, path: &str, report: &mut dyn FnMut(String)) {
        if line.contains("@bazel_tools")
            && !(is_starlark_file(path) || path.starts_with("./bazel/") || line.contains("python/runfiles"))
        {
            report("unexpected @bazel_tools reference, please indirect via a definition in //bazel".to_string());
        }
        if line.contains("\"protobuf\"") {
            report(
                "unexpected direct external dependency on protobuf, use \
                 //source/common/protobuf instead."
                    .to_string(),
            );
        }
    }

    /// Rewrite one source line. Applied regardless of what the checks report.
    pub fn fix_source_line(&self, line: &str) -> String {
        // Collapsing spaces after '.' is broader than comments but safe enough.
        let mut out = self.dot_multi_space.replace_all(line, ". ").into_owned();
        if self.has_invalid_angle_bracket_directory(&out) {
            out = out.replace(['<', '>'], "\"");
        }
        for table in REPLACEMENT_TABLES {
            out = table.fix(&out);
        }
        out
    }

    /// File-scope check: the namespace declaration or its suppression comment
    /// must appear somewhere in `text`.
    pub fn check_namespace(&self, path: &str, text: &str) -> Option<String> {
        let nolint = format!("NOLINT(namespace-{})", self.namespace.to_lowercase());
        if self.namespace_decl.is_match(text) || text.contains(&nolint) {
            return None;
        }
        Some(format!(
            "Unable to find {} namespace or {} for file: {}",
            self.namespace, nolint, path
        ))
    }

    pub fn package_name_for_proto<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.proto_package
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// API BUILD files under `<api prefix>proxy` must declare their package.
    pub fn requires_api_proto_package(&self, path: &str) -> bool {
        crate::classify::is_build_file(path) && path.starts_with(&format!("{}proxy", self.api_prefix))
    }
}
