//! Configuration discovery and effective settings resolution.
//!
//! fmtcheck reads `fmtcheck.toml|yaml|yml` from the repository root (or the
//! closest ancestor) and merges it with CLI flags and tool environment
//! variables to produce an `Effective` config.
//! Defaults:
//! - `workers`: available parallelism
//! - `tool_group_prefix`: `./api/`
//! - `namespace`: `Proxy`
//! - `include_order`: `envoy,common,source,exe,server,extensions,test`
//! - `output`: `human`
//! - `pre_checks`: `["tools"]`
//!
//! Overrides precedence: CLI > environment (tool paths only) > config file >
//! defaults.

use crate::classify::Exclusions;
use crate::error::{Error, Result};
use crate::rules::DEFAULT_INCLUDE_DIR_ORDER;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_NAMES: [&str; 3] = ["fmtcheck.toml", "fmtcheck.yaml", "fmtcheck.yml"];

pub const DEFAULT_API_PREFIX: &str = "./api/";
pub const DEFAULT_NAMESPACE: &str = "Proxy";
pub const DEFAULT_CLANG_FORMAT: &str = "clang-format-11";
pub const OUTPUT_FORMATS: [&str; 2] = ["human", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Checks run before any file is touched.
pub enum PreCheck {
    /// Required external tools exist and are executable by other users.
    Tools,
    /// The repository root is a git checkout.
    VcsRoot,
}

#[derive(Debug, Default, Deserialize, Clone)]
/// Extra exclusions under `[exclude]`.
pub struct ExcludeCfg {
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub globs: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
/// Tool locations under `[tools]`.
pub struct ToolsCfg {
    pub clang_format: Option<String>,
    pub buildifier: Option<String>,
    pub buildozer: Option<String>,
    pub header_order: Option<String>,
    pub build_fixer: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// Root configuration loaded from `fmtcheck.toml|yaml`.
pub struct FmtConfig {
    pub workers: Option<usize>,
    pub tool_group_prefix: Option<String>,
    pub namespace: Option<String>,
    pub include_order: Option<Vec<String>>,
    pub output: Option<String>,
    pub pre_checks: Option<Vec<PreCheck>>,
    #[serde(default)]
    pub exclude: Option<ExcludeCfg>,
    #[serde(default)]
    pub tools: Option<ToolsCfg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Resolved external tool locations.
pub struct ToolPaths {
    pub clang_format: String,
    pub buildifier: String,
    pub buildozer: String,
    pub header_order: PathBuf,
    pub build_fixer: PathBuf,
}

impl ToolPaths {
    /// Resolve tool locations from `env`, then `cfg`, then defaults rooted at
    /// `root`. buildifier and buildozer fall back to `$GOPATH/bin/<tool>` when
    /// `GOPATH` is set, otherwise to the bare name for a `PATH` search.
    pub fn resolve<E>(root: &Path, cfg: Option<&ToolsCfg>, env: E) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        let env = |k: &str| env(k).filter(|v| !v.is_empty());
        let cfg = cfg.cloned().unwrap_or_default();
        let go_tool = |name: &str| match env("GOPATH") {
            Some(gopath) => Path::new(&gopath)
                .join("bin")
                .join(name)
                .to_string_lossy()
                .to_string(),
            None => name.to_string(),
        };
        let scripts = root.join("tools").join("code_format");

        ToolPaths {
            clang_format: env("CLANG_FORMAT")
                .or(cfg.clang_format)
                .unwrap_or_else(|| DEFAULT_CLANG_FORMAT.to_string()),
            buildifier: env("BUILDIFIER_BIN")
                .or(cfg.buildifier)
                .unwrap_or_else(|| go_tool("buildifier")),
            buildozer: env("BUILDOZER_BIN")
                .or(cfg.buildozer)
                .unwrap_or_else(|| go_tool("buildozer")),
            header_order: env("HEADER_ORDER_BIN")
                .or(cfg.header_order)
                .map(|p| root.join(p))
                .unwrap_or_else(|| scripts.join("header_order.py")),
            build_fixer: env("BUILD_FIXER_BIN")
                .or(cfg.build_fixer)
                .map(|p| root.join(p))
                .unwrap_or_else(|| scripts.join("envoy_build_fixer.py")),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Values supplied on the command line. `None` means "not given".
pub struct Overrides {
    pub repo_root: Option<String>,
    pub workers: Option<usize>,
    pub tool_group_prefix: Option<String>,
    pub namespace: Option<String>,
    pub include_order: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub repo_root: PathBuf,
    pub workers: usize,
    pub api_prefix: String,
    pub namespace: String,
    pub include_order: Vec<String>,
    pub output: String,
    pub pre_checks: Vec<PreCheck>,
    pub exclusions: Exclusions,
    pub tools: ToolPaths,
}

/// Walk upward from `start` to detect the repository root.
///
/// `start` should be absolute; a relative path cannot be walked past itself.
/// Stops when a `fmtcheck.toml|yaml|yml` or a `.git` entry is found.
pub fn detect_repo_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if CONFIG_NAMES.iter().any(|n| cur.join(n).exists()) || cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

/// Load `FmtConfig` from `fmtcheck.toml` or `fmtcheck.yaml|yml` if present.
pub fn load_config(root: &Path) -> Result<Option<FmtConfig>> {
    let toml_path = root.join(CONFIG_NAMES[0]);
    if toml_path.exists() {
        let s = fs::read_to_string(&toml_path).map_err(|e| Error::io(&toml_path, e))?;
        let cfg: FmtConfig = toml::from_str(&s).map_err(|e| Error::ConfigParse {
            path: toml_path.clone(),
            message: e.to_string(),
        })?;
        return Ok(Some(cfg));
    }
    for yml in &CONFIG_NAMES[1..] {
        let p = root.join(yml);
        if p.exists() {
            let s = fs::read_to_string(&p).map_err(|e| Error::io(&p, e))?;
            let cfg: FmtConfig = serde_yaml::from_str(&s).map_err(|e| Error::ConfigParse {
                path: p.clone(),
                message: e.to_string(),
            })?;
            return Ok(Some(cfg));
        }
    }
    Ok(None)
}

fn config_path(root: &Path) -> PathBuf {
    CONFIG_NAMES
        .iter()
        .map(|n| root.join(n))
        .find(|p| p.exists())
        .unwrap_or_else(|| root.join(CONFIG_NAMES[0]))
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve `Effective` by merging CLI flags, the process environment,
/// discovered config, and defaults.
pub fn resolve_effective(cli: &Overrides) -> Result<Effective> {
    resolve_with_env(cli, |k| std::env::var(k).ok())
}

/// Like `resolve_effective`, reading tool variables through `env`.
pub fn resolve_with_env<E>(cli: &Overrides, env: E) -> Result<Effective>
where
    E: Fn(&str) -> Option<String>,
{
    let start = PathBuf::from(cli.repo_root.as_deref().unwrap_or("."));
    let start = fs::canonicalize(&start).map_err(|e| Error::io(&start, e))?;
    let start = if start.is_file() {
        start.parent().map(Path::to_path_buf).unwrap_or(start)
    } else {
        start
    };
    let repo_root = detect_repo_root(&start);
    let cfg = load_config(&repo_root)?.unwrap_or_default();

    let workers = match cli.workers.or(cfg.workers) {
        Some(0) => return Err(Error::InvalidWorkers),
        Some(n) => n,
        None => default_workers(),
    };

    let api_prefix = cli
        .tool_group_prefix
        .clone()
        .or(cfg.tool_group_prefix)
        .unwrap_or_else(|| DEFAULT_API_PREFIX.to_string());

    let namespace = cli
        .namespace
        .clone()
        .or(cfg.namespace)
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let include_order = cli
        .include_order
        .as_deref()
        .map(split_list)
        .or(cfg.include_order)
        .unwrap_or_else(|| DEFAULT_INCLUDE_DIR_ORDER.iter().map(|s| s.to_string()).collect());

    let output = cli
        .output
        .clone()
        .or(cfg.output)
        .unwrap_or_else(|| "human".to_string());
    if !OUTPUT_FORMATS.contains(&output.as_str()) {
        return Err(Error::ConfigParse {
            path: config_path(&repo_root),
            message: format!("unknown output format '{}'", output),
        });
    }

    let pre_checks = cfg.pre_checks.unwrap_or_else(|| vec![PreCheck::Tools]);

    let exclude = cfg.exclude.unwrap_or_default();
    let globs = exclude
        .globs
        .iter()
        .map(|g| {
            glob::Pattern::new(g).map_err(|source| Error::InvalidGlob {
                pattern: g.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let exclusions = Exclusions {
        extra_prefixes: exclude.prefixes,
        globs,
    };

    let tools = ToolPaths::resolve(&repo_root, cfg.tools.as_ref(), env);

    Ok(Effective {
        repo_root,
        workers,
        api_prefix,
        namespace,
        include_order,
        output,
        pre_checks,
        exclusions,
        tools,
    })
}
