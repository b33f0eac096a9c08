//! CLI argument parsing via `clap`.

use crate::config::Overrides;
use crate::models::Operation;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fmtcheck",
    version,
    about = "Check or fix source, proto and BUILD file format",
    long_about = "fmtcheck walks a source tree, applies line rules to C++ and proto sources, and drives clang-format, buildifier and the header order tool over every checked file.\n\nConfiguration precedence: CLI > environment (tool paths) > fmtcheck.toml > defaults.",
    after_help = "Examples:\n  fmtcheck check\n  fmtcheck fix source/common/http/codec.cc\n  fmtcheck check --workers 8 --output json",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report format problems without touching files
    #[command(
        about = "Check format",
        long_about = "Run every line rule and formatter diff. Prints PASS and exits 0 when nothing is found."
    )]
    Check(RunArgs),
    /// Rewrite files, then report what is left
    #[command(
        about = "Fix format",
        long_about = "Apply line fixes and formatter rewrites in place, then run the same checks as `check`."
    )]
    Fix(RunArgs),
}

impl Commands {
    pub fn split(self) -> (Operation, RunArgs) {
        match self {
            Commands::Check(a) => (Operation::Check, a),
            Commands::Fix(a) => (Operation::Fix, a),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(help = "File or directory to process (default: repository root)")]
    pub path: Option<String>,
    #[arg(long, help = "Repository root (default: nearest ancestor of the current directory with fmtcheck.toml or .git)")]
    pub repo_root: Option<String>,
    #[arg(long, alias = "num-workers", help = "Worker threads per phase (default: available cores)")]
    pub workers: Option<usize>,
    #[arg(long, alias = "api-prefix", help = "Path prefix of the API tree (default: ./api/)")]
    pub tool_group_prefix: Option<String>,
    #[arg(long, help = "Namespace every source file must open (default: Proxy)")]
    pub namespace_name: Option<String>,
    #[arg(long, help = "Comma-separated include directory order")]
    pub include_order: Option<String>,
    #[arg(long, value_parser = ["human", "json"], help = "Output mode: human|json (default: human)")]
    pub output: Option<String>,
    #[arg(short, long, action = clap::ArgAction::SetTrue, help = "Enable debug logging")]
    pub verbose: bool,
}

impl RunArgs {
    /// CLI values as config overrides. Discovery starts at `--repo-root`, else
    /// at the current directory; the target path never moves the root.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            repo_root: self.repo_root.clone(),
            workers: self.workers,
            tool_group_prefix: self.tool_group_prefix.clone(),
            namespace: self.namespace_name.clone(),
            include_order: self.include_order.clone(),
            output: self.output.clone(),
        }
    }
}
