//! fmtcheck CLI binary entry point.
//! Resolves configuration, runs pre-checks, then drives the orchestrator.

use clap::Parser;
use fmtcheck::checker::FormatChecker;
use fmtcheck::cli::{Cli, RunArgs};
use fmtcheck::config;
use fmtcheck::models::Operation;
use fmtcheck::output;
use fmtcheck::pipeline::Orchestrator;
use fmtcheck::precheck;
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("FMTCHECK_LOG", default))
        .format_timestamp(None)
        .init();
}

fn run(operation: Operation, args: &RunArgs) -> ExitCode {
    let eff = match config::resolve_effective(&args.overrides()) {
        Ok(eff) => eff,
        Err(e) => {
            eprintln!("{} {}", output::error_prefix(), e.chain());
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    log::debug!("repository root: {}", eff.repo_root.display());

    let errors = precheck::run_pre_checks(&eff.pre_checks, &eff.repo_root, &eff.tools);
    if !errors.is_empty() {
        output::print_pre_check_errors(&errors);
        return ExitCode::from(EXIT_FAILED);
    }

    let checker = match FormatChecker::from_effective(&eff) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", output::error_prefix(), e.chain());
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let target = args
        .path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| eff.repo_root.clone());
    let orchestrator = Orchestrator::new(
        eff.repo_root.clone(),
        eff.exclusions.clone(),
        eff.workers,
        operation,
    );
    let report = match orchestrator.run(&target, &checker) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} {}", output::error_prefix(), e.chain());
            return ExitCode::from(EXIT_FAILED);
        }
    };
    if report.files == 0 && eff.output != "json" {
        eprintln!("{} no files to {}", output::note_prefix(), operation.as_str());
    }

    output::print_report(&report, operation, &eff.output);
    if report.has_diagnostics() {
        ExitCode::from(EXIT_FAILED)
    } else {
        ExitCode::SUCCESS
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (operation, args) = cli.cmd.split();
    init_logging(args.verbose);
    run(operation, &args)
}
