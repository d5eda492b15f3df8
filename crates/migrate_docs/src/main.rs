use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use migrate_docs_core::config::{MigrateConfig, load_config};
use migrate_docs_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, resolve_config_path, resolve_paths,
};
use migrate_docs_core::{
    ConflictStrategy, MigrateError, MigrationReport, MigrationRequest, PlannedAction,
    RequestOptions, run_migration,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "migrate-docs",
    version,
    about = "Promote a documentation version folder and rewrite its version references"
)]
struct Cli {
    #[arg(long, value_name = "VERSION", help = "Source version folder, e.g. v0.1.0")]
    source: String,
    #[arg(
        long,
        value_name = "VERSION",
        help = "Target version folder, e.g. v1.0.0 or archived/v1.0.0"
    )]
    target: String,
    #[arg(long, help = "Report planned changes without touching the filesystem")]
    dry_run: bool,
    #[arg(
        long,
        value_name = "STRATEGY",
        default_value = "source-wins",
        help = "How to handle existing target files: source-wins, target-wins or abort"
    )]
    conflict_strategy: ConflictStrategy,
    #[arg(long, help = "Delete the source folder after a successful migration")]
    delete_source: bool,
    #[arg(long, help = "Remove planned-feature blocks, timelines and version navigation")]
    strip_evolution: bool,
    #[arg(long, help = "Do not rewrite references in cross-reference folders")]
    no_cross_refs: bool,
    #[arg(long, help = "Print per-file progress, warnings, diffs and path diagnostics")]
    verbose: bool,
    #[arg(long, value_name = "PATH", help = "Documentation root containing the version folders")]
    docs_root: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Config file (default: ./.migrate-docs.toml)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Print the migration report as JSON")]
    json: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            std::process::exit(i32::from(error.use_stderr()));
        }
    };
    init_logging(cli.verbose);

    let verbose = cli.verbose;
    if let Err(error) = run(cli) {
        finish_with_error(&error, verbose);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .without_time()
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let request = MigrationRequest::new(
        &cli.source,
        &cli.target,
        RequestOptions {
            dry_run: cli.dry_run,
            conflict_strategy: cli.conflict_strategy,
            delete_source: cli.delete_source,
            strip_evolution: cli.strip_evolution,
            skip_cross_refs: cli.no_cross_refs,
            verbose: cli.verbose,
        },
    )?;
    let overrides = PathOverrides {
        docs_root: cli.docs_root,
        config: cli.config,
    };
    let (paths, config) = resolve_runtime_paths(&request, &overrides)?;
    if request.verbose {
        println!("{}", paths.diagnostics());
    }

    let report = run_migration(&request, &paths, &config)?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        );
    } else {
        print_report(&report, &paths, request.verbose);
    }
    Ok(())
}

fn resolve_runtime_paths(
    request: &MigrationRequest,
    overrides: &PathOverrides,
) -> Result<(ResolvedPaths, MigrateConfig)> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let (config_path, _) = resolve_config_path(&context, overrides);
    let config = load_config(&config_path)?;
    let initial = resolve_paths(&context, overrides, &config, request)?;
    let docs_env = initial.docs_root.join(".env");
    if docs_env.exists() {
        let _ = dotenvy::from_path_override(&docs_env);
        debug!(path = %normalize_path(&docs_env), "loaded docs root .env");
        let paths = resolve_paths(&context, overrides, &config, request)?;
        return Ok((paths, config));
    }
    Ok((initial, config))
}

fn print_report(report: &MigrationReport, paths: &ResolvedPaths, verbose: bool) {
    println!("source: {}", normalize_path(&paths.source_dir));
    println!("target: {}", normalize_path(&paths.target_dir));
    println!("dry_run: {}", format_flag(report.dry_run));
    println!("scanned: {}", report.scanned);
    println!("changed: {}", report.changed);
    println!("unchanged: {}", report.unchanged);
    println!("copied: {}", report.copied);
    println!("written: {}", report.written);
    println!("conflicts: {}", report.conflicts);
    println!("skipped: {}", report.skipped);
    println!("warnings: {}", report.warnings.len());
    if report.dry_run {
        println!("source_delete_planned: {}", format_flag(report.source_delete_planned));
    } else {
        println!("source_deleted: {}", format_flag(report.source_deleted));
    }

    if report.dry_run || verbose {
        if report.changes.is_empty() {
            println!("changes: <none>");
        } else {
            println!("changes:");
            for change in &report.changes {
                let rules = if change.rules_applied.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", change.rules_applied.join(", "))
                };
                println!(
                    "  {} {}{rules}",
                    change.action.as_str(),
                    change.target_path
                );
            }
        }
    }

    if verbose {
        for warning in &report.warnings {
            println!("warning: {warning}");
        }
        for change in &report.changes {
            if change.action != PlannedAction::Skip
                && let Some(diff) = &change.diff
            {
                print!("{diff}");
            }
        }
    }
}

/// Print a single `error:` line and exit with the code of the underlying failure.
fn finish_with_error(error: &anyhow::Error, verbose: bool) -> ! {
    eprintln!("error: {error}");
    if verbose {
        for cause in error.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    let code = error
        .downcast_ref::<MigrateError>()
        .map(MigrateError::exit_code)
        .unwrap_or(3);
    std::process::exit(code);
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
