//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use wannacry_file_finder::classify::classifier::TypeClassifier;
use wannacry_file_finder::core::config::Config;
use wannacry_file_finder::core::errors::WcffError;
use wannacry_file_finder::core::paths::resolve_absolute_path;
use wannacry_file_finder::logger::activity::{ActivityEvent, ActivityLoggerConfig, spawn_logger};
use wannacry_file_finder::recovery::copier::{RecoveryCopier, RecoveryReport};
use wannacry_file_finder::scanner::walker::{DiscoveryStatsSnapshot, FileDiscoverer};

/// Finds files WannaCry left behind and restores them under their real type.
#[derive(Debug, Parser)]
#[command(
    name = "wcff",
    author,
    version,
    about = "WannaCry leftover file finder",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Per-file output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List leftover files without copying anything.
    Find(FindArgs),
    /// Print the extension each file would be recovered with.
    Classify(ClassifyArgs),
    /// Find leftover files and copy them out with corrected extensions.
    Recover(RecoverArgs),
    /// Inspect configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct DiscoveryArgs {
    /// Directory to search (repeatable). Defaults to the configured roots.
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<PathBuf>,
    /// File-name glob marking leftover files.
    #[arg(long, value_name = "GLOB")]
    pattern: Option<String>,
}

#[derive(Debug, Clone, Args, Default)]
struct FindArgs {
    #[command(flatten)]
    discovery: DiscoveryArgs,
}

#[derive(Debug, Clone, Args)]
struct ClassifyArgs {
    /// Files to classify.
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct RecoverArgs {
    #[command(flatten)]
    discovery: DiscoveryArgs,
    /// Destination directory.
    #[arg(long, value_name = "DIR")]
    dest: Option<PathBuf>,
    /// Replace files that already exist at the destination.
    #[arg(long)]
    overwrite: bool,
    /// Copy worker count.
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,
    /// Do not write the JSONL activity log.
    #[arg(long)]
    no_log: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration.
    Show,
    /// Load and validate the configuration.
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad configuration or arguments.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code. Per-file recovery failures never reach here.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<WcffError> for CliError {
    fn from(err: WcffError) -> Self {
        match err {
            WcffError::InvalidConfig { .. }
            | WcffError::MissingConfig { .. }
            | WcffError::ConfigParse { .. }
            | WcffError::InvalidSignature { .. } => Self::User(err.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Find(args) => run_find(cli, args),
        Command::Classify(args) => run_classify(cli, args),
        Command::Recover(args) => run_recover(cli, args),
        Command::Config(args) => run_config(cli, args),
    }
}

/// Load config and layer the discovery flags over it.
fn load_config(cli: &Cli, discovery: &DiscoveryArgs) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if !discovery.roots.is_empty() {
        config.discovery.root_paths.clone_from(&discovery.roots);
    }
    if let Some(pattern) = &discovery.pattern {
        config.discovery.pattern.clone_from(pattern);
    }
    Ok(config)
}

fn run_find(cli: &Cli, args: &FindArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let config = load_config(cli, &args.discovery)?;
    let discoverer = FileDiscoverer::from_config(&config.discovery)?;

    let mut discovery = discoverer.discover();
    let stats = discovery.stats();
    let mut found = 0usize;
    for path in discovery.by_ref() {
        found += 1;
        match mode {
            OutputMode::Human => println!("{}", path.display()),
            OutputMode::Json => write_json_line(&json!({ "path": path.to_string_lossy() }))?,
        }
    }

    let snapshot = stats.snapshot();
    match mode {
        OutputMode::Human => {
            if !cli.quiet {
                eprintln!(
                    "{} {found} file(s) matching {} ({} directories unreadable, {} roots skipped)",
                    "found".bold(),
                    discoverer.options().pattern.as_str(),
                    snapshot.directories_skipped,
                    snapshot.roots_skipped,
                );
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "find",
            "files_found": found,
            "stats": snapshot,
            "duration_ms": millis(discovery.elapsed()),
        }))?,
    }
    Ok(())
}

fn run_classify(cli: &Cli, args: &ClassifyArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let config = Config::load(cli.config.as_deref())?;
    let classifier = TypeClassifier::from_config(&config.classifier)?;

    if cli.verbose && mode == OutputMode::Human {
        eprintln!("oracle: {}", classifier.oracle_name());
    }

    for path in &args.files {
        let (result, error) = match classifier.try_classify(path) {
            Ok(result) => (result, None),
            Err(err) => (classifier.classify(path), Some(err)),
        };
        match mode {
            OutputMode::Human => {
                println!(
                    "{}\t{}\t{}",
                    path.display(),
                    result.extension.green(),
                    result.source.to_string().dimmed()
                );
                if let Some(err) = error
                    && !cli.quiet
                {
                    eprintln!("  {} {err}", "warning:".yellow());
                }
            }
            OutputMode::Json => write_json_line(&json!({
                "path": path.to_string_lossy(),
                "extension": result.extension,
                "source": result.source,
                "error": error.map(|e| e.to_string()),
            }))?,
        }
    }
    Ok(())
}

fn run_recover(cli: &Cli, args: &RecoverArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let mut config = load_config(cli, &args.discovery)?;
    if let Some(dest) = &args.dest {
        config.recovery.destination.clone_from(dest);
    }
    if args.overwrite {
        config.recovery.overwrite = true;
    }
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            return Err(CliError::User("--jobs must be >= 1".to_string()));
        }
        config.recovery.parallelism = jobs;
    }

    let discoverer = FileDiscoverer::from_config(&config.discovery)?;
    let classifier = TypeClassifier::from_config(&config.classifier)?;
    let destination = resolve_absolute_path(&config.recovery.destination);
    let config_hash = config.stable_hash()?;

    let log_path = (!args.no_log).then(|| config.paths.jsonl_log.clone());
    let (logger, logger_thread) = spawn_logger(ActivityLoggerConfig::new(log_path))?;
    logger.send(ActivityEvent::RecoveryStarted {
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_hash,
        roots: discoverer.options().roots.clone(),
    });

    let copier =
        RecoveryCopier::from_config(classifier, &config.recovery).with_logger(logger.clone());

    let discovery_started = Instant::now();
    let mut discovery = discoverer.discover();
    let stats = discovery.stats();
    let verbose = cli.verbose && mode == OutputMode::Human;
    let mut discovery_done = false;
    let sources = discovery
        .by_ref()
        .inspect(|path| {
            if verbose {
                eprintln!("{} {}", "found".dimmed(), path.display());
            }
        })
        .chain(std::iter::from_fn(|| {
            if !discovery_done {
                discovery_done = true;
                let snapshot = stats.snapshot();
                logger.send(ActivityEvent::DiscoveryCompleted {
                    files_found: snapshot.files_matched,
                    directories_skipped: snapshot.directories_skipped,
                    duration_ms: millis(discovery_started.elapsed()),
                });
            }
            None
        }));

    let report = copier.recover_stream(&destination, config.recovery.overwrite, sources);

    if let Err(err) = logger.shutdown() {
        eprintln!("{} {err}", "warning:".yellow());
    }
    let _ = logger_thread.join();

    match mode {
        OutputMode::Human => print_report_human(cli, &report, &destination),
        OutputMode::Json => write_json_line(&report_json(&report, &destination, &stats.snapshot()))?,
    }
    Ok(())
}

fn print_report_human(cli: &Cli, report: &RecoveryReport, destination: &Path) {
    if cli.verbose {
        for error in &report.errors {
            eprintln!("  {} {}: {}", "failed".red(), error.path.display(), error.error);
        }
    }
    if cli.quiet {
        return;
    }
    println!(
        "{} {} file(s) into {} ({} skipped as existing, {} failed, {} bytes, {:.1}s)",
        "recovered".green().bold(),
        report.copied,
        destination.display(),
        report.skipped_existing,
        report.failed,
        report.bytes_copied,
        report.duration.as_secs_f64(),
    );
}

fn report_json(
    report: &RecoveryReport,
    destination: &Path,
    stats: &DiscoveryStatsSnapshot,
) -> Value {
    json!({
        "command": "recover",
        "destination": destination.to_string_lossy(),
        "copied": report.copied,
        "skipped_existing": report.skipped_existing,
        "failed": report.failed,
        "bytes_copied": report.bytes_copied,
        "duration_ms": millis(report.duration),
        "errors": report.errors,
        "discovery": stats,
    })
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path.to_string_lossy(),
                    "exists": exists,
                }))?,
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;
            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml()?),
                OutputMode::Json => write_json_line(&json!({
                    "command": "config show",
                    "config": serde_json::to_value(&config)?,
                }))?,
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => write_json_line(&json!({
                        "command": "config validate",
                        "valid": true,
                        "path": config.paths.config_file.to_string_lossy(),
                        "hash": hash,
                    }))?,
                }
                Ok(())
            }
            Err(e) => {
                if output_mode(cli) == OutputMode::Json {
                    write_json_line(&json!({
                        "command": "config validate",
                        "valid": false,
                        "code": e.code(),
                        "error": e.to_string(),
                    }))?;
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("WCFF_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    match env_mode.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ if stdout_is_tty => OutputMode::Human,
        _ => OutputMode::Json,
    }
}
