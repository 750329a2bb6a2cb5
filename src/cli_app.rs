//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value, json};
use signal_hook::consts::{SIGINT, SIGTERM};
use thiserror::Error;

use flicker_collector::core::config::Config;
use flicker_collector::core::errors::FlickerError;
use flicker_collector::logger::ActivityLog;
use flicker_collector::logger::jsonl::JsonlConfig;
use flicker_collector::results::scenario::Scenario;
use flicker_collector::trace::collector::{StoppedCapture, TracesCollector, cleanup_stale_artifacts};
use flicker_collector::trace::perfetto::PerfettoTraceMonitor;
use flicker_collector::trace::process::LocalProcessControl;
use flicker_collector::trace::registry::TracerRegistry;

const SIGNAL_POLL: Duration = Duration::from_millis(100);

/// Capture system traces around a scenario and inspect collected results.
#[derive(Debug, Parser)]
#[command(
    name = "flicker",
    author,
    version,
    about = "Flicker trace collector",
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
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Start the configured tracer, wait, stop it and keep the artifact.
    Capture(CaptureArgs),
    /// Stop tracer processes left behind by earlier runs.
    Cleanup(CleanupArgs),
    /// Print the effective configuration.
    Config,
    /// Pretty-print a scenario status file.
    Report(ReportArgs),
}

#[derive(Debug, Clone, Args)]
struct CaptureArgs {
    /// Directory the artifact is written under.
    #[arg(long, value_name = "DIR")]
    out: PathBuf,
    /// Stop after this many milliseconds instead of waiting for SIGINT/SIGTERM.
    #[arg(long, value_name = "MS")]
    duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct CleanupArgs {
    /// Also delete stale artifacts under the configured output root.
    #[arg(long)]
    artifacts: bool,
}

#[derive(Debug, Clone, Args)]
struct ReportArgs {
    /// Status file written by the results collector.
    #[arg(value_name = "FILE")]
    status_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Collector failure.
    #[error(transparent)]
    Flicker(#[from] FlickerError),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Flicker(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Capture(args) => run_capture(cli, args),
        Command::Cleanup(args) => run_cleanup(cli, args),
        Command::Config => run_config(cli),
        Command::Report(args) => run_report(cli, args),
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

fn registry_for(config: &Config) -> Arc<TracerRegistry> {
    let log = ActivityLog::open(JsonlConfig::at(config.paths.activity_log.clone()));
    Arc::new(TracerRegistry::from_config(
        config,
        Arc::new(LocalProcessControl::new()),
        log,
    ))
}

// ──────────────────── capture ────────────────────

fn run_capture(cli: &Cli, args: &CaptureArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let registry = registry_for(&config);
    let monitor = PerfettoTraceMonitor::from_config(&config, Arc::clone(&registry))?;
    let mut traces =
        TracesCollector::new(&args.out, config.collector.output_prefix.clone()).with_monitor(monitor);

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&shutdown)) {
            eprintln!("[FLK-CLI] failed to register signal {signal}: {e}");
        }
    }

    let scenario = Scenario::for_run(1).with_description("capture");
    traces.start(&scenario)?;
    if output_mode(cli) == OutputMode::Human {
        println!("Capturing... (Ctrl-C to stop)");
    }

    let deadline = args
        .duration_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    while !shutdown.load(Ordering::Relaxed) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(SIGNAL_POLL);
    }

    let stopped = traces.stop();
    let leftovers = registry.stop_all_sessions();
    let StoppedCapture { artifact, error } = stopped?;
    if let Err(e) = leftovers {
        eprintln!("[FLK-CLI] failed to stop leftover tracers: {e}");
    }

    match output_mode(cli) {
        OutputMode::Human => println!("{}", artifact.path().display()),
        OutputMode::Json => {
            let entries: Vec<Value> = artifact
                .entries()
                .iter()
                .map(|e| json!({ "name": e.name, "file": e.file }))
                .collect();
            write_json_line(&json!({
                "command": "capture",
                "artifact": artifact.path().to_string_lossy(),
                "entries": entries,
            }))?;
        }
    }
    match error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

// ──────────────────── cleanup ────────────────────

fn run_cleanup(cli: &Cli, args: &CleanupArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let registry = registry_for(&config);
    let stopped = registry.cleanup_previous_runs()?;
    let removed = if args.artifacts {
        cleanup_stale_artifacts(&config.paths.output_root)?
    } else {
        0
    };

    match output_mode(cli) {
        OutputMode::Human => {
            if stopped.is_empty() {
                println!("No leftover tracer processes.");
            } else {
                println!("Stopped tracer pids: {stopped:?}");
            }
            if args.artifacts {
                println!("Removed {removed} stale artifact(s).");
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "cleanup",
            "stopped_pids": stopped,
            "removed_artifacts": removed,
        }))?,
    }
    Ok(())
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let hash = config.stable_hash()?;
    match output_mode(cli) {
        OutputMode::Human => {
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| CliError::User(format!("serialize config: {e}")))?;
            println!("# hash: {hash}");
            println!("{toml_str}");
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "config",
            "hash": hash,
            "config": serde_json::to_value(&config)?,
        }))?,
    }
    Ok(())
}

// ──────────────────── report ────────────────────

fn run_report(cli: &Cli, args: &ReportArgs) -> Result<(), CliError> {
    let text = fs::read_to_string(&args.status_file).map_err(|e| {
        CliError::User(format!("cannot read {}: {e}", args.status_file.display()))
    })?;
    match output_mode(cli) {
        OutputMode::Human => {
            let mut stdout = io::stdout().lock();
            for line in text.lines() {
                writeln!(stdout, "{}", colorize_line(line))?;
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "report",
            "path": args.status_file.to_string_lossy(),
            "ok": text.lines().any(|l| l.trim() == "status: OK"),
            "lines": text.lines().collect::<Vec<_>>(),
        }))?,
    }
    Ok(())
}

fn colorize_line(line: &str) -> String {
    let trimmed = line.trim_end();
    for status in ["ASSUMPTION_VIOLATION", "EXECUTION_ERROR", "PASS", "FAIL", "OK"] {
        if let Some(head) = trimmed.strip_suffix(status) {
            let painted = match status {
                "PASS" | "OK" => status.green().bold(),
                "ASSUMPTION_VIOLATION" => status.yellow(),
                _ => status.red().bold(),
            };
            return format!("{head}{painted}");
        }
    }
    if trimmed.starts_with("contract_violation") {
        return trimmed.red().to_string();
    }
    trimmed.to_string()
}

// ──────────────────── output helpers ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("FLICKER_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_before_and_after_subcommand() {
        let before = Cli::try_parse_from([
            "flicker",
            "--config",
            "/tmp/flicker.toml",
            "--json",
            "--no-color",
            "config",
        ]);
        assert!(before.is_ok());

        let after = Cli::try_parse_from(["flicker", "cleanup", "--json", "--artifacts"]);
        assert!(after.is_ok());
    }

    #[test]
    fn capture_requires_out() {
        assert!(Cli::try_parse_from(["flicker", "capture"]).is_err());
        let cli =
            Cli::try_parse_from(["flicker", "capture", "--out", "/tmp/x", "--duration-ms", "500"])
                .unwrap();
        match cli.command {
            Command::Capture(args) => assert_eq!(args.duration_ms, Some(500)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn output_mode_resolution() {
        assert_eq!(resolve_output_mode(true, Some("human"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("JSON"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, Some("auto"), false), OutputMode::Json);
    }

    #[test]
    fn colorize_keeps_text_without_color() {
        control::set_override(false);
        assert_eq!(colorize_line("  appVisible [BLOCKING] PASS"), "  appVisible [BLOCKING] PASS");
        assert_eq!(colorize_line("status: EXECUTION_ERROR"), "status: EXECUTION_ERROR");
        assert_eq!(colorize_line("scenario: run"), "scenario: run");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(CliError::User("x".into()).exit_code(), 1);
        let io_err = CliError::Io(io::Error::other("boom"));
        assert_eq!(io_err.exit_code(), 2);
    }
}
