//! `rover-cli` – command line front end of the rover pose estimator.
//!
//! ```text
//! rover replay <log.jsonl> [--speedup N]   replay a recorded sensor log
//! rover config                             print the effective configuration
//! rover init [--force]                     write ~/.rover/config.toml defaults
//! ```
//!
//! `replay` prints every fused pose as it is published, then a summary of
//! the final state.  **Ctrl-C** stops a replay gracefully: queued updates are
//! still applied and the summary is still printed.

mod config;
mod session;
mod telemetry;

use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::warn;

use rover_middleware::ReplayAdapter;
use rover_perception::DiagnosticSummary;
use rover_types::{Pose, RoverError};

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Replay {
        log: PathBuf,
        /// Reproduce recorded timing this many times faster than real time.
        speedup: Option<f64>,
    },
    Config,
    Init {
        force: bool,
    },
    Help,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    // ── Structured logging ────────────────────────────────────────────────
    // Logs go to stderr; stdout carries the user-facing pose stream.
    let _telemetry = telemetry::init_tracing("rover");

    let result = match command {
        Command::Replay { log, speedup } => run_replay(log, speedup),
        Command::Config => show_config(),
        Command::Init { force } => init_config(force),
        Command::Help => {
            print_usage();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument parsing
// ─────────────────────────────────────────────────────────────────────────────

fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some((cmd, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match cmd.as_str() {
        "replay" => {
            let mut log = None;
            let mut speedup = None;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--speedup" => {
                        let value = iter
                            .next()
                            .ok_or_else(|| "--speedup needs a value".to_string())?;
                        let factor = value
                            .parse::<f64>()
                            .ok()
                            .filter(|f| f.is_finite() && *f > 0.0)
                            .ok_or_else(|| format!("invalid speed-up factor '{value}'"))?;
                        speedup = Some(factor);
                    }
                    other if other.starts_with("--") => {
                        return Err(format!("unknown option '{other}'"));
                    }
                    other if log.is_none() => log = Some(PathBuf::from(other)),
                    other => return Err(format!("unexpected argument '{other}'")),
                }
            }
            let log = log.ok_or_else(|| "replay needs a log file".to_string())?;
            Ok(Command::Replay { log, speedup })
        }
        "config" if rest.is_empty() => Ok(Command::Config),
        "config" => Err("usage: rover config".to_string()),
        "init" => match rest {
            [] => Ok(Command::Init { force: false }),
            [flag] if flag == "--force" => Ok(Command::Init { force: true }),
            _ => Err("usage: rover init [--force]".to_string()),
        },
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn print_usage() {
    println!();
    println!("  {} {}",
        "rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  GNSS / IMU / odometry pose estimator");
    println!();
    println!("  {}", "Commands:".bold());
    println!("    {}  replay a recorded sensor log", "replay <log.jsonl> [--speedup N]".cyan());
    println!("    {}                            print the effective configuration", "config".cyan());
    println!("    {}                      write default configuration", "init [--force]".cyan());
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn run_replay(log: PathBuf, speedup: Option<f64>) -> Result<(), String> {
    let cfg = config::effective()?;
    let mut adapter = ReplayAdapter::from_path(&log).map_err(|e| describe(&log, e))?;
    if let Some(factor) = speedup {
        adapter = adapter.paced(factor);
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let stop = Arc::new(Notify::new());
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let interrupted = interrupted.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if !interrupted.swap(true, Ordering::SeqCst) {
                eprintln!();
                eprintln!("{}", "⚠  Ctrl-C received – stopping replay …".yellow().bold());
                stop.notify_one();
            }
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will abort without a summary");
        }
    }

    println!(
        "\n  Replaying {} ({} updates)\n",
        log.display().to_string().bold(),
        adapter.len()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start Tokio runtime: {e}"))?;

    let outcome = runtime
        .block_on(session::run(&cfg, adapter, stop, |pose| {
            println!("  {}", format_pose(pose));
        }))
        .map_err(|e| e.to_string())?;

    print_summary(&outcome);
    Ok(())
}

fn show_config() -> Result<(), String> {
    let cfg = config::effective()?;
    let path = config::config_path();
    if path.exists() {
        println!("# loaded from {}", path.display());
    } else {
        println!("# {} not found, showing defaults", path.display());
    }
    let raw = toml::to_string_pretty(&cfg)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;
    print!("{raw}");
    Ok(())
}

fn init_config(force: bool) -> Result<(), String> {
    let path = config::config_path();
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    config::save(&config::Config::default())?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn format_pose(pose: &Pose) -> String {
    format!(
        "{}  x={:>10.3}  y={:>10.3}  h={:>8.3}  yaw={:>8.2}°  roll={:>6.2}°  pitch={:>6.2}°",
        pose.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
        pose.x,
        pose.y,
        pose.height,
        pose.yaw,
        pose.roll,
        pose.pitch
    )
}

fn print_summary(outcome: &session::ReplayOutcome) {
    let fused = outcome.report.state.fused_pose();
    println!();
    if outcome.interrupted {
        println!("  {}", "Replay interrupted".yellow().bold());
    } else {
        println!("  {}", "Replay complete".green().bold());
    }
    println!("  updates applied   {}", outcome.report.applied);
    println!("  poses published   {}", outcome.published);
    println!("  final fused pose  {}", format_pose(&fused));
    println!("  yaw offset        {:.3}°", outcome.report.yaw_offset);
    print_diagnostics(&outcome.diagnostics);
}

fn print_diagnostics(summary: &DiagnosticSummary) {
    if summary.total() == 0 {
        println!("  diagnostics       {}", "none".green());
        return;
    }
    println!("  diagnostics       {}", summary.total().to_string().yellow());
    let rows = [
        ("stale GNSS overwrite", summary.stale_gnss_overwrite),
        ("yaw out of range", summary.yaw_out_of_range),
        ("odometry not propagated", summary.odometry_not_propagated),
        ("sensor silent", summary.sensor_silent),
    ];
    for (label, count) in rows.into_iter().filter(|(_, n)| *n > 0) {
        println!("    • {label:<24} {count}");
    }
}

fn describe(log: &std::path::Path, err: RoverError) -> String {
    match err {
        RoverError::Replay { line, details } => {
            format!("{}:{}: {}", log.display(), line, details)
        }
        other => format!("{}: {}", log.display(), other),
    }
}
