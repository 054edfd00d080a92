// src/main.rs
//
// CLI entrypoint for the regular-vs-debug parity harness.
//
// Constraints:
// - Config precedence: CLI flags > SIMPARITY_* env > --config YAML > defaults.
// - Report on stdout (text or JSON); diagnostics via tracing on stderr.
// - Exit codes: 0 all outputs match, 1 any failure or interrupt,
//   2 usage / configuration error.
// - SIGINT/SIGTERM kill the running simulator's process group before exiting.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use simparity::config::HarnessConfig;
use simparity::parity::provenance::ExecutableInfo;
use simparity::parity::report::{write_header, write_json, write_report};
use simparity::parity::runner::kill_active_process_group;
use simparity::parity::{ComparisonDriver, ComparisonReport, RunOrchestrator, ShellRunner, Variant};
use simparity::telemetry::TelemetrySink;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "simparity",
    about = "Verify that debug instrumentation does not change simulation results",
    version
)]
struct Args {
    /// Harness config (YAML). Missing fields take built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Test case directory (simulator working directory).
    #[arg(long)]
    test_dir: Option<PathBuf>,

    /// Regular build of the simulator.
    #[arg(long)]
    regular_exe: Option<PathBuf>,

    /// Debug (instrumented) build of the simulator.
    #[arg(long)]
    debug_exe: Option<PathBuf>,

    /// Parallel launcher, e.g. `mpirun` or `srun`.
    #[arg(long)]
    launcher: Option<String>,

    /// Process count passed to the launcher as `-np`.
    #[arg(short = 'n', long)]
    processes: Option<u32>,

    /// Per-variant wall-clock timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Maximum absolute difference allowed for numeric outputs.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Report format on stdout.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// The simulator runs in its own process group and never sees a terminal
/// Ctrl-C, so forward the interrupt by killing that group.
fn install_interrupt_handler() {
    let installed = ctrlc::set_handler(|| {
        let group = kill_active_process_group();
        error!(?group, "interrupted; simulator process group killed");
        process::exit(1);
    });
    if let Err(err) = installed {
        warn!(error = %err, "could not install interrupt handler");
    }
}

/// Resolve the effective config: file, then env, then CLI flags.
fn resolve_config(args: &Args) -> Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_yaml_file(path)?,
        None => HarnessConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(dir) = &args.test_dir {
        config.test_dir = dir.clone();
    }
    if let Some(exe) = &args.regular_exe {
        config.regular_exe = exe.clone();
    }
    if let Some(exe) = &args.debug_exe {
        config.debug_exe = exe.clone();
    }
    if let Some(launcher) = &args.launcher {
        config.launcher = launcher.clone();
    }
    if let Some(n) = args.processes {
        config.processes = n;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = secs;
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }

    config.validate()?;
    Ok(config)
}

fn write_fingerprints<W: Write>(out: &mut W, config: &HarnessConfig) -> io::Result<()> {
    for (variant, path) in [
        (Variant::Regular, &config.regular_exe),
        (Variant::Debug, &config.debug_exe),
    ] {
        if !Path::new(path).is_file() {
            continue;
        }
        match ExecutableInfo::capture(variant, path) {
            Ok(info) => writeln!(
                out,
                "{} build: {} (sha256 {})",
                variant,
                info.file_name(),
                info.short()
            )?,
            Err(err) => warn!(variant = variant.as_str(), error = %err, "could not fingerprint executable"),
        }
    }
    writeln!(out)?;
    Ok(())
}

fn run(args: &Args, config: &HarnessConfig) -> Result<ComparisonReport> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.format == OutputFormat::Text {
        write_header(&mut out, config.tolerance).context("Failed to write header")?;
        write_fingerprints(&mut out, config).context("Failed to write fingerprints")?;
        out.flush()?;
    }

    let orchestrator =
        RunOrchestrator::new(ShellRunner::default()).with_success_marker(&config.success_marker);
    let mut driver = ComparisonDriver::new(orchestrator)
        .with_classifier(config.classifier())
        .with_tolerance(config.tolerance)
        .with_telemetry(TelemetrySink::from_env());

    let report = driver.run_full_comparison(
        &config.run_configuration(Variant::Regular),
        &config.run_configuration(Variant::Debug),
        &config.categories(),
    )?;

    let written = match args.format {
        OutputFormat::Text => write_report(&mut out, &report),
        OutputFormat::Json => write_json(&mut out, &report),
    };
    written.context("Failed to write report")?;
    out.flush()?;

    Ok(report)
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);
    install_interrupt_handler();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {err:#}");
            process::exit(2);
        }
    };

    match run(&args, &config) {
        Ok(report) => process::exit(report.exit_code()),
        Err(err) => {
            error!("{err:?}");
            process::exit(1);
        }
    }
}
