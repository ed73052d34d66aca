//! IMU recorder - command-line entry point
//!
//! Records a session from the simulated IMU, resumes the persisted session
//! after an unannounced restart, and inspects or clears the session record.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{bounded, RecvTimeoutError};
use imu_recorder::{
    ErrorKind, RecorderConfig, RecorderError, RecorderService, SensorHub, SessionStateStore,
    SimulatedImu, StartOutcome, StopOutcome,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit code when a relaunch finds no session to resume
const EXIT_RECOVERY_FAILURE: u8 = 2;

/// How often the record loop reports progress
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "imu-recorder",
    version,
    about = "Crash-safe accelerometer and gyroscope recorder"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Recorder configuration (TOML)
    #[arg(long, global = true, env = "IMU_RECORDER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for session files and the session record
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Start (or reopen) a named session
    Record(RecordArgs),
    /// Resume the session persisted before the last restart
    Resume(RunArgs),
    /// Show the persisted session record
    Status,
    /// Remove the persisted session record
    Clear,
}

#[derive(Args)]
struct RecordArgs {
    /// Session id; names the file sensor_data_<id>.csv
    #[arg(long)]
    session: String,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct RunArgs {
    /// Sampling rate in Hz (defaults to the configured rate)
    #[arg(long)]
    rate: Option<u32>,

    /// Stop after this many seconds instead of waiting for Enter
    #[arg(long)]
    duration: Option<f64>,
}

fn init_logging(verbose: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_filter = match verbose {
        0 => "info,imu_recorder=debug",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "imu-recorder.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn load_config(cli: &Cli) -> anyhow::Result<RecorderConfig> {
    let mut config = match &cli.config {
        Some(path) => RecorderConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RecorderConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

fn record(config: RecorderConfig, session: Option<String>, args: &RunArgs) -> anyhow::Result<()> {
    let rate = args.rate.unwrap_or(config.target_rate_hz);

    let hub = SensorHub::new();
    let mut imu = SimulatedImu::new(rate.max(1));
    imu.start(hub.feed())?;

    let service = RecorderService::new(config, hub)?;
    let outcome = match session {
        Some(id) => service.start_session(id, rate)?,
        None => service.resume(rate)?,
    };
    let info = outcome.info();
    match &outcome {
        StartOutcome::Resumed(_) => println!(
            "Resumed session '{}' (started {}) -> {}",
            info.session_id,
            info.started_at.to_rfc3339(),
            info.file_path.display()
        ),
        _ => println!(
            "Recording session '{}' at {} Hz -> {}",
            info.session_id,
            rate,
            info.file_path.display()
        ),
    }

    wait_for_stop(&service, args.duration)?;

    let stop = service.stop()?;
    imu.stop();
    if let StopOutcome::Stopped {
        session_id,
        file_path,
        rows_written,
    } = stop
    {
        println!(
            "Stopped session '{}': {} rows in {}",
            session_id,
            rows_written,
            file_path.display()
        );
    }
    Ok(())
}

fn wait_for_stop(service: &RecorderService, duration: Option<f64>) -> anyhow::Result<()> {
    let (tx, rx) = bounded::<()>(1);
    let deadline = match duration {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            Some(Instant::now() + Duration::from_secs_f64(secs))
        }
        Some(secs) => bail!("invalid --duration {}", secs),
        None => {
            println!("Press Enter to stop");
            let tx = tx.clone();
            std::thread::spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
                let _ = tx.send(());
            });
            None
        }
    };

    loop {
        let wait = deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(STATUS_INTERVAL)
            .min(STATUS_INTERVAL);
        match rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Err(RecvTimeoutError::Timeout) => {}
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(());
        }

        if !service.is_recording() {
            let reason = service
                .last_fault()
                .map(|f| format!("{}: {}", f.kind, f.message))
                .unwrap_or_else(|| "unknown".into());
            bail!("recording stopped unexpectedly ({})", reason);
        }

        let stats = service.stats();
        tracing::info!(
            samples = stats.samples_produced,
            written = stats.rows_written,
            buffered = stats.rows_buffered,
            stale = stats.stale_samples,
            rate_hz = format_args!("{:.1}", stats.achieved_rate_hz),
            "Recording"
        );
    }
}

fn status(config: &RecorderConfig) -> anyhow::Result<()> {
    let store = SessionStateStore::new(config.state_path()?);
    match store.load()? {
        Some(record) => {
            let rows = std::fs::read_to_string(&record.file_path)
                .map(|c| c.lines().count().saturating_sub(1))
                .ok();
            println!("{}", serde_json::to_string_pretty(&record)?);
            match rows {
                Some(rows) => println!("{} rows on disk", rows),
                None => println!("session file {} is missing", record.file_path.display()),
            }
        }
        None => println!("No persisted session ({})", store.path().display()),
    }
    Ok(())
}

fn clear(config: &RecorderConfig) -> anyhow::Result<()> {
    let store = SessionStateStore::new(config.state_path()?);
    store.clear()?;
    println!("Cleared {}", store.path().display());
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Record(args) => record(config, Some(args.session), &args.run),
        Command::Resume(args) => record(config, None, &args),
        Command::Status => status(&config),
        Command::Clear => clear(&config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_dir.as_deref());

    tracing::info!("Starting IMU recorder");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let recovery_failed = e
                .downcast_ref::<RecorderError>()
                .is_some_and(|re| re.kind() == ErrorKind::RecoveryFailure);
            tracing::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            if recovery_failed {
                ExitCode::from(EXIT_RECOVERY_FAILURE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
