//! coverd: supervised ingestion daemon for function-coverage telemetry.
//!
//! Exit codes: `0` after an operator stop, `1` after a fatal failure, `2` when the
//! configuration or the logging setup is unusable.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use coverd::config::{LogFormat, LogLevel, RecorderKind};
use coverd::{App, Config, LogRecorder, LogWriter, MemoryRecorder, Recorder, Subscribe};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "coverd")]
#[command(about = "Collects function-coverage events from local processes over Unix sockets")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket path prefix (overrides the configuration)
    #[arg(long)]
    socket_prefix: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the user the daemon should run as, then exit
    #[arg(long)]
    print_owner: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("coverd: {e:#}");
            return ExitCode::from(2);
        }
    };

    if cli.print_owner {
        println!("{}", cfg.owner());
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logging(&cfg, cli.verbose) {
        eprintln!("coverd: {e:#}");
        return ExitCode::from(2);
    }

    match run(cfg) {
        Ok(()) => {
            info!("coverd stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(err = %format!("{e:#}"), "coverd stopped on a fatal failure");
            ExitCode::from(1)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(prefix) = &cli.socket_prefix {
        cfg.socket_prefix = prefix.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn init_logging(cfg: &Config, verbose: u8) -> Result<()> {
    let level = match cfg.logging.level.raised(verbose) {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(true);
    match cfg.logging.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

fn run(cfg: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the runtime")?;

    let recorder: Arc<dyn Recorder> = match cfg.recorder.kind {
        RecorderKind::Log => Arc::new(LogRecorder),
        RecorderKind::Memory => Arc::new(MemoryRecorder::new(cfg.recorder.capacity)),
    };
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    info!(
        prefix = %cfg.socket_prefix.display(),
        cli = cfg.enable_cli,
        "coverd starting"
    );
    runtime.block_on(App::new(cfg, recorder, subscribers).run())?;
    Ok(())
}
