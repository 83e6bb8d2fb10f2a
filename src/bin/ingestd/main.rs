// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::error::Error;
use std::process::ExitCode;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use ingestd::ingest::{Ingestor, IngestorConfig};
use ingestd::init::args::IngestArgs;
use ingestd::init::config::build_config;

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Backfill existing files, then ingest changes until interrupted
    Start(IngestArgs),

    /// Ingest everything currently on disk once and exit
    Backfill(IngestArgs),

    /// Print a JSON snapshot of the event store
    Status(IngestArgs),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "ingestd")]
#[command(bin_name = "ingestd")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "INGESTD_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let args = match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version());
            return ExitCode::SUCCESS;
        }
        Some(Commands::Start(ref args))
        | Some(Commands::Backfill(ref args))
        | Some(Commands::Status(ref args)) => args.clone(),
        None => {
            // Unreachable while a subcommand is required
            eprintln!("ERROR: must specify a command");
            return ExitCode::from(2);
        }
    };

    let _guard = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration.");
            return ExitCode::from(1);
        }
    };

    let result = match opt.command {
        Some(Commands::Start(_)) => run_start(config),
        Some(Commands::Backfill(_)) => run_backfill(config),
        Some(Commands::Status(_)) => run_status(config),
        _ => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error.");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run_start(config: IngestorConfig) -> Result<(), BoxError> {
    let mut ingestor = Ingestor::open(config)?;
    let summary = ingestor.start_watching()?;
    info!(
        files = summary.files_processed,
        events = summary.events_inserted,
        "Initial backfill done, watching for changes."
    );

    let cancel = CancellationToken::new();
    let result = {
        let run = ingestor.run(cancel.clone());
        tokio::pin!(run);

        select! {
            res = &mut run => {
                warn!("Unexpected early exit of ingestion loop.");
                res
            },
            sig = signal_wait() => {
                sig?;
                info!("Shutdown signal received.");
                cancel.cancel();
                run.await
            },
        }
    };

    ingestor.close()?;
    result?;
    Ok(())
}

fn run_backfill(config: IngestorConfig) -> Result<(), BoxError> {
    let mut ingestor = Ingestor::open(config)?;
    let summary = ingestor.ingest_existing()?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    ingestor.close()?;
    Ok(())
}

fn run_status(config: IngestorConfig) -> Result<(), BoxError> {
    let mut ingestor = Ingestor::open_existing(config)?;
    let status = ingestor.status()?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    ingestor.close()?;
    Ok(())
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

// Logs go to stderr so stdout stays clean for command output
fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("notify=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stderr().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}

async fn signal_wait() -> std::io::Result<()> {
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
    Ok(())
}
