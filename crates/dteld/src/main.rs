//! dteld - DTEL Report Daemon
//!
//! Entry point for the dteld daemon.

use anyhow::Context;
use clap::Parser;
use sonic_dteld::{daemon, source, DiscardSink, DteldConfig, UdpReportSink, DEFAULT_CONFIG_PATH};
use sonic_dtel::{DtelEngine, ReportSink};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// SONiC Dataplane Telemetry report daemon
#[derive(Parser, Debug)]
#[command(name = "dteld")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Packet event file (newline-delimited JSON); overrides the config file
    #[arg(short = 'e', long)]
    events: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Build reports but do not send them
    #[arg(long)]
    dry_run: bool,
}

/// Initializes tracing/logging subsystem
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log level")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = DteldConfig::load_or_default(&args.config)?;
    if args.events.is_some() {
        config.daemon.events = args.events;
    }
    config.validate()?;

    let sink: Arc<dyn ReportSink> = if args.dry_run {
        info!("Dry run: reports are built and discarded");
        Arc::new(DiscardSink::new())
    } else {
        let bind: SocketAddr = config
            .daemon
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind_addr {}", config.daemon.bind_addr))?;
        Arc::new(UdpReportSink::bind(bind).await?)
    };

    let engine = Arc::new(DtelEngine::new(config.engine, sink));
    config.apply(&engine)?;

    let reader = source::open(config.daemon.events.as_deref()).await?;
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT");
        }
    };
    daemon::run(engine, &config, reader, shutdown).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("dteld: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting dteld ---");
    match run(args).await {
        Ok(()) => {
            info!("dteld exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("dteld failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
