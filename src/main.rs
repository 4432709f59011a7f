//! Optical Entropy Block CLI
//!
//! Runs one block generation session against the mock camera and delivers
//! blocks to a TCP relay or an output directory.

use clap::Parser;
use optical_entropy_blocks::{
    capture::MockCamera,
    config::{DeliveryMode, FileConfig},
    delivery::{DeliveryResult, DirectoryExportSink, Sinks, TcpRelaySink},
    metrics::MetricsRegistry,
    session::{
        BlockLifecycleController, SessionCommand, SessionEvent, SessionRunner, SessionSummary,
        STATUS_EXPORT_FAILED,
    },
};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "optical-entropy-blocks", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delivery mode: `network` or `local`.
    #[arg(long)]
    mode: Option<DeliveryMode>,

    /// Number of blocks to generate.
    #[arg(long, conflicts_with = "unlimited")]
    blocks: Option<u32>,

    /// Generate until interrupted.
    #[arg(long)]
    unlimited: bool,

    /// Relay recipient key (network mode).
    #[arg(long)]
    recipient: Option<String>,

    /// Relay address as host:port (network mode).
    #[arg(long)]
    relay: Option<String>,

    /// Output directory for exported blocks (local mode).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Also export the CSV histogram helper file.
    #[arg(long)]
    aux_csv: bool,

    /// Enable the chi-square warning at this threshold.
    #[arg(long)]
    chi_warning: Option<f64>,

    /// Seed for the mock camera's noise.
    #[arg(long)]
    seed: Option<u64>,

    /// Metrics server port (0 to disable; needs the `metrics` feature).
    #[arg(long)]
    metrics_port: Option<u16>,
}

impl Cli {
    fn apply(&self, file: &mut FileConfig) {
        let session = &mut file.session;
        if let Some(mode) = self.mode {
            session.delivery_mode = mode;
        }
        if let Some(blocks) = self.blocks {
            session.block_amount = blocks;
            session.block_amount_unlimited = false;
        }
        if self.unlimited {
            session.block_amount_unlimited = true;
        }
        if let Some(recipient) = &self.recipient {
            session.recipient_key = Some(recipient.clone());
        }
        if self.aux_csv {
            session.export_auxiliary_file = true;
        }
        if let Some(threshold) = self.chi_warning {
            session.chi_warning_enabled = true;
            session.chi_warning_threshold = threshold;
        }
        if let Some(relay) = &self.relay {
            file.relay.address = relay.clone();
        }
        if let Some(dir) = &self.output_dir {
            file.export.output_dir = dir.clone();
        }
        if let Some(port) = self.metrics_port {
            file.metrics.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Optical Entropy Blocks v{}", optical_entropy_blocks::VERSION);

    match run(cli).await {
        Ok(summary) => {
            println!(
                "Session ended: {} blocks, {} delivered, {} failed, {} cancelled, {} set aside",
                summary.blocks,
                summary.counts.delivered,
                summary.counts.failed,
                summary.counts.cancelled,
                summary.set_aside
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Session could not run");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<SessionSummary, Box<dyn std::error::Error>> {
    let mut file = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    cli.apply(&mut file);

    let session_config = file.session_config()?;
    std::fs::create_dir_all(&session_config.staging_dir)?;

    let sinks = match session_config.delivery_mode {
        DeliveryMode::Network => Sinks::network(Arc::new(TcpRelaySink::new(
            file.relay.address.clone(),
            Duration::from_millis(file.relay.timeout_ms),
        ))),
        DeliveryMode::Local => Sinks::local(Arc::new(DirectoryExportSink::new(
            file.export.output_dir.clone(),
        ))),
    };
    let controller = BlockLifecycleController::new(session_config, sinks)?;

    let metrics = Arc::new(MetricsRegistry::new()?);
    spawn_metrics_server(file.metrics.port, &metrics);

    let (close_tx, close_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Interrupt received; closing session");
        close_tx.send_replace(true);
    })?;

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    spawn_command_reader(commands_tx);

    let camera = match cli.seed {
        Some(seed) => MockCamera::with_seed(seed),
        None => MockCamera::new(),
    };
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let runner = SessionRunner::new(
        controller,
        Box::new(camera),
        file.capture.clone(),
        file.collector.clone(),
        events_tx,
    )
    .with_commands(commands_rx)
    .with_metrics(metrics);

    let printer = tokio::spawn(print_events(events_rx));
    let summary = runner.run(close_rx).await;
    printer.await?;
    Ok(summary)
}

#[cfg(feature = "metrics")]
fn spawn_metrics_server(port: u16, metrics: &Arc<MetricsRegistry>) {
    use optical_entropy_blocks::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), Arc::clone(metrics));
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            warn!(error = %e, "Metrics server stopped");
        }
    });
}

#[cfg(not(feature = "metrics"))]
fn spawn_metrics_server(port: u16, _metrics: &Arc<MetricsRegistry>) {
    if port != 0 {
        tracing::debug!(port, "Built without the metrics feature; not serving metrics");
    }
}

/// Reads `retry` / `skip` lines from stdin for failed local exports.
fn spawn_command_reader(commands: mpsc::UnboundedSender<SessionCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "retry" => SessionCommand::RetryFailed,
                "skip" => SessionCommand::SkipFailed,
                "" => continue,
                other => {
                    warn!(input = other, "Unknown command; expected `retry` or `skip`");
                    continue;
                }
            };
            if commands.send(command).is_err() {
                break;
            }
        }
    });
}

async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Stats(report) => tracing::debug!("{report}"),
            SessionEvent::Status(status) => {
                println!("[{status}]");
                if status == STATUS_EXPORT_FAILED {
                    println!("type `retry` or `skip` to continue");
                }
            }
            SessionEvent::Progress(p) => println!("progress {:.0}%", p * 100.0),
            SessionEvent::BlockHandedOff {
                index,
                label,
                bytes,
            } => println!("block {index} ({bytes} bytes) -> {label}"),
            SessionEvent::DeliveryFinished { index, result, .. } => match result {
                DeliveryResult::Delivered => println!("block {index} delivered"),
                DeliveryResult::Cancelled => println!("block {index} hand-off cancelled"),
                DeliveryResult::Failed(e) => println!("block {index} failed: {e}"),
            },
            SessionEvent::CaptureUnavailable => {
                println!("No camera available. Press Ctrl-C to exit.");
            }
            SessionEvent::Terminated => println!("[SESSION COMPLETE]"),
            SessionEvent::StateChanged(_) | SessionEvent::WalkExtended { .. } => {}
        }
    }
}
