use anyhow::{anyhow, Context};
use clap::Parser;
use log::{error, info, warn};
use monitor_tree::config::Config;
use monitor_tree::error::IngestError;
use monitor_tree::events::LeafStateChange;
use monitor_tree::processor::{read_events, EventProcessor};
use monitor_tree::telemetry::{self, LogSink, TelemetrySink};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

type IngestResult = Result<LeafStateChange, IngestError>;

/// Command-line arguments for the monitor tree engine
#[derive(Parser)]
#[command(
    name = "monitor-tree",
    about = "Health monitor tree engine",
    long_about = "Reads leaf monitor state changes as JSON lines, resolves each monitor \
                  instance up its configured parent chain, and keeps aggregate health \
                  for every node of the tree."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Leaf state change stream
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "JSON lines file of leaf state changes (defaults to stdin)"
    )]
    events: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// A missing configuration file is allowed and falls back to defaults; a
    /// missing event file is not.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        if let Some(ref events_path) = self.events {
            if !events_path.is_file() {
                return Err(format!(
                    "Event stream is not a readable file: {}",
                    events_path.display()
                ));
            }
        }

        Ok(())
    }
}

/// Spawn the thread that parses the event stream and forwards it
///
/// The thread blocks on reads, so it is detached rather than joined.
fn spawn_reader_thread(events: Option<PathBuf>, sender: Sender<IngestResult>) -> io::Result<()> {
    let file = events.as_ref().map(File::open).transpose()?;

    std::thread::spawn(move || {
        info!("Event reader thread started");

        let results: Box<dyn Iterator<Item = IngestResult>> = match file {
            Some(file) => Box::new(read_events(BufReader::new(file))),
            None => Box::new(read_events(io::stdin().lock())),
        };

        for result in results {
            if sender.send(result).is_err() {
                break;
            }
        }

        info!("Event reader thread stopped");
    });

    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate().map_err(|e| anyhow!("Invalid arguments: {}", e))?;

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let mut processor =
        EventProcessor::from_config(&config).context("Invalid monitor configuration")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let sink: Arc<dyn TelemetrySink> = Arc::new(LogSink::new());
    let (telemetry_handle, rollup) = telemetry::channel(config.rollup_settings(), sink);
    let (stop_sender, stop_receiver) = watch::channel(false);
    let rollup_task = runtime.spawn(rollup.run(stop_receiver));
    processor = processor.with_telemetry(telemetry_handle);

    let (shutdown_sender, shutdown_receiver) = mpsc::channel();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    let (event_sender, event_receiver) = mpsc::channel();
    spawn_reader_thread(cli.events.clone(), event_sender).context("Failed to open event stream")?;

    info!("Monitor tree engine is running. Press Ctrl+C to stop.");

    loop {
        if shutdown_receiver.try_recv().is_ok() {
            info!("Shutdown requested");
            break;
        }

        match event_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(event)) => {
                processor.handle(&event);
            }
            Ok(Err(e)) => warn!("Skipping malformed event: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Event stream ended");
                break;
            }
        }
    }

    let stats = processor.stats();
    info!(
        "Processed {} events, dropped {}",
        stats.processed, stats.dropped
    );
    for root in processor.store().roots() {
        info!(
            "{} [{}]: {:?} ({} children)",
            root.monitor_id,
            root.instance_id,
            root.state,
            root.children.len()
        );
    }

    drop(processor);
    let _ = stop_sender.send(true);
    runtime
        .block_on(rollup_task)
        .context("Telemetry rollup task failed")?;

    info!("Monitor tree engine shutdown complete");
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting monitor tree engine");

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
