//! SoftGlue-IO daemon
//!
//! Connects to a SoftGlue socket server, decodes its event stream and
//! publishes frames to TCP subscribers.
//!
//! # Usage
//!
//! ```bash
//! # From a configuration file
//! softglue-io --config softglue.toml
//!
//! # Without a file: name, device address and channel count
//! softglue-io --name SG1 --address 164.54.100.20 --max-outputs 8 \
//!     --publish 0.0.0.0:7000 --acquire
//! ```

use clap::Parser;
use softglue_io::error::{Error, Result};
use softglue_io::{Config, DetectorState, FrameSink, LogSink, Param, SoftGlueDriver, TcpPublisher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(
    name = "softglue-io",
    version,
    about = "Acquisition driver for SoftGlue timing/coincidence counters"
)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Driver instance name
    #[arg(long)]
    name: Option<String>,

    /// Device address (host or host:port, port defaults to 8888)
    #[arg(short, long)]
    address: Option<String>,

    /// Number of output channels
    #[arg(short = 'm', long)]
    max_outputs: Option<usize>,

    /// Bind address for frame subscribers (e.g. 0.0.0.0:7000)
    #[arg(short, long)]
    publish: Option<String>,

    /// Start acquiring as soon as the device is connected
    #[arg(long)]
    acquire: bool,
}

/// Build the configuration from the file (if any) and command line overrides
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            let address = args.address.as_deref().ok_or_else(|| {
                Error::Config("--address is required without --config".to_string())
            })?;
            Config::new(
                args.name.as_deref().unwrap_or("SG1"),
                address,
                args.max_outputs.unwrap_or(8),
            )
        }
    };

    if let Some(name) = &args.name {
        config.device.name = name.clone();
    }
    if let Some(address) = &args.address {
        config.device.address = address.clone();
    }
    if let Some(max_outputs) = args.max_outputs {
        config.device.max_outputs = max_outputs;
    }
    if let Some(publish) = &args.publish {
        config.streaming.publish_address = Some(publish.clone());
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("SoftGlue-IO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Device: {} at {} ({} outputs)",
        config.device.name,
        config.device.address,
        config.device.max_outputs
    );

    let publisher = match &config.streaming.publish_address {
        Some(address) => Some(Arc::new(TcpPublisher::new(
            address,
            config.streaming.wire_format,
            config.streaming.queue_capacity,
        )?)),
        None => None,
    };
    let sink: Arc<dyn FrameSink> = match &publisher {
        Some(publisher) => Arc::clone(publisher) as Arc<dyn FrameSink>,
        None => {
            log::info!("No publish address configured, frames are only counted");
            Arc::new(LogSink::new())
        }
    };

    let driver = SoftGlueDriver::new(config, sink)?;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    driver.request_connect()?;
    log::info!("SoftGlue-IO running. Press Ctrl-C to stop.");

    let mut acquire_pending = args.acquire;
    let mut last_stats = Instant::now();
    while running.load(Ordering::Relaxed) {
        if acquire_pending && driver.state() == DetectorState::Idle {
            driver.write_int32(Param::Acquire, 0, 1)?;
            acquire_pending = false;
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            last_stats = Instant::now();
            log::info!(
                "Status {}: {} frames exported, {} queued (high water {})",
                driver.state(),
                driver.params().get_int(Param::ArrayCounter, 0),
                driver.queued_frames(),
                driver.queue_high_water_mark()
            );
            if let Some(publisher) = &publisher {
                log::info!(
                    "Publisher: {} subscribers, {} published, {} dropped",
                    publisher.client_count(),
                    publisher.published(),
                    publisher.dropped()
                );
            }
        }

        thread::sleep(Duration::from_millis(50));
    }

    // Shutdown
    log::info!("Shutting down...");
    driver.shutdown();
    drop(driver);
    drop(publisher);

    log::info!("SoftGlue-IO stopped");
    Ok(())
}
