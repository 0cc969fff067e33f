//! Configuration for SoftGlue-IO
//!
//! Loads configuration from a TOML file. Only `[device]` is required; every
//! other section falls back to the defaults used on the beamline.
//!
//! ```toml
//! [device]
//! name = "SG1"
//! address = "164.54.100.20:8888"
//! max_outputs = 8
//!
//! [timing]
//! retry_interval_ms = 5000
//! acquire_poll_us = 100
//!
//! [[channel]]
//! index = 0
//! name = "x_position"
//! weights = [0.0, 1.0, -1.0]
//! ```

use crate::error::{Error, Result};
use crate::protocol::{EVENT_WORDS, MAX_PACKET_SIZE, PACKET_SIZE};
use crate::streaming::WireFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Port the SoftGlue socket server listens on when the address omits one
pub const DEFAULT_DEVICE_PORT: u16 = 8888;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub device: DeviceConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Output channels applied to the matrix at start-up
    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelConfig>,
}

/// Device identity and addressing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Driver instance name (port name in the host framework)
    pub name: String,
    /// `host` or `host:port` of the SoftGlue socket server
    pub address: String,
    /// Number of output channels the matrix can hold
    pub max_outputs: usize,
    /// Minimum available word count before a data pull (device firmware constant)
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
}

/// Polling cadences, backoff and socket timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Backoff between connect/disconnect attempts
    pub retry_interval_ms: u64,
    /// Cancellation wait between acquisition ticks
    pub acquire_poll_us: u64,
    /// Longest queue wait in the export pump before it rechecks shutdown
    pub export_poll_us: u64,
    /// Read/write timeout on the device socket
    pub io_timeout_ms: u64,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Consecutive protocol errors tolerated before an acquisition is ended
    pub max_tick_failures: u32,
}

/// Downstream frame streaming
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// TCP bind address for frame subscribers (disabled when absent)
    ///
    /// Examples:
    /// - `0.0.0.0:7000` - Bind to all interfaces on port 7000
    /// - `127.0.0.1:7000` - Localhost only
    pub publish_address: Option<String>,
    /// Payload encoding for published frames
    pub wire_format: WireFormat,
    /// Frames buffered for the publisher thread before new ones are dropped
    pub queue_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

/// One row of the output matrix
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub index: usize,
    pub name: String,
    /// Up to 24 weights, missing slots are zero
    #[serde(default)]
    pub weights: Vec<f64>,
}

fn default_packet_size() -> usize {
    PACKET_SIZE
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 5000,
            acquire_poll_us: 100,
            export_poll_us: 10_000,
            io_timeout_ms: 5000,
            connect_timeout_ms: 5000,
            max_tick_failures: 10,
        }
    }
}

impl TimingConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn acquire_poll(&self) -> Duration {
        Duration::from_micros(self.acquire_poll_us)
    }

    pub fn export_poll(&self) -> Duration {
        Duration::from_micros(self.export_poll_us)
    }

    /// Socket I/O timeout, `None` when disabled with 0
    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            publish_address: None,
            wire_format: WireFormat::default(),
            queue_capacity: 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Configuration for a device at `address` with `max_outputs` channels
    pub fn new(name: &str, address: &str, max_outputs: usize) -> Self {
        Self {
            device: DeviceConfig {
                name: name.to_string(),
                address: address.to_string(),
                max_outputs,
                packet_size: PACKET_SIZE,
            },
            timing: TimingConfig::default(),
            streaming: StreamingConfig::default(),
            logging: LoggingConfig::default(),
            channels: Vec::new(),
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use softglue_io::Config;
    ///
    /// let config = Config::load("softglue.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.device.max_outputs == 0 {
            return Err(Error::Config("device.max_outputs must be at least 1".to_string()));
        }
        if self.device.packet_size == 0 || self.device.packet_size > MAX_PACKET_SIZE {
            return Err(Error::Config(format!(
                "device.packet_size must be in 1..={}, got {}",
                MAX_PACKET_SIZE, self.device.packet_size
            )));
        }
        if self.streaming.queue_capacity == 0 {
            return Err(Error::Config(
                "streaming.queue_capacity must be at least 1".to_string(),
            ));
        }
        for channel in &self.channels {
            if channel.index >= self.device.max_outputs {
                return Err(Error::Config(format!(
                    "channel '{}' index {} exceeds max_outputs {}",
                    channel.name, channel.index, self.device.max_outputs
                )));
            }
            if channel.weights.len() > EVENT_WORDS {
                return Err(Error::Config(format!(
                    "channel '{}' has {} weights, at most {} allowed",
                    channel.name,
                    channel.weights.len(),
                    EVENT_WORDS
                )));
            }
        }
        Ok(())
    }
}
