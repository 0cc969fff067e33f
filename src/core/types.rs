//! Core data types shared by the acquisition threads.
//!
//! - [`DetectorState`]: connection/acquisition status published as the `Status` parameter
//! - [`Frame`]: one decoded event with its weighted channel values

use crate::protocol::EVENT_WORDS;
use serde::{Deserialize, Serialize};

/// Driver status.
///
/// Discriminants follow the areaDetector `ADStatus` enumeration so the integer
/// `Status` parameter carries the values host clients already understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum DetectorState {
    /// Connected, not acquiring
    Idle = 0,
    /// Acquisition loop running
    Acquiring = 1,
    /// Disconnect in progress
    Waiting = 7,
    /// Connect in progress
    Initializing = 8,
    /// No device socket
    Disconnected = 9,
}

impl DetectorState {
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for DetectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Acquiring => "Acquiring",
            Self::Waiting => "Waiting",
            Self::Initializing => "Initializing",
            Self::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}

/// Named scalar attached to a frame (one per output channel)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: f64,
}

/// One decoded event as delivered downstream.
///
/// `words[0]` is always the reset marker (0). Which of `words[1..]` carry data
/// depends on the event kind; unused slots are zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonic id within one acquisition run, starting at 1
    pub unique_id: u64,
    /// Wall clock at decode time, microseconds since the Unix epoch
    pub timestamp_us: u64,
    pub words: [i32; EVENT_WORDS],
    /// Channel values keyed by unique name, in order of first channel use
    pub attributes: Vec<Attribute>,
}

impl Frame {
    /// Create a frame with zeroed words and no attributes
    pub fn new(unique_id: u64) -> Self {
        Self {
            unique_id,
            timestamp_us: now_us(),
            words: [0; EVENT_WORDS],
            attributes: Vec::new(),
        }
    }

    /// Payload size in bytes (the `ArraySize` metric)
    #[inline]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<[i32; EVENT_WORDS]>()
    }

    /// Look up a channel value by name
    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value)
    }
}

/// Current time in microseconds since the Unix epoch
#[inline]
pub fn now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
