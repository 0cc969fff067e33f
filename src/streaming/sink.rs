//! Downstream frame consumers

use crate::core::types::Frame;
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives every exported frame, in queue order, from the export thread
pub trait FrameSink: Send + Sync {
    fn deliver(&self, frame: Arc<Frame>) -> Result<()>;
}

/// In-process sink backed by a crossbeam channel
pub struct ChannelSink {
    tx: Sender<Arc<Frame>>,
}

impl ChannelSink {
    /// Unbounded channel sink and its receiving end
    pub fn unbounded() -> (Self, Receiver<Arc<Frame>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Bounded channel sink; frames are rejected while the channel is full
    pub fn bounded(capacity: usize) -> (Self, Receiver<Arc<Frame>>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn deliver(&self, frame: Arc<Frame>) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(f) => Error::Other(format!("sink full, frame {} dropped", f.unique_id)),
            TrySendError::Disconnected(_) => Error::Other("sink receiver dropped".to_string()),
        })
    }
}

/// Sink that only logs, used when no subscriber endpoint is configured
#[derive(Default)]
pub struct LogSink {
    delivered: AtomicU64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl FrameSink for LogSink {
    fn deliver(&self, frame: Arc<Frame>) -> Result<()> {
        let count = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
        log::trace!("frame {}: {:?}", frame.unique_id, frame.attributes);
        if count % 10_000 == 0 {
            log::debug!("Delivered {} frames", count);
        }
        Ok(())
    }
}
