//! Mock transport for testing
//!
//! [`MockTransport`] is a shared in-memory byte pipe. Bytes injected with
//! [`MockTransport::inject_read`] are returned by reads; writes are recorded.
//! With a [`SimDevice`] attached the mock also answers `sendnumw`/`senddata`
//! like the SoftGlue socket server, serving queued packets.

use super::{Connector, Transport};
use crate::error::{Error, Result};
use crate::protocol::{CMD_SEND_DATA, CMD_SEND_NUMW, WORD_COUNT_LEN};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Scripted SoftGlue device
pub struct SimDevice {
    packet_words: usize,
    packets: VecDeque<Vec<u32>>,
    /// Word count reported while no packet is queued
    idle_count: i64,
}

impl SimDevice {
    /// Device that serves packets of `packet_words` words
    pub fn new(packet_words: usize) -> Self {
        Self {
            packet_words,
            packets: VecDeque::new(),
            idle_count: 0,
        }
    }

    /// Queue one packet; shorter packets are zero padded
    pub fn queue_packet(&mut self, words: Vec<u32>) {
        self.packets.push_back(words);
    }

    /// Word count reported when nothing is queued
    pub fn set_idle_count(&mut self, count: i64) {
        self.idle_count = count;
    }

    fn answer(&mut self, command: &[u8], out: &mut VecDeque<u8>) {
        if command == CMD_SEND_NUMW {
            let count = if self.packets.is_empty() {
                self.idle_count
            } else {
                self.packet_words as i64
            };
            let reply = format!("{:<width$}", count, width = WORD_COUNT_LEN);
            out.extend(reply.as_bytes());
        } else if command == CMD_SEND_DATA {
            let mut words = self.packets.pop_front().unwrap_or_default();
            words.resize(self.packet_words, 0);
            for word in words {
                out.extend(word.to_ne_bytes());
            }
        } else {
            log::warn!("SimDevice: unknown command {:?}", String::from_utf8_lossy(command));
        }
    }
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    pending_command: Vec<u8>,
    device: Option<SimDevice>,
    closed: bool,
    close_failures: usize,
    close_calls: usize,
}

/// Mock transport for unit testing
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                pending_command: Vec::new(),
                device: None,
                closed: false,
                close_failures: 0,
                close_calls: 0,
            })),
        }
    }

    /// Create a mock that answers like a device
    pub fn with_device(device: SimDevice) -> Self {
        let mock = Self::new();
        mock.lock().device = Some(device);
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.lock().read_buffer.extend(data);
    }

    /// Queue a packet on the attached device
    pub fn queue_packet(&self, words: Vec<u32>) {
        if let Some(device) = self.lock().device.as_mut() {
            device.queue_packet(words);
        }
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.lock().write_buffer.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.lock().write_buffer.clear();
    }

    /// Make the next `count` calls to `close()` fail
    pub fn fail_close(&self, count: usize) {
        self.lock().close_failures = count;
    }

    /// Number of `close()` calls so far
    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Bytes waiting to be read
    pub fn available(&self) -> usize {
        self.lock().read_buffer.len()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(Error::ConnectionClosed);
        }
        let available = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(Error::ConnectionClosed);
        }
        inner.write_buffer.extend_from_slice(data);

        if inner.device.is_some() {
            inner.pending_command.extend_from_slice(data);
            while inner.pending_command.len() >= CMD_SEND_NUMW.len() {
                let command: Vec<u8> = inner.pending_command.drain(..CMD_SEND_NUMW.len()).collect();
                let MockTransportInner {
                    device,
                    read_buffer,
                    ..
                } = &mut *inner;
                if let Some(device) = device.as_mut() {
                    device.answer(&command, read_buffer);
                }
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut inner = self.lock();
        inner.close_calls += 1;
        if inner.close_failures > 0 {
            inner.close_failures -= 1;
            return Err(Error::Other("simulated close failure".to_string()));
        }
        inner.closed = true;
        Ok(())
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Connector handing out clones of one [`MockTransport`]
pub struct MockConnector {
    transport: MockTransport,
    failures_before_success: usize,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            failures_before_success: 0,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Refuse the first `failures` connect attempts
    pub fn failing(transport: MockTransport, failures: usize) -> Self {
        Self {
            failures_before_success: failures,
            ..Self::new(transport)
        }
    }

    /// Shared counter of connect attempts
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures_before_success {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "simulated refusal",
            )));
        }
        Ok(Box::new(self.transport.clone()))
    }

    fn target(&self) -> String {
        "mock".to_string()
    }
}
