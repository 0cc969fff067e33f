//! SoftGlue acquisition driver
//!
//! [`SoftGlueDriver`] owns the device link and three kinds of background
//! threads:
//!
//! - `softglue-connect` / `softglue-disconnect`: retry loops that open or
//!   close the device socket ([`connection`])
//! - `softglue-acquire`: polls the device, decodes events and queues frames
//!   ([`acquisition`])
//! - `softglue-export`: drains the frame queue into the [`FrameSink`]
//!   ([`export`])
//!
//! ## State machine
//!
//! ```text
//!   Disconnected ──request_connect──▶ Initializing ──connected──▶ Idle
//!        ▲                                                      │  ▲
//!        │                                          Acquire=1   │  │ Acquire=0 / error
//!     closed                                                    ▼  │
//!        │                                                    Acquiring
//!     Waiting ◀──request_disconnect (only from Idle)── Idle
//! ```
//!
//! Every status and socket transition happens under the link lock. Parameter
//! changes are published after the lock is released so listeners may call
//! back into the driver.

mod acquisition;
mod connection;
mod export;

use crate::config::Config;
use crate::core::params::{Param, ParamStore};
use crate::core::types::DetectorState;
use crate::error::{Error, Result};
use crate::matrix::OutputMatrix;
use crate::queue::FrameQueue;
use crate::streaming::{FrameSink, LogSink};
use crate::transport::{Connector, TcpConnector, Transport};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Device socket shared between the link and the acquisition thread
pub(crate) type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Connection state and the resources it guards
pub(crate) struct Link {
    pub(crate) state: DetectorState,
    pub(crate) transport: Option<SharedTransport>,
    /// Cancels the running acquisition
    pub(crate) cancel: Option<Sender<()>>,
}

#[derive(Default)]
struct Tasks {
    connect: Option<JoinHandle<()>>,
    disconnect: Option<JoinHandle<()>>,
    acquire: Option<JoinHandle<()>>,
    export: Option<JoinHandle<()>>,
}

impl Tasks {
    fn take_all(&mut self) -> Vec<JoinHandle<()>> {
        [
            self.acquire.take(),
            self.connect.take(),
            self.disconnect.take(),
            self.export.take(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Replace a task slot, reaping the previous thread if it already finished
fn store_task(slot: &mut Option<JoinHandle<()>>, handle: JoinHandle<()>) {
    if let Some(previous) = slot.replace(handle) {
        if previous.is_finished() {
            let _ = previous.join();
        }
    }
}

/// State shared by the driver handle and its threads
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) params: ParamStore,
    pub(crate) matrix: OutputMatrix,
    pub(crate) queue: FrameQueue,
    pub(crate) link: Mutex<Link>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) sink: Arc<dyn FrameSink>,
    shutdown: AtomicBool,
    /// Dropped on shutdown so retry waits wake immediately
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    export_started: AtomicBool,
    tasks: Mutex<Tasks>,
}

impl Shared {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Change status under the link lock; the caller publishes afterwards
    pub(crate) fn set_state(&self, link: &mut Link, state: DetectorState) {
        if link.state != state {
            log::debug!("{}: {} -> {}", self.config.device.name, link.state, state);
        }
        link.state = state;
        self.params.set_int(Param::Status, 0, state.as_i32());
    }

    /// Sleep one retry interval; false when the driver is shutting down
    pub(crate) fn wait_retry(&self) -> bool {
        self.wait(self.config.timing.retry_interval())
    }

    fn wait(&self, timeout: Duration) -> bool {
        match self.shutdown_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => !self.is_shutting_down(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Start the export pump once, after the first successful connect
    pub(crate) fn ensure_export_pump(self: &Arc<Self>) {
        if self
            .export_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let shared = Arc::clone(self);
        match thread::Builder::new()
            .name("softglue-export".to_string())
            .spawn(move || export::run(&shared))
        {
            Ok(handle) => self.tasks.lock().export = Some(handle),
            Err(e) => {
                log::error!("Failed to spawn export thread: {}", e);
                self.export_started.store(false, Ordering::SeqCst);
            }
        }
    }
}

/// Driver for one SoftGlue device
pub struct SoftGlueDriver {
    shared: Arc<Shared>,
}

impl SoftGlueDriver {
    /// Create a driver talking TCP to `config.device.address`.
    ///
    /// The driver starts `Disconnected`; call [`SoftGlueDriver::request_connect`].
    pub fn new(config: Config, sink: Arc<dyn FrameSink>) -> Result<Self> {
        let connector = Arc::new(TcpConnector::from_config(&config));
        Self::with_connector(config, connector, sink)
    }

    /// Create a driver with a custom transport factory
    pub fn with_connector(
        config: Config,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        config.validate()?;

        let matrix = OutputMatrix::new(config.device.max_outputs);
        let params = ParamStore::new();
        for channel in &config.channels {
            matrix.set_weights(channel.index, &channel.weights)?;
            matrix.set_name(channel.index, &channel.name)?;
            params.set_string(Param::OutputNames, channel.index, &channel.name);
        }
        params.set_int(Param::Status, 0, DetectorState::Disconnected.as_i32());
        params.set_int(Param::Acquire, 0, 0);
        params.set_int(Param::ArrayCounter, 0, 0);
        params.set_int(Param::ArraySize, 0, 0);
        params.set_int(Param::ArrayCallbacks, 0, 1);

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

        log::info!(
            "{}: driver created for {} ({} outputs, {} configured)",
            config.device.name,
            connector.target(),
            config.device.max_outputs,
            config.channels.len()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                params,
                matrix,
                queue: FrameQueue::new(),
                link: Mutex::new(Link {
                    state: DetectorState::Disconnected,
                    transport: None,
                    cancel: None,
                }),
                connector,
                sink,
                shutdown: AtomicBool::new(false),
                shutdown_tx: Mutex::new(Some(shutdown_tx)),
                shutdown_rx,
                export_started: AtomicBool::new(false),
                tasks: Mutex::new(Tasks::default()),
            }),
        })
    }

    /// Register a driver instance and start connecting.
    ///
    /// Frames are only logged; use [`SoftGlueDriver::new`] to choose a sink.
    pub fn configure(name: &str, address: &str, max_outputs: usize) -> Result<Self> {
        let driver = Self::new(
            Config::new(name, address, max_outputs),
            Arc::new(LogSink::new()),
        )?;
        driver.request_connect()?;
        Ok(driver)
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn state(&self) -> DetectorState {
        self.shared.link.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link.lock().transport.is_some()
    }

    pub fn params(&self) -> &ParamStore {
        &self.shared.params
    }

    pub fn matrix(&self) -> &OutputMatrix {
        &self.shared.matrix
    }

    /// Frames decoded but not yet exported
    pub fn queued_frames(&self) -> usize {
        self.shared.queue.len()
    }

    /// Largest export backlog seen so far
    pub fn queue_high_water_mark(&self) -> usize {
        self.shared.queue.high_water_mark()
    }

    /// Start connecting if currently `Disconnected`.
    ///
    /// Returns `Ok(false)` when the request is ignored because of the state.
    pub fn request_connect(&self) -> Result<bool> {
        {
            let mut link = self.shared.link.lock();
            if link.state != DetectorState::Disconnected {
                log::debug!("Connect ignored in state {}", link.state);
                return Ok(false);
            }
            self.shared.set_state(&mut link, DetectorState::Initializing);
        }
        self.shared.params.publish();

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("softglue-connect".to_string())
            .spawn(move || connection::connect_loop(&shared));
        match spawned {
            Ok(handle) => {
                store_task(&mut self.shared.tasks.lock().connect, handle);
                Ok(true)
            }
            Err(e) => {
                log::error!("Failed to spawn connect thread: {}", e);
                self.revert_state(DetectorState::Disconnected);
                Err(Error::ThreadSpawn("softglue-connect"))
            }
        }
    }

    /// Start disconnecting if currently `Idle`.
    ///
    /// Ignored while acquiring; stop the acquisition first.
    pub fn request_disconnect(&self) -> Result<bool> {
        {
            let mut link = self.shared.link.lock();
            if link.state != DetectorState::Idle {
                log::debug!("Disconnect ignored in state {}", link.state);
                return Ok(false);
            }
            self.shared.set_state(&mut link, DetectorState::Waiting);
        }
        self.shared.params.publish();

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("softglue-disconnect".to_string())
            .spawn(move || connection::disconnect_loop(&shared));
        match spawned {
            Ok(handle) => {
                store_task(&mut self.shared.tasks.lock().disconnect, handle);
                Ok(true)
            }
            Err(e) => {
                log::error!("Failed to spawn disconnect thread: {}", e);
                self.revert_state(DetectorState::Idle);
                Err(Error::ThreadSpawn("softglue-disconnect"))
            }
        }
    }

    /// Start acquiring if `Idle` with an open socket.
    ///
    /// A rejected start leaves `Acquire` at 0.
    pub fn start_acquisition(&self) -> Result<bool> {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
        let transport = {
            let mut link = self.shared.link.lock();
            let transport = match link.transport.clone() {
                Some(transport) if link.state == DetectorState::Idle => transport,
                _ => {
                    let state = link.state;
                    drop(link);
                    log::warn!("Acquire ignored in state {}", state);
                    self.shared.params.set_int(Param::Acquire, 0, 0);
                    self.shared.params.publish();
                    return Ok(false);
                }
            };
            link.cancel = Some(cancel_tx);
            self.shared.set_state(&mut link, DetectorState::Acquiring);
            self.shared.params.set_int(Param::Acquire, 0, 1);
            transport
        };
        self.shared.params.publish();

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("softglue-acquire".to_string())
            .spawn(move || acquisition::run(&shared, transport, cancel_rx));
        match spawned {
            Ok(handle) => {
                store_task(&mut self.shared.tasks.lock().acquire, handle);
                Ok(true)
            }
            Err(e) => {
                log::error!("Failed to spawn acquisition thread: {}", e);
                self.shared.link.lock().cancel = None;
                self.shared.params.set_int(Param::Acquire, 0, 0);
                self.revert_state(DetectorState::Idle);
                Err(Error::ThreadSpawn("softglue-acquire"))
            }
        }
    }

    /// Signal the acquisition thread to stop; returns whether one was running.
    ///
    /// The thread sets `Idle` and clears `Acquire` itself on exit.
    pub fn stop_acquisition(&self) -> bool {
        let cancel = {
            let mut link = self.shared.link.lock();
            if link.state != DetectorState::Acquiring {
                log::debug!("Stop ignored in state {}", link.state);
            }
            link.cancel.take()
        };
        match cancel {
            Some(tx) => {
                let _ = tx.try_send(());
                true
            }
            None => false,
        }
    }

    /// Integer boundary write
    pub fn write_int32(&self, param: Param, addr: usize, value: i32) -> Result<()> {
        match param {
            Param::Acquire if value != 0 => {
                self.start_acquisition()?;
            }
            Param::Acquire => {
                self.stop_acquisition();
            }
            Param::Status => {
                return Err(Error::InvalidParameter("Status is read-only".to_string()));
            }
            _ => {
                self.shared.params.set_int(param, addr, value);
                self.shared.params.publish();
            }
        }
        Ok(())
    }

    /// Float-array boundary write; only `OutputMatrix` accepts arrays
    pub fn write_float64_array(&self, param: Param, addr: usize, values: &[f64]) -> Result<()> {
        if param != Param::OutputMatrix {
            return Err(Error::InvalidParameter(format!(
                "{:?} does not take a float64 array",
                param
            )));
        }
        self.shared.matrix.set_weights(addr, values)?;
        self.shared.params.set_float64_array(param, addr, values);
        self.shared.params.publish();
        Ok(())
    }

    /// String boundary write; only `OutputNames` accepts strings
    pub fn write_octet(&self, param: Param, addr: usize, value: &str) -> Result<()> {
        if param != Param::OutputNames {
            return Err(Error::InvalidParameter(format!(
                "{:?} does not take a string",
                param
            )));
        }
        let used = self.shared.matrix.set_name(addr, value)?;
        log::debug!("Output {} named '{}' ({} outputs in use)", addr, value, used);
        self.shared.params.set_string(param, addr, value);
        self.shared.params.publish();
        Ok(())
    }

    /// Stop every thread and close the socket. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("{}: shutting down", self.shared.config.device.name);

        self.shared.shutdown_tx.lock().take();
        self.stop_acquisition();
        self.shared.queue.wake_all();

        let handles = self.shared.tasks.lock().take_all();
        for handle in handles {
            if handle.join().is_err() {
                log::error!("Driver thread panicked");
            }
        }

        let transport = {
            let mut link = self.shared.link.lock();
            link.cancel = None;
            let transport = link.transport.take();
            self.shared.set_state(&mut link, DetectorState::Disconnected);
            transport
        };
        if let Some(transport) = transport {
            if let Err(e) = transport.lock().close() {
                log::warn!("Failed to close device socket: {}", e);
            }
        }
        self.shared.params.publish();

        let left = self.shared.queue.len();
        if left > 0 {
            log::warn!("{} frames left unexported at shutdown", left);
        }
        log::info!("{}: shutdown complete", self.shared.config.device.name);
    }

    fn revert_state(&self, state: DetectorState) {
        {
            let mut link = self.shared.link.lock();
            self.shared.set_state(&mut link, state);
        }
        self.shared.params.publish();
    }
}

impl Drop for SoftGlueDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
