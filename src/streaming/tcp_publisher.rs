//! Frame publisher using TCP sockets.
//!
//! Broadcasts every delivered frame to all connected subscribers using the
//! length-prefixed framing in [`wire`](super::wire).
//!
//! The export thread never touches a socket: [`FrameSink::deliver`] pushes
//! into a bounded lock-free queue and a dedicated publisher thread owns the
//! listener and the client connections. When the queue is full the frame is
//! dropped for subscribers and counted.

use super::sink::FrameSink;
use super::wire::{Serializer, WireFormat, create_serializer};
use crate::core::types::Frame;
use crate::error::{Error, Result};
use crossbeam_queue::ArrayQueue;
use log::{debug, error, info, warn};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Frames sent per loop iteration before accepting new clients again
const BATCH_SIZE: usize = 64;

struct PublisherStats {
    published: AtomicU64,
    dropped: AtomicU64,
    clients: AtomicUsize,
}

/// Publishes frames to TCP subscribers
pub struct TcpPublisher {
    queue: Arc<ArrayQueue<Arc<Frame>>>,
    stats: Arc<PublisherStats>,
    local_addr: SocketAddr,
    publisher_thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl TcpPublisher {
    /// Bind `bind_address` and start the publisher thread
    ///
    /// # Arguments
    /// - `bind_address`: TCP bind address (e.g., "0.0.0.0:7000")
    /// - `format`: payload encoding
    /// - `capacity`: frames buffered for the publisher thread
    pub fn new(bind_address: &str, format: WireFormat, capacity: usize) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let queue = Arc::new(ArrayQueue::new(capacity.max(1)));
        let stats = Arc::new(PublisherStats {
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            clients: AtomicUsize::new(0),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let publisher_thread = {
            let queue = Arc::clone(&queue);
            let stats = Arc::clone(&stats);
            let shutdown = Arc::clone(&shutdown);
            let serializer = create_serializer(format);
            thread::Builder::new()
                .name("tcp-publisher".to_string())
                .spawn(move || {
                    Self::publisher_thread_loop(listener, queue, serializer, stats, shutdown)
                })
                .map_err(|_| Error::ThreadSpawn("tcp-publisher"))?
        };

        info!(
            "TCP frame publisher listening on {} ({:?})",
            local_addr, format
        );

        Ok(Self {
            queue,
            stats,
            local_addr,
            publisher_thread: Some(publisher_thread),
            shutdown,
        })
    }

    /// Publisher thread main loop - owns the listener and the clients
    fn publisher_thread_loop(
        listener: TcpListener,
        queue: Arc<ArrayQueue<Arc<Frame>>>,
        serializer: Serializer,
        stats: Arc<PublisherStats>,
        shutdown: Arc<AtomicBool>,
    ) {
        let mut clients: Vec<TcpStream> = Vec::new();
        let mut message_buffer = Vec::with_capacity(4096);

        while !shutdown.load(Ordering::Relaxed) {
            // Accept new client connections (non-blocking)
            loop {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nonblocking(false) {
                            warn!("Failed to set blocking mode for client {}: {}", addr, e);
                            continue;
                        }
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        info!("Subscriber connected: {}", addr);
                        clients.push(stream);
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        error!("Error accepting subscriber: {}", e);
                        break;
                    }
                }
            }
            stats.clients.store(clients.len(), Ordering::Relaxed);

            let mut batch = 0;
            while let Some(frame) = queue.pop() {
                match serializer.encode_frame(&frame, &mut message_buffer) {
                    Ok(()) => {
                        Self::broadcast_to_clients(&mut clients, &message_buffer);
                        stats.published.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => debug!("Failed to encode frame {}: {}", frame.unique_id, e),
                }

                batch += 1;
                if batch >= BATCH_SIZE {
                    break;
                }
            }

            if queue.is_empty() {
                thread::sleep(Duration::from_millis(1));
            }
        }

        info!(
            "Publisher thread exiting ({} frames published, {} dropped)",
            stats.published.load(Ordering::Relaxed),
            stats.dropped.load(Ordering::Relaxed)
        );
    }

    /// Send one encoded message to every client, removing disconnected ones
    fn broadcast_to_clients(clients: &mut Vec<TcpStream>, message: &[u8]) {
        clients.retain_mut(|client| match client.write_all(message) {
            Ok(()) => true,
            Err(e) => {
                if let Ok(addr) = client.peer_addr() {
                    debug!("Subscriber {} disconnected: {}", addr, e);
                }
                false
            }
        });
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn published(&self) -> u64 {
        self.stats.published.load(Ordering::Relaxed)
    }

    /// Frames dropped because the publisher queue was full
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    /// Connected subscribers as of the last accept pass
    pub fn client_count(&self) -> usize {
        self.stats.clients.load(Ordering::Relaxed)
    }

    /// Stop the publisher
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        debug!("TCP frame publisher shutdown requested");
    }
}

impl FrameSink for TcpPublisher {
    fn deliver(&self, frame: Arc<Frame>) -> Result<()> {
        if self.queue.push(frame).is_err() {
            let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % 100 == 1 {
                warn!(
                    "Publisher queue full ({} slots), {} frames dropped so far",
                    self.queue.capacity(),
                    dropped
                );
            }
        }
        Ok(())
    }
}

impl Drop for TcpPublisher {
    fn drop(&mut self) {
        self.stop();

        // Wait for publisher thread to finish
        if let Some(thread) = self.publisher_thread.take() {
            let _ = thread.join();
        }
    }
}
