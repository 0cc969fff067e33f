//! TCP transport to the SoftGlue socket server

use super::{Connector, Transport};
use crate::config::{Config, DEFAULT_DEVICE_PORT};
use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP stream with explicit read/write timeouts
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
}

impl TcpTransport {
    /// Connect to `address` (`host` or `host:port`, port defaults to 8888)
    pub fn connect(
        address: &str,
        connect_timeout: Duration,
        io_timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut last_err = None;
        for addr in resolve(address)? {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => return Self::from_stream(stream, io_timeout),
                Err(e) => {
                    log::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(match last_err {
            Some(e) => Error::Io(e),
            None => Error::Other(format!("No addresses resolved for {}", address)),
        })
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, io_timeout: Option<Duration>) -> Result<Self> {
        stream.set_read_timeout(io_timeout)?;
        stream.set_write_timeout(io_timeout)?;
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Ok(Self { stream, peer })
    }
}

/// Resolve a device address, applying the default port when none is given
fn resolve(address: &str) -> Result<Vec<SocketAddr>> {
    let addrs = match address.to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(_) => (address, DEFAULT_DEVICE_PORT)
            .to_socket_addrs()
            .map_err(|e| Error::Other(format!("Cannot resolve {}: {}", address, e)))?
            .collect(),
    };
    Ok(addrs)
}

fn map_io(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout,
        _ => Error::Io(e),
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        loop {
            match self.stream.read(buffer) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io(e)),
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        loop {
            match self.stream.write(data) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io(e)),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush().map_err(map_io)
    }

    fn close(&mut self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already gone, nothing left to close
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

/// Opens [`TcpTransport`]s to the configured device address
pub struct TcpConnector {
    address: String,
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(address: &str, connect_timeout: Duration, io_timeout: Option<Duration>) -> Self {
        Self {
            address: address.to_string(),
            connect_timeout,
            io_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.device.address,
            config.timing.connect_timeout(),
            config.timing.io_timeout(),
        )
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        let transport = TcpTransport::connect(&self.address, self.connect_timeout, self.io_timeout)?;
        Ok(Box::new(transport))
    }

    fn target(&self) -> String {
        self.address.clone()
    }
}
