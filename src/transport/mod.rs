//! Transport layer for I/O abstraction
//!
//! - [`Transport`]: byte stream to the device (TCP in production, mock in tests)
//! - [`Connector`]: opens a fresh transport for each connect attempt

use crate::error::{Error, Result};

pub mod mock;
mod tcp;

pub use mock::{MockConnector, MockTransport, SimDevice};
pub use tcp::{TcpConnector, TcpTransport};

/// Transport trait for device communication
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read (0 = peer closed)
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Close the connection
    fn close(&mut self) -> Result<()>;

    /// Fill `buffer` completely.
    ///
    /// A stream that ends early is reported as [`Error::ShortRead`]; the bytes
    /// already read are left in `buffer` but must not be parsed.
    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.read(&mut buffer[filled..])? {
                0 => {
                    return Err(Error::ShortRead {
                        expected: buffer.len(),
                        actual: filled,
                    });
                }
                n => filled += n,
            }
        }
        Ok(())
    }

    /// Write all of `data`
    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            match self.write(data)? {
                0 => return Err(Error::ConnectionClosed),
                n => data = &data[n..],
            }
        }
        self.flush()
    }

    /// Human-readable peer description for logs
    fn peer(&self) -> String {
        "unknown".to_string()
    }
}

/// Factory for device transports, called once per connect attempt
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Transport>>;

    /// Target description for logs
    fn target(&self) -> String;
}
