//! Request/response exchange with the SoftGlue socket server
//!
//! One tick asks the device how many words it holds (`sendnumw`, 10-byte
//! ASCII reply) and, once a full packet is buffered, pulls it (`senddata`,
//! `4 * packet_size` bytes). Both replies are read with full-read semantics.

use super::constants::{CMD_SEND_DATA, CMD_SEND_NUMW, WORD_BYTES, WORD_COUNT_LEN};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Outcome of one exchange tick
#[derive(Debug, PartialEq, Eq)]
pub enum Tick<'a> {
    /// Fewer than a packet's worth of words buffered on the device
    Pending { available: i64 },
    /// Raw packet bytes in device byte order
    Packet(&'a [u8]),
}

/// Parse the word-count reply.
///
/// Accepts leading whitespace, an optional sign and a run of digits; parsing
/// stops at the first other byte, so NUL or space padding is ignored.
pub fn parse_word_count(reply: &[u8]) -> Result<i64> {
    let mut bytes = reply
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .peekable();

    let negative = match bytes.peek() {
        Some(b'-') => {
            bytes.next();
            true
        }
        Some(b'+') => {
            bytes.next();
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    let mut digits = 0;
    for b in bytes.take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
        digits += 1;
    }

    if digits == 0 {
        return Err(Error::InvalidResponse(format!(
            "word count {:?}",
            String::from_utf8_lossy(reply)
        )));
    }
    Ok(if negative { -value } else { value })
}

/// Per-run exchange state: the packet threshold and the receive buffer
pub struct Exchange {
    packet_size: usize,
    buffer: Vec<u8>,
}

impl Exchange {
    pub fn new(packet_size: usize) -> Self {
        Self {
            packet_size,
            buffer: vec![0; packet_size * WORD_BYTES],
        }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Run one polling tick over `transport`
    pub fn tick(&mut self, transport: &mut dyn Transport) -> Result<Tick<'_>> {
        transport.write_all(CMD_SEND_NUMW)?;

        let mut reply = [0u8; WORD_COUNT_LEN];
        transport.read_exact(&mut reply)?;
        let available = parse_word_count(&reply)?;
        log::trace!("numw = {}", available);

        if available < self.packet_size as i64 {
            return Ok(Tick::Pending { available });
        }

        transport.write_all(CMD_SEND_DATA)?;
        transport.read_exact(&mut self.buffer)?;
        Ok(Tick::Packet(&self.buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, SimDevice};

    #[test]
    fn test_parse_word_count_atoi_rules() {
        assert_eq!(parse_word_count(b"100000\0\0\0\0").unwrap(), 100_000);
        assert_eq!(parse_word_count(b"  42      ").unwrap(), 42);
        assert_eq!(parse_word_count(b"0000050000").unwrap(), 50_000);
        assert_eq!(parse_word_count(b"-7xyz     ").unwrap(), -7);
        assert_eq!(parse_word_count(b"+12 34    ").unwrap(), 12);
    }

    #[test]
    fn test_parse_word_count_rejects_garbage() {
        assert!(matches!(
            parse_word_count(b"abcdefghij"),
            Err(Error::InvalidResponse(_))
        ));
        assert!(parse_word_count(&[0u8; 10]).is_err());
        assert!(parse_word_count(b"-         ").is_err());
    }

    #[test]
    fn test_below_threshold_skips_data_pull() {
        let mut mock = MockTransport::new();
        mock.inject_read(b"0000050000");

        let mut exchange = Exchange::new(100_000);
        let tick = exchange.tick(&mut mock).unwrap();
        assert_eq!(tick, Tick::Pending { available: 50_000 });
        assert_eq!(mock.get_written(), CMD_SEND_NUMW.to_vec());
    }

    #[test]
    fn test_full_packet_is_pulled() {
        let mut mock = MockTransport::with_device(SimDevice::new(8));
        mock.queue_packet(vec![0x8000_0001, 2, 3, 4, 5, 6, 7, 8]);

        let mut exchange = Exchange::new(8);
        match exchange.tick(&mut mock).unwrap() {
            Tick::Packet(bytes) => {
                assert_eq!(bytes.len(), 32);
                assert_eq!(
                    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                    0x8000_0001
                );
            }
            other => panic!("expected packet, got {:?}", other),
        }

        let mut expected = CMD_SEND_NUMW.to_vec();
        expected.extend_from_slice(CMD_SEND_DATA);
        assert_eq!(mock.get_written(), expected);

        // Drained device: the next tick only polls the word count
        mock.clear_written();
        let tick = exchange.tick(&mut mock).unwrap();
        assert_eq!(tick, Tick::Pending { available: 0 });
        assert_eq!(mock.get_written(), CMD_SEND_NUMW.to_vec());
    }

    #[test]
    fn test_short_packet_is_an_error() {
        let mut mock = MockTransport::new();
        mock.inject_read(b"8         ");
        mock.inject_read(&[0u8; 20]);

        let mut exchange = Exchange::new(8);
        match exchange.tick(&mut mock) {
            Err(Error::ShortRead { expected, actual }) => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 20);
            }
            other => panic!("expected short read, got {:?}", other),
        }
    }

    #[test]
    fn test_short_word_count_is_an_error() {
        let mut mock = MockTransport::new();
        mock.inject_read(b"123");

        let mut exchange = Exchange::new(8);
        let err = exchange.tick(&mut mock).unwrap_err();
        assert!(err.is_link_failure());
    }
}
