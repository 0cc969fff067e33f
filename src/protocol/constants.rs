//! SoftGlue socket protocol constants

// Commands (8 ASCII bytes, no terminator, no length prefix)
pub const CMD_SEND_NUMW: &[u8; 8] = b"sendnumw";
pub const CMD_SEND_DATA: &[u8; 8] = b"senddata";

/// Length of the ASCII word-count reply to `sendnumw`
pub const WORD_COUNT_LEN: usize = 10;

/// Words the device must have buffered before a data pull
pub const PACKET_SIZE: usize = 100_000;

/// Largest accepted packet threshold (64 MiB receive buffer)
pub const MAX_PACKET_SIZE: usize = 1 << 24;

/// Bytes per device word
pub const WORD_BYTES: usize = 4;

// Event framing
pub const EVENT_WORDS: usize = 24;
pub const SHORT_EVENT_WORDS: usize = 8;

// Word tag bits
pub const FLAG_EVENT_START: u32 = 0x8000_0000;
pub const FLAG_LONG_EVENT: u32 = 0x4000_0000;
pub const MASK_LONG_EVENT_START: u32 = FLAG_EVENT_START | FLAG_LONG_EVENT;
