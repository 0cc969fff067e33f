//! SoftGlue wire protocol: command exchange and event decoding

pub mod constants;
pub mod decoder;
pub mod exchange;

pub use constants::*;
pub use decoder::{EventDecoder, EventKind, RawEvent, payload};
pub use exchange::{Exchange, Tick, parse_word_count};
