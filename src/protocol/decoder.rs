//! Event decoder for the SoftGlue word stream
//!
//! The device reports each timing event as a run of 32-bit words. The first
//! word of a run carries the tag bits:
//!
//! ```text
//!  31  30  29                                   0
//! ┌───┬───┬──────────────────────────────────────┐
//! │ S │ L │ payload (30 bits, signed)            │
//! └───┴───┴──────────────────────────────────────┘
//!  S=1 L=1  start of a 24-word event
//!  S=1 L=0  start of an 8-word event
//!  S=0      not an event start (skipped between events)
//! ```
//!
//! The event kind is latched from the start word; continuation words are
//! payload whatever their top bits hold. Every word stored in an event has its
//! tag bits stripped and is sign-extended from bit 29.
//!
//! Events are not aligned to packets. Decoder state survives across calls, and
//! [`EventDecoder::push_bytes`] keeps a partial trailing word, so splitting the
//! same byte stream at arbitrary points yields the same events.

use super::constants::{
    EVENT_WORDS, FLAG_EVENT_START, MASK_LONG_EVENT_START, SHORT_EVENT_WORDS, WORD_BYTES,
};

/// Event length selected by the start word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// 8 words, bit 31 set and bit 30 clear
    Short,
    /// 24 words, bits 31 and 30 set
    Long,
}

impl EventKind {
    /// Classify a word, `None` if it does not start an event
    #[inline]
    pub fn classify(word: u32) -> Option<Self> {
        if word & FLAG_EVENT_START == 0 {
            None
        } else if word & MASK_LONG_EVENT_START == MASK_LONG_EVENT_START {
            Some(Self::Long)
        } else {
            Some(Self::Short)
        }
    }

    /// Number of words in the event, start word included
    #[inline]
    pub const fn word_count(self) -> usize {
        match self {
            Self::Short => SHORT_EVENT_WORDS,
            Self::Long => EVENT_WORDS,
        }
    }
}

/// Strip the two tag bits and sign-extend from bit 29
#[inline]
pub fn payload(word: u32) -> i32 {
    ((word as i32) << 2) >> 2
}

/// A completed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    /// Decoded words; slots past `kind.word_count()` are zero
    pub words: [i32; EVENT_WORDS],
}

impl RawEvent {
    /// Words as published in a frame: slot 0 carries the reset marker (0)
    /// in place of the start word's payload
    pub fn frame_words(&self) -> [i32; EVENT_WORDS] {
        let mut words = self.words;
        words[0] = 0;
        words
    }
}

/// Stateful word-stream decoder
pub struct EventDecoder {
    /// Kind of the event being copied, `None` between events
    current: Option<EventKind>,
    /// Words copied into `buffer` so far
    index: usize,
    buffer: [i32; EVENT_WORDS],
    /// Trailing bytes of an incomplete word
    carry: [u8; WORD_BYTES],
    carry_len: usize,
    events_decoded: u64,
    words_skipped: u64,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self {
            current: None,
            index: 0,
            buffer: [0; EVENT_WORDS],
            carry: [0; WORD_BYTES],
            carry_len: 0,
            events_decoded: 0,
            words_skipped: 0,
        }
    }

    /// Feed one word, returns the event it completes (if any)
    pub fn push_word(&mut self, word: u32) -> Option<RawEvent> {
        let kind = match self.current {
            Some(kind) => kind,
            None => match EventKind::classify(word) {
                Some(kind) => {
                    self.current = Some(kind);
                    self.index = 0;
                    self.buffer = [0; EVENT_WORDS];
                    kind
                }
                None => {
                    self.words_skipped += 1;
                    return None;
                }
            },
        };

        self.buffer[self.index] = payload(word);
        self.index += 1;

        if self.index < kind.word_count() {
            return None;
        }

        self.current = None;
        self.index = 0;
        self.events_decoded += 1;
        Some(RawEvent {
            kind,
            words: self.buffer,
        })
    }

    /// Feed raw bytes in device-native byte order, appending completed events to `out`
    pub fn push_bytes(&mut self, mut bytes: &[u8], out: &mut Vec<RawEvent>) {
        if self.carry_len > 0 {
            let take = (WORD_BYTES - self.carry_len).min(bytes.len());
            self.carry[self.carry_len..self.carry_len + take].copy_from_slice(&bytes[..take]);
            self.carry_len += take;
            bytes = &bytes[take..];

            if self.carry_len < WORD_BYTES {
                return;
            }
            self.carry_len = 0;
            if let Some(event) = self.push_word(u32::from_ne_bytes(self.carry)) {
                out.push(event);
            }
        }

        let mut chunks = bytes.chunks_exact(WORD_BYTES);
        for chunk in &mut chunks {
            let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if let Some(event) = self.push_word(word) {
                out.push(event);
            }
        }

        let rest = chunks.remainder();
        self.carry[..rest.len()].copy_from_slice(rest);
        self.carry_len = rest.len();
    }

    /// Whether an event is partially copied
    #[inline]
    pub fn in_event(&self) -> bool {
        self.current.is_some()
    }

    #[inline]
    pub fn events_decoded(&self) -> u64 {
        self.events_decoded
    }

    /// Words dropped while waiting for an event start
    #[inline]
    pub fn words_skipped(&self) -> u64 {
        self.words_skipped
    }

    /// Forget any partial event or word
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}
