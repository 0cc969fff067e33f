//! Output matrix: per-channel weight rows and channel names.
//!
//! Each decoded event is reduced to one scalar per channel,
//! `value[c] = Σ words[e] * weights[c][e]`, attached to the frame under the
//! channel's name. Channels sharing a name yield one attribute and the last
//! channel's value wins. Only channels below `outputs_used` (highest named
//! channel plus one) are evaluated; `outputs_used` never shrinks.
//!
//! Writers (boundary writes) and the acquisition thread share the matrix
//! through a `RwLock`; the acquisition thread takes one [`MatrixSnapshot`]
//! per tick so a row is never observed half-written.

use crate::core::types::Attribute;
use crate::error::{Error, Result};
use crate::protocol::EVENT_WORDS;
use parking_lot::RwLock;

type WeightRow = [f64; EVENT_WORDS];

struct MatrixState {
    weights: Vec<WeightRow>,
    names: Vec<Option<String>>,
    outputs_used: usize,
}

/// Shared weight matrix with `max_outputs` rows
pub struct OutputMatrix {
    max_outputs: usize,
    state: RwLock<MatrixState>,
}

impl OutputMatrix {
    pub fn new(max_outputs: usize) -> Self {
        Self {
            max_outputs,
            state: RwLock::new(MatrixState {
                weights: vec![[0.0; EVENT_WORDS]; max_outputs],
                names: vec![None; max_outputs],
                outputs_used: 0,
            }),
        }
    }

    pub fn max_outputs(&self) -> usize {
        self.max_outputs
    }

    /// Number of channels evaluated per event
    pub fn outputs_used(&self) -> usize {
        self.state.read().outputs_used
    }

    /// Overwrite the leading slots of a channel's row, other slots keep their value
    pub fn set_weights(&self, channel: usize, weights: &[f64]) -> Result<()> {
        self.check_channel(channel)?;
        if weights.len() > EVENT_WORDS {
            return Err(Error::InvalidParameter(format!(
                "{} weights for channel {}, at most {}",
                weights.len(),
                channel,
                EVENT_WORDS
            )));
        }
        let mut state = self.state.write();
        state.weights[channel][..weights.len()].copy_from_slice(weights);
        Ok(())
    }

    pub fn set_weight(&self, channel: usize, slot: usize, value: f64) -> Result<()> {
        self.check_channel(channel)?;
        if slot >= EVENT_WORDS {
            return Err(Error::InvalidParameter(format!(
                "weight slot {} out of range (0..{})",
                slot, EVENT_WORDS
            )));
        }
        self.state.write().weights[channel][slot] = value;
        Ok(())
    }

    /// Name a channel, returning the resulting `outputs_used`
    pub fn set_name(&self, channel: usize, name: &str) -> Result<usize> {
        self.check_channel(channel)?;
        let mut state = self.state.write();
        state.names[channel] = Some(name.to_string());
        state.outputs_used = state.outputs_used.max(channel + 1);
        Ok(state.outputs_used)
    }

    /// Channel name, falling back to the `output{c}` placeholder
    pub fn name(&self, channel: usize) -> Option<String> {
        let state = self.state.read();
        (channel < self.max_outputs).then(|| channel_name(&state.names, channel))
    }

    pub fn weights(&self, channel: usize) -> Option<WeightRow> {
        self.state.read().weights.get(channel).copied()
    }

    /// Copy the active rows for one tick of evaluation
    pub fn snapshot(&self) -> MatrixSnapshot {
        let state = self.state.read();
        let used = state.outputs_used;
        MatrixSnapshot {
            channels: (0..used)
                .map(|c| (channel_name(&state.names, c), state.weights[c]))
                .collect(),
        }
    }

    fn check_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.max_outputs {
            return Err(Error::InvalidParameter(format!(
                "channel {} out of range (max_outputs {})",
                channel, self.max_outputs
            )));
        }
        Ok(())
    }
}

fn channel_name(names: &[Option<String>], channel: usize) -> String {
    names[channel]
        .clone()
        .unwrap_or_else(|| format!("output{}", channel))
}

/// Immutable copy of the active channels
#[derive(Debug, Clone)]
pub struct MatrixSnapshot {
    channels: Vec<(String, WeightRow)>,
}

impl MatrixSnapshot {
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// One attribute per distinct channel name, in order of first use.
    ///
    /// Channels sharing a name collapse into one attribute holding the value
    /// of the highest such channel.
    pub fn evaluate(&self, words: &[i32; EVENT_WORDS]) -> Vec<Attribute> {
        let mut attributes: Vec<Attribute> = Vec::with_capacity(self.channels.len());
        for (name, row) in &self.channels {
            let value = weighted_sum(words, row);
            match attributes.iter_mut().find(|a| a.name == *name) {
                Some(existing) => existing.value = value,
                None => attributes.push(Attribute {
                    name: name.clone(),
                    value,
                }),
            }
        }
        attributes
    }
}

#[inline]
pub fn weighted_sum(words: &[i32; EVENT_WORDS], weights: &[f64; EVENT_WORDS]) -> f64 {
    words
        .iter()
        .zip(weights.iter())
        .map(|(&w, &k)| f64::from(w) * k)
        .sum()
}
