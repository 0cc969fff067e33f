//! SoftGlue-IO - Acquisition driver for SoftGlue timing/coincidence counters
//!
//! Connects to the SoftGlue socket server over TCP, pulls the raw 32-bit word
//! stream, decodes it into timing events and turns every event into a frame
//! of weighted channel values for downstream consumers.
//!
//! ## Pipeline
//!
//! ```text
//! device ──TCP──▶ protocol::Exchange ──bytes──▶ protocol::EventDecoder
//!                                                      │ RawEvent
//!                                                      ▼
//!   FrameSink ◀── export pump ◀── FrameQueue ◀── OutputMatrix (weighted sums)
//! ```

pub mod config;
pub mod core;
pub mod driver;
pub mod error;
pub mod matrix;
pub mod protocol;
pub mod queue;
pub mod streaming;
pub mod transport;

// Re-export commonly used types
pub use crate::config::Config;
pub use crate::core::{Attribute, DetectorState, Frame, Param, ParamStore, ParamUpdate, ParamValue};
pub use crate::driver::SoftGlueDriver;
pub use crate::error::{Error, Result};
pub use crate::matrix::OutputMatrix;
pub use crate::streaming::{ChannelSink, FrameSink, LogSink, TcpPublisher, WireFormat};
