//! Core abstractions shared across the driver.
//!
//! - [`types`]: driver status and the frame type delivered downstream
//! - [`params`]: named parameter store with change notification

pub mod params;
pub mod types;

pub use params::{Param, ParamStore, ParamUpdate, ParamValue};
pub use types::{Attribute, DetectorState, Frame};
