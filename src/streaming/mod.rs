//! Downstream frame delivery for SoftGlue-IO

pub mod sink;
pub mod tcp_publisher;
pub mod wire;

pub use sink::{ChannelSink, FrameSink, LogSink};
pub use tcp_publisher::TcpPublisher;
pub use wire::{Serializer, WireFormat, create_serializer};
