//! Output demultiplexing and the consumers it feeds.

pub mod consumers;
pub mod demux;

pub use consumers::{
    ChainedConsumer, FnConsumer, FrameConsumer, FrameConsumerExt, LoggingConsumer,
    ToStringConsumer, WaitingConsumer,
};
pub use demux::{AttachedStream, Demultiplexer};
