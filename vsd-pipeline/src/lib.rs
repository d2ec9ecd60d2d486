//! Frame pipeline
//!
//! A fixed-capacity frame channel plus the producer/consumer orchestrator
//! that feeds frames from a [`FrameSource`](vsd::source::FrameSource) into a
//! caller-supplied processing callback.
//!
//! Backpressure is lossy by design: a full channel drops frames and engages
//! dynamic skipping rather than blocking the producer.

pub mod buffer;
pub mod processor;

pub use buffer::FrameBuffer;
pub use processor::{PipelineOptions, VideoProcessor};
