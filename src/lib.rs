//! Synchrony - biosignal notification demultiplexer
//!
//! This library re-exports the decoding, buffering and capture functionality
//! from `synchrony-core` and adds the session configuration and capture
//! replay used by the `synchrony` binary.

pub mod config;
pub mod replay;

pub use synchrony_core::capture;
pub use synchrony_core::sensor;
pub use synchrony_core::stats;

pub use synchrony_core::{
    ConversionProfile, DataType, DeviceState, Demultiplexer, FlushBatch, FlushHandle,
    FlushScheduler, ImpedanceSnapshot, IngestOutcome, NotifyFlags, Sample, SensorDelegate,
    Snapshot,
};
pub use synchrony_core::{BUILD_DATE, DEFAULT_FLUSH_INTERVAL_MS, VERSION};

pub use config::SessionConfig;
pub use replay::{replay_capture, ReplaySummary, StreamSummary};
