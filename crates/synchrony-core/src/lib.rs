//! Synchrony Core - notification decoding, loss detection, and sample buffering
//!
//! This library turns the raw BLE notification payloads emitted by Synchrony
//! biosignal sensors into per-channel, time-ordered sample sequences. Dropped
//! packages are detected from the device package counter and backfilled with
//! explicit lost samples so multi-channel data stays aligned.

pub mod capture;
pub mod demux;
pub mod scheduler;
pub mod sensor;
pub mod stats;

pub use demux::{DeviceState, Demultiplexer, FlushBatch, SensorDelegate};
pub use scheduler::{FlushHandle, FlushScheduler};
pub use sensor::buffer::{ChannelSampleBuffer, IngestOutcome};
pub use sensor::flags::NotifyFlags;
pub use sensor::impedance::{ImpedanceBuffer, ImpedanceReading, ImpedanceSnapshot};
pub use sensor::profile::{ConversionProfile, DataType};
pub use sensor::sample::{ElectrodeStatus, Sample, Snapshot};
pub use sensor::DecodeError;
pub use stats::store::{DiagnosticsSnapshot, StatsStore};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (YYYY-MM-DD), injected by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Package indices are carried as little-endian u16 and wrap at this modulus
pub const PACKAGE_INDEX_MODULUS: u32 = 1 << 16;

/// Forward distances at or beyond half the index ring are treated as regressions
pub const MAX_FORWARD_GAP: u16 = 1 << 15;

/// Default interval between timer-driven flushes
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;
