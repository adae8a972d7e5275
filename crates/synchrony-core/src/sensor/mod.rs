//! Sensor stream processing
//!
//! This module contains the per-stream building blocks:
//! - Conversion parameters and raw payload decoding ([`profile`])
//! - Decoded samples and flush snapshots ([`sample`])
//! - Multi-channel buffering with loss detection ([`buffer`])
//! - Impedance / saturation buffering ([`impedance`])
//! - Stream enable bitmask ([`flags`])
//! - Notification framing ([`packet`])

pub mod buffer;
pub mod flags;
pub mod impedance;
pub mod packet;
pub mod profile;
pub mod sample;

use thiserror::Error;

/// Errors produced while decoding a single notification
///
/// None of these are fatal to a stream: the offending package is dropped and
/// buffer state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Notification too short: {len} bytes, need at least 3")]
    TruncatedFrame { len: usize },

    #[error("Payload length mismatch for {data_type}: expected {expected} bytes, got {actual}")]
    PayloadLength {
        data_type: profile::DataType,
        expected: usize,
        actual: usize,
    },

    #[error("Reading count mismatch: expected {expected}, got {actual}")]
    ReadingCount { expected: usize, actual: usize },

    #[error("Impedance payload length {0} is not a multiple of 8")]
    ImpedanceLength(usize),

    #[error("Invalid conversion profile: {0}")]
    InvalidProfile(String),
}
