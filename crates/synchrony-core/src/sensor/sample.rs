//! Decoded samples and the snapshot shape handed to delivery adapters

use super::profile::{ConversionProfile, DataType};
use serde::{Deserialize, Serialize};

/// One decoded reading for one channel at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Monotonic capture time in milliseconds
    pub time_stamp_in_ms: u64,
    /// Running index within the channel since the last clear or flush
    pub sample_index: u64,
    /// Physical channel number (0-based, from the channel mask)
    pub channel_index: u32,
    /// True when this slot backfills a dropped package
    pub is_lost: bool,
    /// Raw signed reading; `None` for lost samples
    pub raw_data: Option<i32>,
    /// `raw_data * k`; `None` for lost samples
    pub convert_data: Option<f64>,
    /// Latest electrode impedance in ohms, when the impedance stream is active
    pub impedance: Option<f32>,
    /// Latest electrode saturation, when the saturation stream is active
    pub saturation: Option<f32>,
}

/// Impedance / saturation values applied to the samples of one channel slot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElectrodeStatus {
    pub impedance: Option<f32>,
    pub saturation: Option<f32>,
}

/// Immutable result of flushing one channel stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data_type: DataType,
    pub sample_rate: u32,
    pub channel_mask: u64,
    pub channel_count: usize,
    pub resolution_bits: u32,
    pub package_sample_count: u32,
    pub k: f64,
    /// Outer index is the channel slot, inner is time order
    pub channel_samples: Vec<Vec<Sample>>,
}

impl Snapshot {
    /// An empty snapshot tagged with the profile fields
    pub fn empty(data_type: DataType, profile: &ConversionProfile) -> Self {
        Self {
            data_type,
            sample_rate: profile.sample_rate,
            channel_mask: profile.channel_mask,
            channel_count: profile.channel_count(),
            resolution_bits: profile.resolution_bits,
            package_sample_count: profile.package_sample_count,
            k: profile.k,
            channel_samples: vec![Vec::new(); profile.channel_count()],
        }
    }

    /// True when no channel holds any sample
    pub fn is_empty(&self) -> bool {
        self.channel_samples.iter().all(Vec::is_empty)
    }

    /// Samples per channel (all channels hold the same count)
    pub fn samples_per_channel(&self) -> usize {
        self.channel_samples.first().map(Vec::len).unwrap_or(0)
    }

    /// Number of lost samples on the first channel
    pub fn lost_per_channel(&self) -> usize {
        self.channel_samples
            .first()
            .map(|samples| samples.iter().filter(|s| s.is_lost).count())
            .unwrap_or(0)
    }
}
