//! Per-channel sample buffering with package loss detection
//!
//! Every EEG/ECG/ACC/GYRO notification carries a 16-bit package index that
//! increases by one per package and wraps at 65536. The buffer compares each
//! arriving index with the last one it accepted:
//!
//! - next index: samples are appended as-is
//! - index ahead by `g > 1`: `g - 1` whole packages of lost samples are
//!   synthesized first, so every channel keeps a gap-free time axis
//! - same or earlier index (retransmission): the package is dropped
//!
//! Forward distances of half the index ring or more are treated as
//! regressions rather than gaps.

use super::profile::{ConversionProfile, DataType};
use super::sample::{ElectrodeStatus, Sample, Snapshot};
use super::DecodeError;
use crate::MAX_FORWARD_GAP;
use std::time::Instant;

/// What happened to an ingested package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Package appended, after backfilling `lost_packages` missing packages
    Appended { lost_packages: u32 },
    /// Duplicate or out-of-order package, dropped without touching state
    Discarded,
    /// Stream disabled or not configured; the payload was not decoded
    Ignored,
}

/// Ordered per-channel samples for one data stream
#[derive(Debug)]
pub struct ChannelSampleBuffer {
    data_type: DataType,
    profile: ConversionProfile,
    /// Physical channel number for each slot
    physical_channels: Vec<u32>,
    /// Outer index is the channel slot
    channel_samples: Vec<Vec<Sample>>,
    /// Index of the last accepted package; `None` until the first package after a clear
    last_package_index: Option<u16>,
    /// Packages accounted for (real + synthesized) since the last clear
    last_package_counter: u64,
    /// Clock origin shared with sibling buffers
    epoch: Instant,
    /// Capture time of sample 0 since the last clear, relative to `epoch`
    anchor_ms: u64,
    /// Time the next sample would have carried; survives clears so
    /// timestamps never run backwards across flushes
    next_time_ms: u64,
}

impl ChannelSampleBuffer {
    /// Create an empty buffer with its own clock origin
    pub fn new(data_type: DataType, profile: ConversionProfile) -> Result<Self, DecodeError> {
        Self::with_epoch(data_type, profile, Instant::now())
    }

    /// Create an empty buffer whose timestamps are relative to `epoch`
    pub fn with_epoch(
        data_type: DataType,
        profile: ConversionProfile,
        epoch: Instant,
    ) -> Result<Self, DecodeError> {
        profile.validate()?;
        let physical_channels = profile.physical_channels();
        Ok(Self {
            data_type,
            channel_samples: vec![Vec::new(); physical_channels.len()],
            physical_channels,
            profile,
            last_package_index: None,
            last_package_counter: 0,
            epoch,
            anchor_ms: 0,
            next_time_ms: 0,
        })
    }

    /// Ingest one package of raw readings
    ///
    /// # Arguments
    /// * `package_index` - Device package counter
    /// * `readings` - `channel_count * package_sample_count` raw readings in wire order
    /// * `status` - Per-slot electrode status; missing slots leave the fields unset
    ///
    /// # Example
    /// ```
    /// use synchrony_core::{ChannelSampleBuffer, ConversionProfile, DataType, IngestOutcome};
    ///
    /// let profile = ConversionProfile::new(250, 0b1, 2, 24, 0.5).unwrap();
    /// let mut buffer = ChannelSampleBuffer::new(DataType::Eeg, profile).unwrap();
    ///
    /// buffer.ingest(0, &[10, 20], &[]).unwrap();
    /// let outcome = buffer.ingest(2, &[30, 40], &[]).unwrap();
    /// assert_eq!(outcome, IngestOutcome::Appended { lost_packages: 1 });
    /// assert_eq!(buffer.samples_per_channel(), 6);
    /// ```
    pub fn ingest(
        &mut self,
        package_index: u16,
        readings: &[i32],
        status: &[ElectrodeStatus],
    ) -> Result<IngestOutcome, DecodeError> {
        let expected = self.profile.readings_per_package();
        if readings.len() != expected {
            return Err(DecodeError::ReadingCount {
                expected,
                actual: readings.len(),
            });
        }

        let gap = match self.last_package_index {
            None => {
                let now_ms = self.epoch.elapsed().as_millis() as u64;
                self.anchor_ms = now_ms.max(self.next_time_ms);
                1
            }
            Some(last) => {
                let gap = package_index.wrapping_sub(last);
                if gap == 0 || gap >= MAX_FORWARD_GAP {
                    tracing::trace!(
                        data_type = %self.data_type,
                        package_index,
                        last_package_index = last,
                        "Discarding duplicate or out-of-order package"
                    );
                    return Ok(IngestOutcome::Discarded);
                }
                gap
            }
        };

        let lost_packages = u32::from(gap - 1);
        if lost_packages > 0 {
            tracing::debug!(
                data_type = %self.data_type,
                package_index,
                lost_packages,
                "Backfilling lost packages"
            );
            for _ in 0..lost_packages {
                self.append_package(None, status);
                self.last_package_counter += 1;
            }
        }

        self.append_package(Some(readings), status);
        self.last_package_counter += 1;
        self.last_package_index = Some(package_index);
        self.next_time_ms = self.anchor_ms
            + self.profile.sample_offset_ms(
                self.last_package_counter * self.profile.package_sample_count as u64,
            );

        Ok(IngestOutcome::Appended { lost_packages })
    }

    /// Append one package worth of samples; `None` readings synthesize a lost package
    fn append_package(&mut self, readings: Option<&[i32]>, status: &[ElectrodeStatus]) {
        let channel_count = self.physical_channels.len();
        let package_sample_count = self.profile.package_sample_count as u64;
        let first_index = self.last_package_counter * package_sample_count;

        for offset in 0..package_sample_count {
            let sample_index = first_index + offset;
            let time_stamp_in_ms = self.anchor_ms + self.profile.sample_offset_ms(sample_index);

            for (slot, samples) in self.channel_samples.iter_mut().enumerate() {
                let electrode = status.get(slot).copied().unwrap_or_default();
                let raw_data =
                    readings.map(|r| r[offset as usize * channel_count + slot]);

                samples.push(Sample {
                    time_stamp_in_ms,
                    sample_index,
                    channel_index: self.physical_channels[slot],
                    is_lost: raw_data.is_none(),
                    raw_data,
                    convert_data: raw_data.map(|raw| self.profile.convert(raw)),
                    impedance: electrode.impedance,
                    saturation: electrode.saturation,
                });
            }
        }
    }

    /// Discard all samples and forget the last package index
    pub fn clear(&mut self) {
        for samples in &mut self.channel_samples {
            samples.clear();
        }
        self.last_package_index = None;
        self.last_package_counter = 0;
        self.anchor_ms = 0;
    }

    /// Take everything buffered since the last clear, then clear
    pub fn flush_samples(&mut self) -> Snapshot {
        let mut snapshot = Snapshot::empty(self.data_type, &self.profile);
        std::mem::swap(&mut snapshot.channel_samples, &mut self.channel_samples);
        self.clear();
        snapshot
    }

    /// Replace the conversion profile; always implies a full clear
    pub fn reconfigure(&mut self, profile: ConversionProfile) -> Result<(), DecodeError> {
        profile.validate()?;
        self.physical_channels = profile.physical_channels();
        self.channel_samples = vec![Vec::new(); self.physical_channels.len()];
        self.profile = profile;
        self.clear();
        Ok(())
    }

    /// Data type this buffer decodes
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Active conversion profile
    pub fn profile(&self) -> &ConversionProfile {
        &self.profile
    }

    /// Index of the last accepted package
    pub fn last_package_index(&self) -> Option<u16> {
        self.last_package_index
    }

    /// Packages accounted for since the last clear
    pub fn last_package_counter(&self) -> u64 {
        self.last_package_counter
    }

    /// Samples currently buffered per channel
    pub fn samples_per_channel(&self) -> usize {
        self.channel_samples.first().map(Vec::len).unwrap_or(0)
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.samples_per_channel() == 0
    }
}
