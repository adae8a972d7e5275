//! Impedance / saturation buffering
//!
//! Impedance checks run at a much lower rate than raw channel sampling and
//! carry their own package index, so they are tracked separately from the
//! channel buffers. Each package holds one impedance and one saturation value
//! per electrode.

use super::buffer::IngestOutcome;
use super::DecodeError;
use crate::MAX_FORWARD_GAP;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One impedance package, or a placeholder for a dropped one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpedanceReading {
    /// Capture time in milliseconds, relative to the buffer epoch
    pub time_stamp_in_ms: u64,
    /// Running index since the last clear or flush
    pub sample_index: u64,
    pub is_lost: bool,
    /// Impedance in ohms per electrode; empty when lost or not enabled
    pub impedance: Vec<f32>,
    /// Saturation per electrode; empty when lost or not enabled
    pub saturation: Vec<f32>,
}

/// Immutable result of flushing the impedance stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpedanceSnapshot {
    pub readings: Vec<ImpedanceReading>,
}

impl ImpedanceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Number of placeholder readings for dropped packages
    pub fn lost_count(&self) -> usize {
        self.readings.iter().filter(|r| r.is_lost).count()
    }
}

/// Parse an impedance payload into `(impedance, saturation)` per electrode
///
/// The payload is `n` little-endian f32 impedance values followed by `n`
/// saturation values.
pub fn decode_impedance(payload: &[u8]) -> Result<(Vec<f32>, Vec<f32>), DecodeError> {
    if payload.len() % 8 != 0 {
        return Err(DecodeError::ImpedanceLength(payload.len()));
    }

    let values: Vec<f32> = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    let (impedance, saturation) = values.split_at(values.len() / 2);
    Ok((impedance.to_vec(), saturation.to_vec()))
}

/// Single-stream buffer for impedance packages
#[derive(Debug)]
pub struct ImpedanceBuffer {
    readings: Vec<ImpedanceReading>,
    last_impedance_index: Option<u16>,
    last_package_counter: u64,
    /// Timestamp of the last real reading
    last_time_ms: u64,
    keep_impedance: bool,
    keep_saturation: bool,
    epoch: Instant,
}

impl ImpedanceBuffer {
    pub fn new() -> Self {
        Self::with_epoch(Instant::now())
    }

    /// Create an empty buffer whose timestamps are relative to `epoch`
    pub fn with_epoch(epoch: Instant) -> Self {
        Self {
            readings: Vec::new(),
            last_impedance_index: None,
            last_package_counter: 0,
            last_time_ms: 0,
            keep_impedance: true,
            keep_saturation: true,
            epoch,
        }
    }

    /// Choose which value sets are retained on ingest
    pub fn set_retained(&mut self, impedance: bool, saturation: bool) {
        self.keep_impedance = impedance;
        self.keep_saturation = saturation;
    }

    /// Ingest one decoded impedance package captured now
    pub fn ingest(
        &mut self,
        package_index: u16,
        impedance: Vec<f32>,
        saturation: Vec<f32>,
    ) -> IngestOutcome {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.ingest_at(package_index, impedance, saturation, now_ms)
    }

    /// Ingest one decoded impedance package with an explicit capture time
    ///
    /// Placeholders for dropped packages are spread evenly between the
    /// previous real reading and this one.
    pub fn ingest_at(
        &mut self,
        package_index: u16,
        impedance: Vec<f32>,
        saturation: Vec<f32>,
        now_ms: u64,
    ) -> IngestOutcome {
        let now_ms = now_ms.max(self.last_time_ms);

        let gap = match self.last_impedance_index {
            None => 1,
            Some(last) => {
                let gap = package_index.wrapping_sub(last);
                if gap == 0 || gap >= MAX_FORWARD_GAP {
                    return IngestOutcome::Discarded;
                }
                gap
            }
        };

        let lost_packages = u32::from(gap - 1);
        if lost_packages > 0 {
            let step = (now_ms - self.last_time_ms) / u64::from(gap);
            for n in 1..=u64::from(lost_packages) {
                self.readings.push(ImpedanceReading {
                    time_stamp_in_ms: self.last_time_ms + step * n,
                    sample_index: self.last_package_counter,
                    is_lost: true,
                    impedance: Vec::new(),
                    saturation: Vec::new(),
                });
                self.last_package_counter += 1;
            }
            tracing::debug!(package_index, lost_packages, "Impedance packages lost");
        }

        self.readings.push(ImpedanceReading {
            time_stamp_in_ms: now_ms,
            sample_index: self.last_package_counter,
            is_lost: false,
            impedance: if self.keep_impedance { impedance } else { Vec::new() },
            saturation: if self.keep_saturation { saturation } else { Vec::new() },
        });
        self.last_package_counter += 1;
        self.last_impedance_index = Some(package_index);
        self.last_time_ms = now_ms;

        IngestOutcome::Appended { lost_packages }
    }

    /// Discard all readings and forget the last package index
    pub fn clear(&mut self) {
        self.readings.clear();
        self.last_impedance_index = None;
        self.last_package_counter = 0;
    }

    /// Take everything buffered since the last clear, then clear
    pub fn flush(&mut self) -> ImpedanceSnapshot {
        let readings = std::mem::take(&mut self.readings);
        self.clear();
        ImpedanceSnapshot { readings }
    }

    pub fn last_impedance_index(&self) -> Option<u16> {
        self.last_impedance_index
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl Default for ImpedanceBuffer {
    fn default() -> Self {
        Self::new()
    }
}
