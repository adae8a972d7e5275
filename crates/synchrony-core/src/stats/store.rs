//! Diagnostic counters for the decode path
//!
//! Nothing on the ingest path is allowed to fail loudly, so everything that
//! goes wrong (gaps, retransmissions, malformed payloads, unknown types) is
//! counted here instead.

use crate::sensor::buffer::IngestOutcome;
use crate::sensor::profile::DataType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Maximum number of loss events kept in history
const MAX_LOSS_EVENTS: usize = 3600;

/// A detected gap in one stream's package sequence
#[derive(Debug, Clone, Serialize)]
pub struct LossEvent {
    /// When the gap was detected
    pub timestamp: DateTime<Utc>,
    pub data_type: DataType,
    /// Index of the package that revealed the gap
    pub package_index: u16,
    /// Number of packages backfilled
    pub lost_packages: u32,
}

/// Counters for one stream
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Real packages appended
    pub packages_ingested: u64,
    /// Packages backfilled as lost
    pub packages_lost: u64,
    /// Lost samples per channel
    pub samples_lost: u64,
    /// Duplicate or out-of-order packages dropped
    pub packages_discarded: u64,
    /// Packages rejected for a malformed payload
    pub malformed: u64,
    /// Packages ignored because the stream was disabled or unconfigured
    pub ignored: u64,
}

/// Counters accumulated since the store was created
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunningStats {
    pub streams: HashMap<DataType, StreamStats>,
    /// Notifications with an unrecognised type byte
    pub unknown_type: u64,
    /// Notifications shorter than the frame header
    pub truncated_frames: u64,
    /// Notifications not captured because the capture ring was full
    pub capture_dropped: u64,
    /// Number of resets (disconnects)
    pub resets: u64,
    /// Delegate error reports from the transport
    pub transport_errors: u64,
}

impl RunningStats {
    /// Counters for one stream (zeroed if nothing was recorded yet)
    pub fn stream(&self, data_type: DataType) -> StreamStats {
        self.streams.get(&data_type).cloned().unwrap_or_default()
    }

    /// Packages lost across every stream
    pub fn total_packages_lost(&self) -> u64 {
        self.streams.values().map(|s| s.packages_lost).sum()
    }
}

/// Point-in-time copy of a [`StatsStore`]
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSnapshot {
    pub started_at: DateTime<Utc>,
    pub stats: RunningStats,
    /// Loss events of the current session, oldest first
    pub loss_events: Vec<LossEvent>,
}

/// Diagnostics store for one demultiplexer
#[derive(Debug)]
pub struct StatsStore {
    loss_events: VecDeque<LossEvent>,
    max_events: usize,
    stats: RunningStats,
    started_at: DateTime<Utc>,
}

impl StatsStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            loss_events: VecDeque::with_capacity(64),
            max_events: MAX_LOSS_EVENTS,
            stats: RunningStats::default(),
            started_at: Utc::now(),
        }
    }

    fn stream_mut(&mut self, data_type: DataType) -> &mut StreamStats {
        self.stats.streams.entry(data_type).or_default()
    }

    /// Record the outcome of one ingest
    ///
    /// # Arguments
    /// * `data_type` - Stream the package belonged to
    /// * `package_index` - Device package index
    /// * `outcome` - What the buffer did with the package
    /// * `package_sample_count` - Samples per channel per package (1 for impedance)
    pub fn record_ingest(
        &mut self,
        data_type: DataType,
        package_index: u16,
        outcome: IngestOutcome,
        package_sample_count: u32,
    ) {
        match outcome {
            IngestOutcome::Discarded => {
                self.stream_mut(data_type).packages_discarded += 1;
            }
            IngestOutcome::Ignored => {
                self.stream_mut(data_type).ignored += 1;
            }
            IngestOutcome::Appended { lost_packages } => {
                let stream = self.stream_mut(data_type);
                stream.packages_ingested += 1;
                if lost_packages > 0 {
                    stream.packages_lost += u64::from(lost_packages);
                    stream.samples_lost +=
                        u64::from(lost_packages) * u64::from(package_sample_count);

                    if self.loss_events.len() >= self.max_events {
                        self.loss_events.pop_front();
                    }
                    self.loss_events.push_back(LossEvent {
                        timestamp: Utc::now(),
                        data_type,
                        package_index,
                        lost_packages,
                    });
                }
            }
        }
    }

    pub fn record_malformed(&mut self, data_type: DataType) {
        self.stream_mut(data_type).malformed += 1;
    }

    pub fn record_unknown_type(&mut self) {
        self.stats.unknown_type += 1;
    }

    pub fn record_truncated(&mut self) {
        self.stats.truncated_frames += 1;
    }

    pub fn record_capture_dropped(&mut self) {
        self.stats.capture_dropped += 1;
    }

    pub fn record_transport_error(&mut self) {
        self.stats.transport_errors += 1;
    }

    /// Record a session reset; loss history belongs to the old session and is dropped
    pub fn record_reset(&mut self) {
        self.stats.resets += 1;
        self.loss_events.clear();
    }

    /// Get running statistics
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Get loss events, oldest first
    pub fn loss_events(&self) -> &VecDeque<LossEvent> {
        &self.loss_events
    }

    /// Cloneable copy of counters and loss history
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            started_at: self.started_at,
            stats: self.stats.clone(),
            loss_events: self.loss_events.iter().cloned().collect(),
        }
    }

    /// When this store started counting
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Clear all counters and history
    pub fn clear(&mut self) {
        self.loss_events.clear();
        self.stats = RunningStats::default();
        self.started_at = Utc::now();
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}
