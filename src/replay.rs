//! Capture replay
//!
//! Feeds a recorded notification stream through a freshly configured
//! demultiplexer, flushing on the capture's own clock so batch boundaries
//! fall where a live session's timer would have put them.

use crate::config::SessionConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Read;
use synchrony_core::capture::CaptureReader;
use synchrony_core::stats::store::DiagnosticsSnapshot;
use synchrony_core::{DataType, FlushBatch};

/// Totals for one channel stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub data_type: DataType,
    pub snapshots: u64,
    pub samples_per_channel: u64,
    pub lost_per_channel: u64,
}

/// Result of replaying one capture
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    /// Notifications read from the capture
    pub records: u64,
    /// Non-empty flush batches produced
    pub batches: u64,
    /// Capture time covered, in microseconds
    pub duration_us: u64,
    /// Channel streams that produced data, in flush order
    pub streams: Vec<StreamSummary>,
    pub impedance_readings: u64,
    pub impedance_lost: u64,
    pub diagnostics: DiagnosticsSnapshot,
}

impl ReplaySummary {
    fn absorb(&mut self, batch: FlushBatch) {
        if batch.is_empty() {
            return;
        }
        self.batches += 1;

        for snapshot in batch.snapshots {
            let index = match self
                .streams
                .iter()
                .position(|s| s.data_type == snapshot.data_type)
            {
                Some(i) => i,
                None => {
                    self.streams.push(StreamSummary {
                        data_type: snapshot.data_type,
                        snapshots: 0,
                        samples_per_channel: 0,
                        lost_per_channel: 0,
                    });
                    self.streams.len() - 1
                }
            };
            let stream = &mut self.streams[index];
            stream.snapshots += 1;
            stream.samples_per_channel += snapshot.samples_per_channel() as u64;
            stream.lost_per_channel += snapshot.lost_per_channel() as u64;
        }

        if let Some(impedance) = batch.impedance {
            self.impedance_readings += impedance.readings.len() as u64;
            self.impedance_lost += impedance.lost_count() as u64;
        }
    }

    /// Totals for one stream, if it produced data
    pub fn stream(&self, data_type: DataType) -> Option<&StreamSummary> {
        self.streams.iter().find(|s| s.data_type == data_type)
    }
}

/// Replay a capture stream through a demultiplexer built from `config`
///
/// Malformed notifications are counted in the diagnostics and skipped; a
/// damaged capture file stops the replay with an error.
pub fn replay_capture<R: Read>(reader: R, config: &SessionConfig) -> Result<ReplaySummary> {
    let demux = config.build_demultiplexer()?;
    let interval_us = config.flush_interval_ms.max(1).saturating_mul(1000);

    let mut summary = ReplaySummary {
        records: 0,
        batches: 0,
        duration_us: 0,
        streams: Vec::new(),
        impedance_readings: 0,
        impedance_lost: 0,
        diagnostics: demux.diagnostics(),
    };
    let mut next_flush_us = interval_us;

    for record in CaptureReader::new(reader) {
        let record = record.context("failed to read capture record")?;

        if record.elapsed_us >= next_flush_us {
            summary.absorb(demux.flush_all());
            next_flush_us = (record.elapsed_us / interval_us)
                .saturating_add(1)
                .saturating_mul(interval_us);
        }

        if let Err(e) = demux.on_notification(&record.bytes) {
            tracing::debug!(record = summary.records, error = %e, "Skipping malformed notification");
        }
        summary.records += 1;
        summary.duration_us = record.elapsed_us;
    }

    summary.absorb(demux.flush_all());
    summary.diagnostics = demux.diagnostics();

    tracing::info!(
        records = summary.records,
        batches = summary.batches,
        "Replay finished"
    );
    Ok(summary)
}
