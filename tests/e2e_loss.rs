//! E2E tests for package loss detection
//!
//! Feeds framed notifications through the demultiplexer and verifies that
//! gaps are backfilled, retransmissions are dropped, and the package index
//! wraps cleanly.

use approx::assert_relative_eq;
use synchrony::sensor::packet::{encode_notification, encode_readings};
use synchrony::{ConversionProfile, DataType, Demultiplexer, IngestOutcome, NotifyFlags, Snapshot};

const CHANNELS: usize = 4;
const PACKAGE_SAMPLES: usize = 5;

fn eeg_profile(k: f64) -> ConversionProfile {
    ConversionProfile::new(500, 0b1111, PACKAGE_SAMPLES as u32, 24, k).unwrap()
}

fn demux(k: f64) -> Demultiplexer {
    let demux = Demultiplexer::new(NotifyFlags::EEG);
    demux.configure(DataType::Eeg, eeg_profile(k)).unwrap();
    demux
}

fn send(demux: &Demultiplexer, index: u16, tag: i32) -> IngestOutcome {
    let readings: Vec<i32> = (0..(CHANNELS * PACKAGE_SAMPLES) as i32)
        .map(|i| tag * 1000 + i)
        .collect();
    let payload = encode_readings(&eeg_profile(1.0), &readings);
    demux
        .on_notification(&encode_notification(DataType::Eeg, index, &payload))
        .unwrap()
}

fn lost_pattern(snapshot: &Snapshot, channel: usize) -> Vec<bool> {
    snapshot.channel_samples[channel]
        .iter()
        .map(|s| s.is_lost)
        .collect()
}

/// N packages in order fill every channel with N * package_sample_count samples
#[test]
fn test_in_order_sizing() {
    let demux = demux(1.0);
    for index in 0..25u16 {
        assert_eq!(
            send(&demux, index, index as i32),
            IngestOutcome::Appended { lost_packages: 0 }
        );
    }

    let snapshot = demux.flush(DataType::Eeg).unwrap();
    assert_eq!(snapshot.channel_samples.len(), CHANNELS);
    for channel in &snapshot.channel_samples {
        assert_eq!(channel.len(), 25 * PACKAGE_SAMPLES);
        assert!(channel.iter().all(|s| !s.is_lost));
    }
}

/// Indices [0, 1, 3] yield real, real, lost, real package blocks
#[test]
fn test_single_missing_package_layout() {
    let demux = demux(1.0);
    send(&demux, 0, 0);
    send(&demux, 1, 1);
    assert_eq!(send(&demux, 3, 3), IngestOutcome::Appended { lost_packages: 1 });

    let snapshot = demux.flush(DataType::Eeg).unwrap();
    let mut expected = vec![false; 2 * PACKAGE_SAMPLES];
    expected.extend(vec![true; PACKAGE_SAMPLES]);
    expected.extend(vec![false; PACKAGE_SAMPLES]);
    for channel in 0..CHANNELS {
        assert_eq!(lost_pattern(&snapshot, channel), expected);
    }

    // lost samples keep the running index and the cadence
    let channel = &snapshot.channel_samples[2];
    for (i, sample) in channel.iter().enumerate() {
        assert_eq!(sample.sample_index, i as u64);
        assert_eq!(sample.channel_index, 2);
    }
    assert_eq!(
        channel[4 * PACKAGE_SAMPLES - 1].time_stamp_in_ms - channel[0].time_stamp_in_ms,
        (4 * PACKAGE_SAMPLES as u64 - 1) * 2
    );
}

/// A repeated package leaves the buffer exactly as a single delivery would
#[test]
fn test_duplicate_is_idempotent() {
    let once = demux(1.0);
    send(&once, 0, 0);
    send(&once, 1, 1);

    let twice = demux(1.0);
    send(&twice, 0, 0);
    send(&twice, 1, 1);
    assert_eq!(send(&twice, 1, 7), IngestOutcome::Discarded);
    assert_eq!(send(&twice, 0, 8), IngestOutcome::Discarded);

    let a = once.flush(DataType::Eeg).unwrap();
    let b = twice.flush(DataType::Eeg).unwrap();
    let raw = |s: &Snapshot| -> Vec<Vec<Option<i32>>> {
        s.channel_samples
            .iter()
            .map(|c| c.iter().map(|x| x.raw_data).collect())
            .collect()
    };
    assert_eq!(raw(&a), raw(&b));
    assert_eq!(
        twice.diagnostics().stats.stream(DataType::Eeg).packages_discarded,
        2
    );
}

/// 65535 -> 0 is the next package, not a regression
#[test]
fn test_wraparound_is_continuous() {
    let demux = demux(1.0);
    send(&demux, 65534, 0);
    send(&demux, 65535, 1);
    assert_eq!(send(&demux, 0, 2), IngestOutcome::Appended { lost_packages: 0 });
    assert_eq!(send(&demux, 1, 3), IngestOutcome::Appended { lost_packages: 0 });

    let snapshot = demux.flush(DataType::Eeg).unwrap();
    assert_eq!(snapshot.samples_per_channel(), 4 * PACKAGE_SAMPLES);
    assert_eq!(snapshot.lost_per_channel(), 0);
}

/// A gap spanning the wrap is still measured as a forward distance
#[test]
fn test_gap_across_wraparound() {
    let demux = demux(1.0);
    send(&demux, 65533, 0);
    assert_eq!(send(&demux, 2, 1), IngestOutcome::Appended { lost_packages: 4 });

    let snapshot = demux.flush(DataType::Eeg).unwrap();
    assert_eq!(snapshot.lost_per_channel(), 4 * PACKAGE_SAMPLES);
    assert_eq!(
        demux.diagnostics().stats.stream(DataType::Eeg).samples_lost,
        (4 * PACKAGE_SAMPLES) as u64
    );
}

/// Forward jumps of half the index ring or more are treated as stale
#[test]
fn test_half_ring_jump_discarded() {
    let demux = demux(1.0);
    send(&demux, 100, 0);
    assert_eq!(send(&demux, 100 + 32_768, 1), IngestOutcome::Discarded);
    assert_eq!(
        send(&demux, 100 + 32_767, 2),
        IngestOutcome::Appended { lost_packages: 32_766 }
    );
}

/// Physical values are raw * k for a fractional k
#[test]
fn test_fractional_k() {
    let k = 0.02235;
    let demux = demux(k);
    send(&demux, 0, -3);
    send(&demux, 2, 4);

    let snapshot = demux.flush(DataType::Eeg).unwrap();
    assert_relative_eq!(snapshot.k, k);
    for sample in snapshot.channel_samples.iter().flatten() {
        match sample.raw_data {
            Some(raw) => assert_relative_eq!(sample.convert_data.unwrap(), raw as f64 * k),
            None => {
                assert!(sample.is_lost);
                assert!(sample.convert_data.is_none());
            }
        }
    }
}

/// Loss events are recorded per gap
#[test]
fn test_loss_events_recorded() {
    let demux = demux(1.0);
    send(&demux, 0, 0);
    send(&demux, 5, 0);
    send(&demux, 6, 0);
    send(&demux, 9, 0);

    let diagnostics = demux.diagnostics();
    let lost: Vec<_> = diagnostics
        .loss_events
        .iter()
        .map(|e| (e.package_index, e.lost_packages))
        .collect();
    assert_eq!(lost, vec![(5, 4), (9, 2)]);
    assert_eq!(diagnostics.stats.total_packages_lost(), 6);
}
