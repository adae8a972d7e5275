//! E2E tests for notification capture and replay
//!
//! Records a live session to disk through the capture ring and replays the
//! file, checking that the replay decodes the same data the live session did.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;
use synchrony::capture::{capture_ring, CaptureReader, NotificationRecorder};
use synchrony::sensor::packet::{encode_notification, encode_readings};
use synchrony::{replay_capture, ConversionProfile, DataType, Demultiplexer, SessionConfig};

fn config() -> SessionConfig {
    SessionConfig {
        flush_interval_ms: 60_000,
        notify_flags: vec!["EEG".into()],
        eeg: Some(ConversionProfile::new(250, 0xF, 10, 24, 0.02235).unwrap()),
        ..Default::default()
    }
}

fn capture_files(dir: &std::path::Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "bin").unwrap_or(false))
        .collect();
    files.sort();
    files
}

/// Run a short live session with two dropped packages and one garbage frame
fn live_session(demux: &Demultiplexer) -> usize {
    let profile = config().eeg.unwrap();
    let mut live_samples = 0;
    for index in (0..60u16).filter(|i| *i != 17 && *i != 41) {
        let readings: Vec<i32> = (0..40).map(|i| i * (index as i32 + 1)).collect();
        let frame = encode_notification(DataType::Eeg, index, &encode_readings(&profile, &readings));
        demux.on_notification(&frame).unwrap();
        if index == 30 {
            let _ = demux.on_notification(&[0x10, 0xFF]);
        }
    }
    if let Some(snapshot) = demux.flush(DataType::Eeg) {
        live_samples += snapshot.samples_per_channel();
    }
    live_samples
}

#[test]
fn test_capture_then_replay() {
    let dir = tempfile::tempdir().unwrap();
    let demux = config().build_demultiplexer().unwrap();

    let (producer, consumer) = capture_ring();
    let mut recorder = NotificationRecorder::new(dir.path().to_path_buf()).start(consumer);
    demux.attach_capture(producer);

    let live_samples = live_session(&demux);
    recorder.stop();
    assert_eq!(recorder.records_written(), 59);

    let files = capture_files(dir.path());
    assert_eq!(files.len(), 1);

    // elapsed time never decreases through the file
    let records: Vec<_> = CaptureReader::new(BufReader::new(File::open(&files[0]).unwrap()))
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(records.windows(2).all(|w| w[1].elapsed_us >= w[0].elapsed_us));

    let summary = replay_capture(BufReader::new(File::open(&files[0]).unwrap()), &config()).unwrap();
    assert_eq!(summary.records, 59);
    assert_eq!(summary.diagnostics.stats.truncated_frames, 1);
    assert_eq!(summary.diagnostics.stats.stream(DataType::Eeg).packages_lost, 2);

    let eeg = summary.stream(DataType::Eeg).unwrap();
    assert_eq!(eeg.samples_per_channel as usize, live_samples);
    assert_eq!(eeg.lost_per_channel, 20);
}

#[test]
fn test_replay_without_profile_decodes_nothing() {
    let mut bytes = Vec::new();
    let profile = config().eeg.unwrap();
    synchrony::capture::CapturedNotification {
        elapsed_us: 0,
        bytes: encode_notification(DataType::Eeg, 0, &encode_readings(&profile, &[0; 40])),
    }
    .write_to(&mut bytes)
    .unwrap();

    let bare = SessionConfig {
        notify_flags: vec!["EEG".into()],
        ..Default::default()
    };
    let summary = replay_capture(bytes.as_slice(), &bare).unwrap();
    assert_eq!(summary.records, 1);
    assert!(summary.streams.is_empty());
    assert_eq!(summary.diagnostics.stats.stream(DataType::Eeg).ignored, 1);
}
