//! Background notification recorder
//!
//! Drains the capture ring filled by the demultiplexer and appends every
//! notification to `capture_YYYYMMDD_HHMMSS_N.bin` files, rotated every
//! 10 minutes with 1-hour retention. Records use the layout described in
//! [`super::file`].

use super::file::CapturedNotification;
use ringbuf::traits::Consumer;
use ringbuf::HeapCons;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// Running recorder; stopping it flushes the current file
pub struct RecorderHandle {
    stopping: Arc<AtomicBool>,
    /// Updated by the recorder thread after every drain
    written: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl RecorderHandle {
    /// Ask the recorder to finish and join it
    ///
    /// Anything still queued in the ring is written before the thread exits.
    pub fn stop(&mut self) {
        self.stopping.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Notification recorder thread panicked");
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(&self.worker, Some(worker) if !worker.is_finished())
    }

    /// Records written so far
    pub fn records_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl Drop for RecorderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Writes captured notifications to rotating files
pub struct NotificationRecorder {
    dir: PathBuf,
    retention: Duration,
    file_duration: Duration,
}

impl NotificationRecorder {
    /// Record into `dir`, rotating every 10 minutes and keeping 1 hour
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            file_duration: Duration::from_secs(10 * 60),
            retention: Duration::from_secs(60 * 60),
        }
    }

    /// Override rotation period and retention
    pub fn with_rotation(mut self, file_duration: Duration, retention: Duration) -> Self {
        self.file_duration = file_duration;
        self.retention = retention;
        self
    }

    /// Start draining `consumer` on a background thread
    pub fn start(self, consumer: HeapCons<CapturedNotification>) -> RecorderHandle {
        let stopping = Arc::new(AtomicBool::new(false));
        let written = Arc::new(AtomicU64::new(0));

        let worker = {
            let stopping = Arc::clone(&stopping);
            let written = Arc::clone(&written);
            std::thread::Builder::new()
                .name("notification-recorder".into())
                .spawn(move || self.recording_loop(consumer, &stopping, &written))
                .expect("Failed to spawn notification recorder thread")
        };

        RecorderHandle {
            stopping,
            written,
            worker: Some(worker),
        }
    }

    fn recording_loop(
        &self,
        mut consumer: HeapCons<CapturedNotification>,
        stopping: &AtomicBool,
        written: &AtomicU64,
    ) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::error!(error = %e, "Failed to create capture directory");
            return;
        }

        tracing::info!(dir = %self.dir.display(), "Notification recorder thread running");

        let mut sequence = 0u32;
        let mut writer = self.open_file(sequence);
        let mut opened_at = Instant::now();
        let mut total: u64 = 0;

        loop {
            // Read the flag before draining so a stop never skips queued records
            let stop = stopping.load(Ordering::Acquire);

            while let Some(record) = consumer.try_pop() {
                let Some(w) = writer.as_mut() else {
                    continue;
                };
                match record.write_to(w) {
                    Ok(()) => total += 1,
                    Err(e) => tracing::error!(error = %e, "Failed to write capture record"),
                }
            }
            written.store(total, Ordering::Relaxed);

            if stop {
                break;
            }

            if opened_at.elapsed() >= self.file_duration {
                finish_file(writer.take());
                sequence += 1;
                writer = self.open_file(sequence);
                opened_at = Instant::now();
                tracing::info!(records = total, sequence, "Rotated capture file");
                remove_expired(&self.dir, self.retention);
            }

            std::thread::sleep(DRAIN_INTERVAL);
        }

        finish_file(writer.take());
        tracing::info!(records = total, "Notification recorder stopped");
    }

    fn open_file(&self, sequence: u32) -> Option<BufWriter<File>> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self.dir.join(format!("capture_{}_{}.bin", stamp, sequence));

        File::create(&path)
            .map(|f| {
                tracing::debug!(path = %path.display(), "Opened capture file");
                BufWriter::new(f)
            })
            .map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "Failed to create capture file");
            })
            .ok()
    }
}

fn finish_file(writer: Option<BufWriter<File>>) {
    if let Some(mut w) = writer {
        if let Err(e) = w.flush() {
            tracing::error!(error = %e, "Failed to flush capture file");
        }
    }
}

fn is_capture_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.starts_with("capture_") && name.ends_with(".bin")
}

/// Delete capture files last modified more than `retention` ago
fn remove_expired(dir: &Path, retention: Duration) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let now = SystemTime::now();

    let expired = entries.flatten().filter(|entry| {
        is_capture_file(&entry.path())
            && entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > retention)
    });

    for entry in expired {
        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed expired capture file"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove capture file")
            }
        }
    }
}
