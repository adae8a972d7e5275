//! Raw notification capture
//!
//! Notifications can be teed into a lock-free ring from the ingest context
//! and written to disk by a background thread, then replayed later:
//! - Record format, reading and writing ([`file`])
//! - Background file writer with rotation ([`recorder`])

pub mod file;
pub mod recorder;

pub use file::{CaptureError, CaptureReader, CapturedNotification};
pub use recorder::{NotificationRecorder, RecorderHandle};

/// Capture ring capacity in notifications (~10 s of EEG + ECG at 100 packages/s)
pub const CAPTURE_RING_SIZE: usize = 2048;

/// Create a capture ring, returning the producer half for
/// [`crate::Demultiplexer::attach_capture`] and the consumer half for
/// [`NotificationRecorder::start`]
pub fn capture_ring() -> (
    ringbuf::HeapProd<CapturedNotification>,
    ringbuf::HeapCons<CapturedNotification>,
) {
    use ringbuf::traits::Split;
    ringbuf::HeapRb::<CapturedNotification>::new(CAPTURE_RING_SIZE).split()
}
