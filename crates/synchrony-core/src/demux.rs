//! Notification demultiplexer
//!
//! Routes every incoming notification to the buffer of its data type and
//! assembles flush snapshots. Each stream lives behind its own mutex, so a
//! flush (snapshot + clear) can never interleave with an ingest on the same
//! stream while other streams keep flowing.
//!
//! ## Lock Order
//!
//! `flags` may be held while taking any other lock. No other lock is ever held
//! while taking a second one.

use crate::capture::CapturedNotification;
use crate::sensor::buffer::{ChannelSampleBuffer, IngestOutcome};
use crate::sensor::flags::NotifyFlags;
use crate::sensor::impedance::{decode_impedance, ImpedanceBuffer, ImpedanceSnapshot};
use crate::sensor::packet::parse_notification;
use crate::sensor::profile::{ConversionProfile, DataType};
use crate::sensor::sample::{ElectrodeStatus, Snapshot};
use crate::sensor::DecodeError;
use crate::stats::store::{DiagnosticsSnapshot, StatsStore};
use ringbuf::traits::Producer;
use ringbuf::HeapProd;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Connection state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceState {
    Disconnected,
    Connecting,
    Connected,
    Ready,
    Disconnecting,
    Invalid,
}

/// Callbacks a transport delivers to its subscriber
///
/// The transport holds the subscriber through an `Arc` and decides when
/// notifications arrive; the subscriber owns everything it buffers.
pub trait SensorDelegate: Send + Sync {
    /// Transport-level failure (not a decode error)
    fn on_error(&self, message: &str);

    /// Connection state changed
    fn on_state_change(&self, state: DeviceState);

    /// One framed notification
    fn on_raw_data(&self, bytes: &[u8]);
}

/// Everything taken by one [`Demultiplexer::flush_all`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlushBatch {
    /// Non-empty channel snapshots, in [`DataType::CHANNEL_STREAMS`] order
    pub snapshots: Vec<Snapshot>,
    /// Impedance readings, if any were buffered
    pub impedance: Option<ImpedanceSnapshot>,
}

impl FlushBatch {
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.impedance.is_none()
    }

    /// Snapshot of one channel stream, if it had data
    pub fn snapshot(&self, data_type: DataType) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.data_type == data_type)
    }
}

#[derive(Debug, Default)]
struct StreamSlot {
    enabled: bool,
    /// `None` until the stream is configured
    buffer: Option<ChannelSampleBuffer>,
}

#[derive(Debug)]
struct ImpedanceSlot {
    enabled: bool,
    buffer: ImpedanceBuffer,
}

/// Most recent impedance package, per electrode
#[derive(Debug, Clone)]
struct LatestElectrodes {
    impedance: Vec<f32>,
    saturation: Vec<f32>,
}

struct CaptureTap {
    producer: HeapProd<CapturedNotification>,
    started: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Splits the notification stream of one device into per-type buffers
///
/// # Example
/// ```
/// use synchrony_core::sensor::packet::{encode_notification, encode_readings};
/// use synchrony_core::{ConversionProfile, DataType, Demultiplexer, NotifyFlags};
///
/// let demux = Demultiplexer::new(NotifyFlags::EEG);
/// let profile = ConversionProfile::new(250, 0b11, 1, 24, 0.5).unwrap();
/// demux.configure(DataType::Eeg, profile.clone()).unwrap();
///
/// let frame = encode_notification(DataType::Eeg, 0, &encode_readings(&profile, &[4, 8]));
/// demux.on_notification(&frame).unwrap();
///
/// let snapshot = demux.flush(DataType::Eeg).unwrap();
/// assert_eq!(snapshot.channel_samples[1][0].convert_data, Some(4.0));
/// ```
pub struct Demultiplexer {
    /// Clock origin shared by every buffer
    epoch: Instant,
    flags: Mutex<NotifyFlags>,
    /// One slot per entry of [`DataType::CHANNEL_STREAMS`]
    streams: [Mutex<StreamSlot>; 4],
    impedance: Mutex<ImpedanceSlot>,
    electrodes: Mutex<Option<LatestElectrodes>>,
    stats: Mutex<StatsStore>,
    capture: Mutex<Option<CaptureTap>>,
}

impl Demultiplexer {
    /// Create a demultiplexer with the given streams enabled and none configured
    pub fn new(flags: NotifyFlags) -> Self {
        let epoch = Instant::now();
        let mut impedance = ImpedanceBuffer::with_epoch(epoch);
        impedance.set_retained(
            flags.contains(NotifyFlags::IMPEDANCE),
            flags.contains(NotifyFlags::SATURATION),
        );

        let slot = |data_type: DataType| {
            Mutex::new(StreamSlot {
                enabled: flags.accepts(data_type),
                buffer: None,
            })
        };

        Self {
            epoch,
            flags: Mutex::new(flags),
            streams: DataType::CHANNEL_STREAMS.map(slot),
            impedance: Mutex::new(ImpedanceSlot {
                enabled: flags.accepts(DataType::Impedance),
                buffer: impedance,
            }),
            electrodes: Mutex::new(None),
            stats: Mutex::new(StatsStore::new()),
            capture: Mutex::new(None),
        }
    }

    fn slot(&self, data_type: DataType) -> Option<&Mutex<StreamSlot>> {
        DataType::CHANNEL_STREAMS
            .iter()
            .position(|&t| t == data_type)
            .map(|i| &self.streams[i])
    }

    /// Set or replace the conversion profile of a channel stream
    ///
    /// Replacing a profile discards whatever the stream had buffered.
    pub fn configure(
        &self,
        data_type: DataType,
        profile: ConversionProfile,
    ) -> Result<(), DecodeError> {
        let slot = self.slot(data_type).ok_or_else(|| {
            DecodeError::InvalidProfile(format!("{} takes no conversion profile", data_type))
        })?;
        profile.validate()?;

        let mut slot = lock(slot);
        match slot.buffer.as_mut() {
            Some(buffer) => buffer.reconfigure(profile.clone())?,
            None => {
                slot.buffer = Some(ChannelSampleBuffer::with_epoch(
                    data_type,
                    profile.clone(),
                    self.epoch,
                )?)
            }
        }

        tracing::info!(
            data_type = %data_type,
            sample_rate = profile.sample_rate,
            channels = profile.channel_count(),
            package_sample_count = profile.package_sample_count,
            resolution_bits = profile.resolution_bits,
            "Stream configured"
        );
        Ok(())
    }

    /// Active profile of a channel stream
    pub fn profile(&self, data_type: DataType) -> Option<ConversionProfile> {
        let slot = lock(self.slot(data_type)?);
        slot.buffer.as_ref().map(|b| b.profile().clone())
    }

    /// Currently enabled streams
    pub fn flags(&self) -> NotifyFlags {
        *lock(&self.flags)
    }

    /// Replace the enabled stream set; streams turned off are cleared
    pub fn set_flags(&self, flags: NotifyFlags) {
        self.update_flags(|_| flags);
    }

    /// Enable additional streams
    pub fn enable(&self, flags: NotifyFlags) {
        self.update_flags(|current| current | flags);
    }

    /// Disable streams, clearing their buffers
    pub fn disable(&self, flags: NotifyFlags) {
        self.update_flags(|current| current & !flags);
    }

    fn update_flags(&self, change: impl FnOnce(NotifyFlags) -> NotifyFlags) {
        let mut current = lock(&self.flags);
        let previous = *current;
        let flags = change(previous);
        if flags == previous {
            return;
        }
        tracing::info!(from = ?previous, to = ?flags, "Notify flags changed");
        *current = flags;

        for (data_type, slot) in DataType::CHANNEL_STREAMS.iter().zip(&self.streams) {
            let mut slot = lock(slot);
            slot.enabled = flags.accepts(*data_type);
            if !slot.enabled {
                if let Some(buffer) = slot.buffer.as_mut() {
                    buffer.clear();
                }
            }
        }

        let mut impedance = lock(&self.impedance);
        impedance.enabled = flags.accepts(DataType::Impedance);
        impedance.buffer.set_retained(
            flags.contains(NotifyFlags::IMPEDANCE),
            flags.contains(NotifyFlags::SATURATION),
        );
        // either value set going away invalidates the shared buffer
        let dropped = [NotifyFlags::IMPEDANCE, NotifyFlags::SATURATION]
            .into_iter()
            .any(|flag| previous.contains(flag) && !flags.contains(flag));
        if dropped || !impedance.enabled {
            impedance.buffer.clear();
            drop(impedance);
            *lock(&self.electrodes) = None;
        }
    }

    /// Ingest one decoded notification
    ///
    /// Disabled or unconfigured streams yield [`IngestOutcome::Ignored`].
    /// A malformed payload is rejected without touching the stream.
    pub fn on_raw_data(
        &self,
        data_type: DataType,
        payload: &[u8],
        package_index: u16,
    ) -> Result<IngestOutcome, DecodeError> {
        let result = match data_type {
            DataType::Impedance => self.ingest_impedance(payload, package_index),
            _ => self.ingest_channels(data_type, payload, package_index),
        };

        let mut stats = lock(&self.stats);
        match result {
            Ok((outcome, package_sample_count)) => {
                match outcome {
                    IngestOutcome::Appended { lost_packages } if lost_packages > 0 => {
                        tracing::warn!(
                            data_type = %data_type,
                            package_index,
                            lost_packages,
                            "Package loss detected"
                        );
                    }
                    IngestOutcome::Ignored => {
                        tracing::debug!(
                            data_type = %data_type,
                            package_index,
                            "Stream disabled or unconfigured, notification ignored"
                        );
                    }
                    _ => {}
                }
                stats.record_ingest(data_type, package_index, outcome, package_sample_count);
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(
                    data_type = %data_type,
                    package_index,
                    error = %e,
                    "Malformed payload dropped"
                );
                stats.record_malformed(data_type);
                Err(e)
            }
        }
    }

    fn ingest_channels(
        &self,
        data_type: DataType,
        payload: &[u8],
        package_index: u16,
    ) -> Result<(IngestOutcome, u32), DecodeError> {
        let Some(slot) = self.slot(data_type) else {
            return Ok((IngestOutcome::Ignored, 0));
        };
        let status = self.electrode_status(data_type);

        let mut slot = lock(slot);
        if !slot.enabled {
            return Ok((IngestOutcome::Ignored, 0));
        }
        let Some(buffer) = slot.buffer.as_mut() else {
            return Ok((IngestOutcome::Ignored, 0));
        };

        let readings = buffer.profile().decode_readings(data_type, payload)?;
        let outcome = buffer.ingest(package_index, &readings, &status)?;
        Ok((outcome, buffer.profile().package_sample_count))
    }

    fn ingest_impedance(
        &self,
        payload: &[u8],
        package_index: u16,
    ) -> Result<(IngestOutcome, u32), DecodeError> {
        let mut slot = lock(&self.impedance);
        if !slot.enabled {
            return Ok((IngestOutcome::Ignored, 0));
        }

        let (impedance, saturation) = decode_impedance(payload)?;
        let outcome = slot
            .buffer
            .ingest(package_index, impedance.clone(), saturation.clone());
        drop(slot);

        if matches!(outcome, IngestOutcome::Appended { .. }) {
            *lock(&self.electrodes) = Some(LatestElectrodes {
                impedance,
                saturation,
            });
        }
        Ok((outcome, 1))
    }

    /// Per-slot electrode status for EEG/ECG packages
    ///
    /// EEG slot `i` reads electrode `i`; ECG slots continue after the EEG
    /// channels.
    fn electrode_status(&self, data_type: DataType) -> Vec<ElectrodeStatus> {
        let flags = self.flags();
        if !flags.accepts(DataType::Impedance) {
            return Vec::new();
        }

        let first_electrode = match data_type {
            DataType::Eeg => 0,
            DataType::Ecg => self
                .profile(DataType::Eeg)
                .map(|p| p.channel_count())
                .unwrap_or(0),
            _ => return Vec::new(),
        };

        let Some(latest) = lock(&self.electrodes).clone() else {
            return Vec::new();
        };

        let keep_impedance = flags.contains(NotifyFlags::IMPEDANCE);
        let keep_saturation = flags.contains(NotifyFlags::SATURATION);
        let electrodes = latest.impedance.len().max(latest.saturation.len());

        (first_electrode..electrodes)
            .map(|e| ElectrodeStatus {
                impedance: latest.impedance.get(e).copied().filter(|_| keep_impedance),
                saturation: latest.saturation.get(e).copied().filter(|_| keep_saturation),
            })
            .collect()
    }

    /// Parse a framed notification and ingest it
    ///
    /// The raw bytes are copied to the capture ring first, if one is
    /// attached. Unknown type bytes yield [`IngestOutcome::Ignored`].
    pub fn on_notification(&self, bytes: &[u8]) -> Result<IngestOutcome, DecodeError> {
        self.tee_capture(bytes);

        let notification = match parse_notification(bytes) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping truncated notification");
                lock(&self.stats).record_truncated();
                return Err(e);
            }
        };

        let Some(data_type) = notification.data_type() else {
            tracing::debug!(
                type_byte = notification.type_byte,
                "Ignoring notification of unknown type"
            );
            lock(&self.stats).record_unknown_type();
            return Ok(IngestOutcome::Ignored);
        };

        self.on_raw_data(data_type, notification.payload, notification.package_index)
    }

    /// Take the buffered samples of one channel stream
    ///
    /// Returns `None` when the stream is disabled or unconfigured.
    pub fn flush(&self, data_type: DataType) -> Option<Snapshot> {
        let mut slot = lock(self.slot(data_type)?);
        if !slot.enabled {
            return None;
        }
        slot.buffer.as_mut().map(ChannelSampleBuffer::flush_samples)
    }

    /// Take the buffered impedance readings; `None` when disabled
    pub fn flush_impedance(&self) -> Option<ImpedanceSnapshot> {
        let mut slot = lock(&self.impedance);
        if !slot.enabled {
            return None;
        }
        Some(slot.buffer.flush())
    }

    /// Flush every enabled stream, keeping only those that had data
    pub fn flush_all(&self) -> FlushBatch {
        let snapshots = DataType::CHANNEL_STREAMS
            .iter()
            .filter_map(|&data_type| self.flush(data_type))
            .filter(|snapshot| !snapshot.is_empty())
            .collect();
        let impedance = self.flush_impedance().filter(|s| !s.is_empty());

        FlushBatch {
            snapshots,
            impedance,
        }
    }

    /// Clear every buffer and forget all package indices
    ///
    /// Profiles and flags survive, so a reconnected device streams straight
    /// into the same configuration.
    pub fn reset(&self) {
        for slot in &self.streams {
            if let Some(buffer) = lock(slot).buffer.as_mut() {
                buffer.clear();
            }
        }
        lock(&self.impedance).buffer.clear();
        *lock(&self.electrodes) = None;
        lock(&self.stats).record_reset();
        tracing::info!("Demultiplexer reset");
    }

    /// Copy every framed notification into `producer` from now on
    ///
    /// Notifications that do not fit in the ring are dropped and counted.
    pub fn attach_capture(&self, producer: HeapProd<CapturedNotification>) {
        *lock(&self.capture) = Some(CaptureTap {
            producer,
            started: Instant::now(),
        });
        tracing::info!("Capture attached");
    }

    /// Stop capturing, handing the producer back
    pub fn detach_capture(&self) -> Option<HeapProd<CapturedNotification>> {
        let tap = lock(&self.capture).take()?;
        tracing::info!("Capture detached");
        Some(tap.producer)
    }

    fn tee_capture(&self, bytes: &[u8]) {
        let mut capture = lock(&self.capture);
        let Some(tap) = capture.as_mut() else {
            return;
        };
        let record = CapturedNotification {
            elapsed_us: tap.started.elapsed().as_micros() as u64,
            bytes: bytes.to_vec(),
        };
        if tap.producer.try_push(record).is_err() {
            drop(capture);
            lock(&self.stats).record_capture_dropped();
        }
    }

    /// Copy of the decode counters and loss history
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        lock(&self.stats).snapshot()
    }
}

impl SensorDelegate for Demultiplexer {
    fn on_error(&self, message: &str) {
        tracing::error!(error = message, "Sensor transport error");
        lock(&self.stats).record_transport_error();
    }

    fn on_state_change(&self, state: DeviceState) {
        tracing::info!(state = ?state, "Sensor state changed");
        if state == DeviceState::Disconnected {
            self.reset();
        }
    }

    fn on_raw_data(&self, bytes: &[u8]) {
        // Failures are already logged and counted
        let _ = self.on_notification(bytes);
    }
}
