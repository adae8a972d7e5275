//! E2E tests for disconnect / reconnect handling
//!
//! A simulated transport drives the demultiplexer through the
//! `SensorDelegate` interface, the way a BLE stack would.

use std::sync::Arc;
use synchrony::sensor::packet::{encode_impedance, encode_notification, encode_readings};
use synchrony::{
    ConversionProfile, DataType, Demultiplexer, DeviceState, NotifyFlags, SensorDelegate,
};

/// Minimal transport that owns its subscriber through an `Arc`
struct FakeTransport {
    subscriber: Arc<dyn SensorDelegate>,
}

impl FakeTransport {
    fn connect(&self) {
        for state in [DeviceState::Connecting, DeviceState::Connected, DeviceState::Ready] {
            self.subscriber.on_state_change(state);
        }
    }

    fn disconnect(&self) {
        self.subscriber.on_state_change(DeviceState::Disconnecting);
        self.subscriber.on_state_change(DeviceState::Disconnected);
    }

    fn notify(&self, frame: &[u8]) {
        self.subscriber.on_raw_data(frame);
    }
}

fn ecg_profile() -> ConversionProfile {
    ConversionProfile::new(500, 0b1, 5, 24, 1.0).unwrap()
}

fn ecg_frame(index: u16) -> Vec<u8> {
    encode_notification(
        DataType::Ecg,
        index,
        &encode_readings(&ecg_profile(), &[10, 20, 30, 40, 50]),
    )
}

fn setup() -> (Arc<Demultiplexer>, FakeTransport) {
    let demux = Arc::new(Demultiplexer::new(
        NotifyFlags::ECG | NotifyFlags::IMPEDANCE | NotifyFlags::SATURATION,
    ));
    demux.configure(DataType::Ecg, ecg_profile()).unwrap();
    let transport = FakeTransport {
        subscriber: demux.clone(),
    };
    (demux, transport)
}

/// After a disconnect, index 0 from the new session is a first package
#[test]
fn test_reset_then_index_zero_is_first_package() {
    let (demux, transport) = setup();
    transport.connect();
    for index in 1000..1010 {
        transport.notify(&ecg_frame(index));
    }
    transport.disconnect();

    // buffered data from the old session is gone
    assert!(demux.flush(DataType::Ecg).unwrap().is_empty());

    transport.connect();
    transport.notify(&ecg_frame(0));
    transport.notify(&ecg_frame(1));

    let snapshot = demux.flush(DataType::Ecg).unwrap();
    assert_eq!(snapshot.samples_per_channel(), 10);
    assert_eq!(snapshot.lost_per_channel(), 0);
    assert_eq!(snapshot.channel_samples[0][0].sample_index, 0);

    let diagnostics = demux.diagnostics();
    assert_eq!(diagnostics.stats.resets, 1);
    assert_eq!(diagnostics.stats.stream(DataType::Ecg).packages_lost, 0);
}

/// Without a reset, the same jump would be seen as a regression
#[test]
fn test_no_reset_means_stale_index_discarded() {
    let (demux, transport) = setup();
    transport.notify(&ecg_frame(40_000));
    transport.notify(&ecg_frame(0));

    assert_eq!(demux.flush(DataType::Ecg).unwrap().samples_per_channel(), 5);
    assert_eq!(
        demux.diagnostics().stats.stream(DataType::Ecg).packages_discarded,
        1
    );
}

/// Electrode status from the previous session is dropped on disconnect
#[test]
fn test_reset_drops_electrode_status() {
    let (demux, transport) = setup();
    transport.notify(&encode_notification(
        DataType::Impedance,
        0,
        &encode_impedance(&[2500.0], &[0.25]),
    ));
    transport.notify(&ecg_frame(0));

    let before = demux.flush(DataType::Ecg).unwrap();
    assert_eq!(before.channel_samples[0][0].impedance, Some(2500.0));
    assert_eq!(before.channel_samples[0][0].saturation, Some(0.25));

    transport.disconnect();
    transport.notify(&ecg_frame(0));
    let after = demux.flush(DataType::Ecg).unwrap();
    assert!(after.channel_samples[0].iter().all(|s| s.impedance.is_none()));
    assert!(demux.flush_impedance().unwrap().is_empty());
}

/// Transport errors are counted but leave buffers alone
#[test]
fn test_transport_error_keeps_state() {
    let (demux, transport) = setup();
    transport.notify(&ecg_frame(0));
    transport.subscriber.on_error("GATT write failed");
    transport.notify(&ecg_frame(1));

    assert_eq!(demux.diagnostics().stats.transport_errors, 1);
    assert_eq!(demux.flush(DataType::Ecg).unwrap().samples_per_channel(), 10);
}

/// Garbage from the transport is absorbed and counted
#[test]
fn test_malformed_notifications_absorbed() {
    let (demux, transport) = setup();
    transport.notify(&ecg_frame(0));
    transport.notify(&[0x11]);
    transport.notify(&[0x55, 1, 0, 9, 9]);
    transport.notify(&encode_notification(DataType::Ecg, 1, &[0, 0]));
    transport.notify(&ecg_frame(1));

    let stats = demux.diagnostics().stats;
    assert_eq!(stats.truncated_frames, 1);
    assert_eq!(stats.unknown_type, 1);
    assert_eq!(stats.stream(DataType::Ecg).malformed, 1);

    let snapshot = demux.flush(DataType::Ecg).unwrap();
    assert_eq!(snapshot.samples_per_channel(), 10);
    assert_eq!(snapshot.lost_per_channel(), 0);
}
