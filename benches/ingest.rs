//! Benchmarks for notification ingest and flush

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use synchrony::sensor::packet::{encode_notification, encode_readings};
use synchrony::{ConversionProfile, DataType, Demultiplexer, NotifyFlags};

/// Pre-framed EEG notifications with a sinusoidal signal
fn eeg_frames(profile: &ConversionProfile, count: u16) -> Vec<Vec<u8>> {
    use std::f64::consts::PI;

    let readings_per_package = profile.readings_per_package();
    (0..count)
        .map(|index| {
            let readings: Vec<i32> = (0..readings_per_package)
                .map(|i| {
                    let t = (index as usize * readings_per_package + i) as f64 / 250.0;
                    ((2.0 * PI * 10.0 * t).sin() * 50_000.0) as i32
                })
                .collect();
            encode_notification(DataType::Eeg, index, &encode_readings(profile, &readings))
        })
        .collect()
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    for channels in [1u32, 8, 32].iter() {
        let mask = (1u64 << *channels) - 1;
        let profile = ConversionProfile::new(250, mask, 10, 24, 0.02235).unwrap();
        let frames = eeg_frames(&profile, 256);

        group.bench_with_input(BenchmarkId::from_parameter(channels), channels, |b, _| {
            let demux = Demultiplexer::new(NotifyFlags::EEG);
            demux.configure(DataType::Eeg, profile.clone()).unwrap();
            b.iter(|| {
                for frame in &frames {
                    let _ = demux.on_notification(black_box(frame));
                }
                black_box(demux.flush_all())
            });
        });
    }

    group.finish();
}

fn bench_gap_backfill(c: &mut Criterion) {
    let profile = ConversionProfile::new(250, 0xFF, 10, 24, 0.02235).unwrap();
    let frames = eeg_frames(&profile, 256);
    // every other package dropped
    let sparse: Vec<_> = frames.iter().step_by(2).cloned().collect();

    c.bench_function("gap_backfill", |b| {
        let demux = Demultiplexer::new(NotifyFlags::EEG);
        demux.configure(DataType::Eeg, profile.clone()).unwrap();
        b.iter(|| {
            for frame in &sparse {
                let _ = demux.on_notification(black_box(frame));
            }
            black_box(demux.flush_all())
        });
    });
}

criterion_group!(benches, bench_ingest, bench_gap_backfill);
criterion_main!(benches);
