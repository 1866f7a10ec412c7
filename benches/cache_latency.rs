//! Benchmarks for the latest-value cache and descriptor negotiation
//!
//! Covers the two operations a poll loop must never stall on:
//! - publishing a frame and reading it back, with and without a busy writer
//! - negotiating a device serial through the grow-and-retry buffer protocol
//!
//! Platform: Cross-platform (uses the recording fixtures, CI-safe)

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use handtrack::test_utils::{ScriptedDevice, ScriptedProvider, recording_fixture};
use handtrack::{DescriptorNegotiator, LatestValueCache, Recording, TrackingFrame};
use handtrack::providers::RecordedEvent;
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Tracking frames from the fixture recording
fn load_frames() -> Vec<TrackingFrame> {
    let path = recording_fixture("two_hands.yaml").expect("No recording fixture found");
    let recording = Recording::open(path).expect("Failed to load recording");

    recording
        .events
        .into_iter()
        .filter_map(|event| match event {
            RecordedEvent::Tracking(frame) => Some(frame),
            _ => None,
        })
        .collect()
}

fn bench_publish(c: &mut Criterion) {
    let frames = load_frames();
    let cache = LatestValueCache::new();

    let mut group = c.benchmark_group("cache_publish");
    group.throughput(Throughput::Elements(1));

    group.bench_function("write_frame", |b| {
        let mut i = 0;
        b.iter(|| {
            cache.write_frame(black_box(frames[i % frames.len()].clone()));
            i += 1;
        })
    });

    group.bench_function("read_frame", |b| b.iter(|| black_box(cache.read_frame())));

    group.finish();
}

fn bench_contended_read(c: &mut Criterion) {
    let frames = load_frames();
    let cache = Arc::new(LatestValueCache::new());
    let stop = Arc::new(AtomicBool::new(false));

    // Writer publishing as fast as it can
    let writer = {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let mut frame = frames[i % frames.len()].clone();
                frame.frame_id = i as i64;
                cache.write_frame(frame);
                i += 1;
            }
        })
    };

    c.bench_function("read_frame_with_busy_writer", |b| {
        b.iter(|| black_box(cache.read_frame()))
    });

    stop.store(true, Ordering::Relaxed);
    writer.join().expect("writer thread panicked");
}

fn bench_negotiation(c: &mut Criterion) {
    let provider = ScriptedProvider::new();
    let short = provider.add_device(ScriptedDevice::new("Z"));
    let long = provider.add_device(ScriptedDevice::new("LP22114510"));
    let negotiator = DescriptorNegotiator::default();

    let mut group = c.benchmark_group("descriptor_negotiation");

    group.bench_function("fits_first_buffer", |b| {
        b.iter(|| black_box(negotiator.negotiate(&provider, &short).expect("negotiation")))
    });

    group.bench_function("grow_and_retry", |b| {
        b.iter(|| black_box(negotiator.negotiate(&provider, &long).expect("negotiation")))
    });

    group.finish();
}

criterion_group!(benches, bench_publish, bench_contended_read, bench_negotiation);
criterion_main!(benches);
