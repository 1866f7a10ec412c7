//! Latest-value cache shared between the poll loop and consumers
//!
//! Each slot is a `watch` channel holding `Option<Arc<T>>`. Values are wrapped
//! in `Arc` before the slot lock is taken, so a write is a pointer swap and a
//! read is a pointer clone. Readers therefore always see one complete value
//! and keep it alive for as long as they hold the `Arc`, even after the next
//! write replaces it in the slot.
//!
//! The frame slot and the device slot have independent locks.

use std::sync::Arc;
use tokio::sync::watch;

use crate::types::{DeviceDescriptor, TrackingFrame};

/// A single-value, last-write-wins slot.
pub struct Slot<T> {
    tx: watch::Sender<Option<Arc<T>>>,
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Replace the current value.
    pub fn publish(&self, value: T) {
        let value = Arc::new(value);
        // Previous value is dropped after the lock is released
        let _previous = self.tx.send_replace(Some(value));
    }

    /// Most recent value, or `None` if nothing has been published yet.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every subsequent publish.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.tx.subscribe()
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the current tracking frame and the current device descriptor.
#[derive(Default)]
pub struct LatestValueCache {
    frame: Slot<TrackingFrame>,
    device: Slot<DeviceDescriptor>,
}

impl LatestValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_frame(&self, frame: TrackingFrame) {
        self.frame.publish(frame);
    }

    pub fn write_device(&self, descriptor: DeviceDescriptor) {
        self.device.publish(descriptor);
    }

    pub fn read_frame(&self) -> Option<Arc<TrackingFrame>> {
        self.frame.latest()
    }

    pub fn read_device(&self) -> Option<Arc<DeviceDescriptor>> {
        self.device.latest()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Arc<TrackingFrame>>> {
        self.frame.subscribe()
    }

    pub fn subscribe_devices(&self) -> watch::Receiver<Option<Arc<DeviceDescriptor>>> {
        self.device.subscribe()
    }
}

/// Consumer-side reader that only yields frames it has not seen yet.
///
/// The cache itself is last-write-wins and will happily hand back an older
/// frame id if the provider delivered one last. A cursor skips any frame whose
/// id is not greater than the last one it returned.
#[derive(Debug, Default, Clone)]
pub struct FrameCursor {
    last_frame_id: Option<i64>,
}

impl FrameCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the last frame returned by [`next_new`](Self::next_new).
    pub fn last_frame_id(&self) -> Option<i64> {
        self.last_frame_id
    }

    pub fn next_new(&mut self, cache: &LatestValueCache) -> Option<Arc<TrackingFrame>> {
        let frame = cache.read_frame()?;
        match self.last_frame_id {
            Some(last) if frame.frame_id <= last => None,
            _ => {
                self.last_frame_id = Some(frame.frame_id);
                Some(frame)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceProduct, DeviceStatus, Hand, HandSide, Vector3};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    /// Frame whose fields are all derived from `n`, so a torn read is detectable.
    fn coherent_frame(n: i64) -> TrackingFrame {
        let v = n as f32;
        let mut frame = TrackingFrame::new(
            n,
            (0..(n % 3) as usize)
                .map(|i| {
                    let side = if i % 2 == 0 { HandSide::Left } else { HandSide::Right };
                    Hand::new(side, Vector3::new(v, v, v))
                })
                .collect(),
        );
        frame.timestamp_us = n * 1000;
        frame.framerate = v;
        frame
    }

    fn is_coherent(frame: &TrackingFrame) -> bool {
        let n = frame.frame_id;
        let v = n as f32;
        frame.timestamp_us == n * 1000
            && frame.framerate == v
            && frame.hands.len() == (n % 3) as usize
            && frame.hands.iter().all(|h| h.palm.position == Vector3::new(v, v, v))
    }

    fn descriptor(serial: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            serial: serial.to_string(),
            product: DeviceProduct::Rigel,
            status: DeviceStatus::new(1),
            caps: 0,
            baseline_um: 40_000,
            h_fov: 2.0,
            v_fov: 2.0,
            range_um: 800_000,
        }
    }

    #[test]
    fn empty_cache_reads_none() {
        let cache = LatestValueCache::new();
        assert!(cache.read_frame().is_none());
        assert!(cache.read_device().is_none());
    }

    #[test]
    fn last_write_wins_not_max_id() {
        let cache = LatestValueCache::new();
        for id in [5, 7, 6] {
            cache.write_frame(TrackingFrame::new(id, vec![]));
        }
        assert_eq!(cache.read_frame().unwrap().frame_id, 6);
    }

    #[test]
    fn slots_are_independent() {
        let cache = LatestValueCache::new();
        cache.write_device(descriptor("ABC12345"));
        assert!(cache.read_frame().is_none());
        cache.write_frame(TrackingFrame::new(1, vec![]));
        assert_eq!(cache.read_device().unwrap().serial, "ABC12345");
    }

    #[test]
    fn reader_keeps_its_snapshot_after_overwrite() {
        let cache = LatestValueCache::new();
        cache.write_frame(TrackingFrame::new(1, vec![]));
        let held = cache.read_frame().unwrap();
        cache.write_frame(TrackingFrame::new(2, vec![]));
        assert_eq!(held.frame_id, 1);
        assert_eq!(cache.read_frame().unwrap().frame_id, 2);
    }

    #[test]
    fn concurrent_readers_never_see_torn_frames() {
        let cache = Arc::new(LatestValueCache::new());
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut seen = 0u64;
                    while !done.load(Ordering::Acquire) {
                        if let Some(frame) = cache.read_frame() {
                            assert!(is_coherent(&frame), "torn frame {:?}", frame);
                            seen += 1;
                        }
                    }
                    seen
                })
            })
            .collect();

        for n in 0..20_000 {
            cache.write_frame(coherent_frame(n));
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            reader.join().expect("reader panicked");
        }
        assert_eq!(cache.read_frame().unwrap().frame_id, 19_999);
    }

    #[test]
    fn cursor_skips_stale_and_repeated_frames() {
        let cache = LatestValueCache::new();
        let mut cursor = FrameCursor::new();
        assert!(cursor.next_new(&cache).is_none());

        cache.write_frame(TrackingFrame::new(5, vec![]));
        assert_eq!(cursor.next_new(&cache).map(|f| f.frame_id), Some(5));
        assert!(cursor.next_new(&cache).is_none());

        cache.write_frame(TrackingFrame::new(7, vec![]));
        assert_eq!(cursor.next_new(&cache).map(|f| f.frame_id), Some(7));

        cache.write_frame(TrackingFrame::new(6, vec![]));
        assert!(cursor.next_new(&cache).is_none());
        assert_eq!(cursor.last_frame_id(), Some(7));
        assert_eq!(cache.read_frame().unwrap().frame_id, 6);
    }

    #[test]
    fn subscribers_observe_updates() {
        let cache = LatestValueCache::new();
        let mut rx = cache.subscribe_devices();
        assert!(!rx.has_changed().unwrap());
        cache.write_device(descriptor("XYZ"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().serial, "XYZ");
    }

    proptest! {
        #[test]
        fn prop_read_returns_last_written(ids in prop::collection::vec(any::<i64>(), 1..50)) {
            let cache = LatestValueCache::new();
            for id in &ids {
                cache.write_frame(TrackingFrame::new(*id, vec![]));
            }
            prop_assert_eq!(cache.read_frame().unwrap().frame_id, *ids.last().unwrap());
        }

        #[test]
        fn prop_every_read_is_a_written_value(ids in prop::collection::vec(0i64..1_000, 1..100)) {
            let cache = LatestValueCache::new();
            for id in &ids {
                cache.write_frame(coherent_frame(*id));
                let read = cache.read_frame().unwrap();
                prop_assert!(is_coherent(&read));
                prop_assert_eq!(read.frame_id, *id);
            }
        }
    }
}
