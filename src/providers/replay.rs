//! Replay provider for recorded tracking sessions

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::provider::SessionProvider;
use crate::types::{
    DescriptorFetch, DeviceProduct, DeviceProperties, DeviceStatus, Event, PollResult,
    TrackingFrame,
};
use crate::{Result, TrackingError};

fn default_frame_rate() -> f64 {
    120.0
}

/// A device as captured in a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedDevice {
    pub serial: String,
    #[serde(default)]
    pub product_id: u32,
    #[serde(default)]
    pub status: u32,
    #[serde(default)]
    pub caps: u32,
    #[serde(default)]
    pub baseline_um: u32,
    #[serde(default)]
    pub h_fov: f32,
    #[serde(default)]
    pub v_fov: f32,
    #[serde(default)]
    pub range_um: u32,
}

impl RecordedDevice {
    fn properties(&self) -> DeviceProperties {
        DeviceProperties {
            serial_len: self.serial.len(),
            product: DeviceProduct::from(self.product_id),
            status: DeviceStatus::new(self.status),
            caps: self.caps,
            baseline_um: self.baseline_um,
            h_fov: self.h_fov,
            v_fov: self.v_fov,
            range_um: self.range_um,
        }
    }
}

/// One entry of a recording's event list.
///
/// Unit variants are written as bare strings (`- connection`), the rest as
/// single-key maps (`- device: 0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedEvent {
    Connection,
    ConnectionLost,
    /// Index into [`Recording::devices`]
    Device(usize),
    DeviceLost(usize),
    Tracking(TrackingFrame),
    Other(u32),
    /// One poll that times out
    Idle,
}

/// A recorded session, loaded from YAML.
///
/// ```rust
/// use handtrack::providers::Recording;
///
/// let recording = Recording::from_yaml_str(r#"
/// frame_rate: 90.0
/// devices:
///   - serial: "ABC12345"
///     product_id: 0x1202
///     status: 1
/// events:
///   - connection
///   - device: 0
///   - tracking: { frame_id: 5 }
/// "#).unwrap();
///
/// assert_eq!(recording.events.len(), 3);
/// assert_eq!(recording.tracking_frames(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    #[serde(default)]
    pub devices: Vec<RecordedDevice>,
    #[serde(default, with = "serde_yaml_ng::with::singleton_map_recursive")]
    pub events: Vec<RecordedEvent>,
}

impl Recording {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let recording: Recording = serde_yaml_ng::from_str(yaml)?;
        recording.validate()?;
        Ok(recording)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrackingError::recording_error(path.to_path_buf(), e))?;
        let recording = Self::from_yaml_str(&text)?;
        info!(
            path = %path.display(),
            events = recording.events.len(),
            devices = recording.devices.len(),
            "Loaded recording"
        );
        Ok(recording)
    }

    /// Reject recordings that reference devices they do not declare.
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(TrackingError::parse_error(
                "recording",
                format!("frame_rate must be positive, got {}", self.frame_rate),
            ));
        }
        for (position, event) in self.events.iter().enumerate() {
            let (RecordedEvent::Device(idx) | RecordedEvent::DeviceLost(idx)) = event else {
                continue;
            };
            if *idx >= self.devices.len() {
                return Err(TrackingError::parse_error(
                    "recording",
                    format!(
                        "event {} references device {} but only {} are declared",
                        position,
                        idx,
                        self.devices.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn tracking_frames(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, RecordedEvent::Tracking(_))).count()
    }

    /// Playback length at native speed.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.tracking_frames() as f64 / self.frame_rate)
    }
}

#[derive(Debug, Default)]
struct ReplayState {
    cursor: usize,
    next_frame_at: Option<Instant>,
    sessions: u64,
}

/// Provider that serves a [`Recording`] as if it came from a live service.
///
/// Every new session replays from the first event. Tracking events are paced
/// at the recording's frame rate times the playback speed; once the events
/// run out, each poll waits out its timeout and reports `Timeout`.
pub struct ReplayProvider {
    recording: Recording,
    speed: f64,
    state: Mutex<ReplayState>,
}

impl ReplayProvider {
    pub fn new(recording: Recording) -> Self {
        Self { recording, speed: 1.0, state: Mutex::new(ReplayState::default()) }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Recording::open(path)?))
    }

    /// Set playback speed (1.0 = recorded rate)
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.clamp(0.1, 100.0);
        debug!("Playback speed set to {}x", self.speed);
        self
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// Events served so far in the current session
    pub fn position(&self) -> usize {
        self.state.lock().cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.position() >= self.recording.events.len()
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / (self.recording.frame_rate * self.speed))
    }

    fn device(&self, idx: usize) -> Result<&RecordedDevice> {
        self.recording.devices.get(idx).ok_or_else(|| {
            TrackingError::device_open_failed(format!("recording has no device {}", idx))
        })
    }
}

impl SessionProvider for ReplayProvider {
    type Session = u64;
    type DeviceRef = usize;
    type Device = usize;

    fn create_session(&self) -> Result<u64> {
        let mut state = self.state.lock();
        state.sessions += 1;
        state.cursor = 0;
        state.next_frame_at = None;
        debug!(session = state.sessions, "Replay session created");
        Ok(state.sessions)
    }

    fn activate(&self, session: &u64) -> Result<()> {
        trace!(session, "Replay session activated");
        Ok(())
    }

    fn poll(&self, _session: &u64, timeout: Duration) -> Result<PollResult<usize>> {
        let wait = {
            let mut state = self.state.lock();
            let Some(event) = self.recording.events.get(state.cursor) else {
                drop(state);
                std::thread::sleep(timeout);
                return Ok(PollResult::Timeout);
            };

            match event {
                RecordedEvent::Idle => {
                    state.cursor += 1;
                    drop(state);
                    std::thread::sleep(timeout);
                    return Ok(PollResult::Timeout);
                }
                RecordedEvent::Tracking(_) => {
                    let now = Instant::now();
                    let due = state.next_frame_at.unwrap_or(now);
                    let wait = due.saturating_duration_since(now);
                    if wait > timeout {
                        drop(state);
                        std::thread::sleep(timeout);
                        return Ok(PollResult::Timeout);
                    }
                    state.next_frame_at = Some(due.max(now) + self.frame_interval());
                    wait
                }
                _ => Duration::ZERO,
            }
        };

        if !wait.is_zero() {
            std::thread::sleep(wait);
        }

        let mut state = self.state.lock();
        let position = state.cursor;
        let Some(recorded) = self.recording.events.get(position) else {
            return Ok(PollResult::Timeout);
        };
        state.cursor += 1;
        let event = match recorded {
            RecordedEvent::Connection => Event::Connection,
            RecordedEvent::ConnectionLost => Event::ConnectionLost,
            RecordedEvent::Device(idx) => Event::Device(*idx),
            RecordedEvent::DeviceLost(idx) => Event::DeviceLost(*idx),
            RecordedEvent::Tracking(frame) => Event::Tracking(frame.clone()),
            RecordedEvent::Other(tag) => Event::Other(*tag),
            RecordedEvent::Idle => return Ok(PollResult::Timeout),
        };
        trace!(position, kind = event.kind(), "Replayed event");
        Ok(PollResult::Event(event))
    }

    fn open_device(&self, device: &usize) -> Result<usize> {
        self.device(*device)?;
        Ok(*device)
    }

    fn device_info(&self, device: &usize, serial: &mut [u8]) -> Result<DescriptorFetch> {
        let recorded = self
            .device(*device)
            .map_err(|_| TrackingError::descriptor_fetch_failed("device handle is not open"))?;

        let bytes = recorded.serial.as_bytes();
        if serial.len() < bytes.len() {
            return Ok(DescriptorFetch::InsufficientBuffer { required: bytes.len() });
        }
        serial[..bytes.len()].copy_from_slice(bytes);
        Ok(DescriptorFetch::Complete(recorded.properties()))
    }

    fn close_device(&self, device: usize) {
        trace!(device, "Replay device closed");
    }

    fn close_session(&self, session: &u64) {
        debug!(session, position = self.position(), "Replay session closed");
    }

    fn frame_rate(&self) -> f64 {
        self.recording.frame_rate * self.speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiator::DescriptorNegotiator;
    use crate::types::HandSide;

    const RECORDING: &str = r#"
frame_rate: 100.0
devices:
  - serial: "ABC12345"
    product_id: 0x1202
    status: 1
events:
  - connection
  - device: 0
  - tracking:
      frame_id: 1
      hands:
        - id: 3
          side: left
          confidence: 0.9
  - idle
  - tracking: { frame_id: 2 }
"#;

    fn provider() -> ReplayProvider {
        ReplayProvider::new(Recording::from_yaml_str(RECORDING).unwrap())
    }

    fn next_event(provider: &ReplayProvider) -> Event<usize> {
        match provider.poll(&1, Duration::from_millis(50)).unwrap() {
            PollResult::Event(event) => event,
            PollResult::Timeout => panic!("expected an event"),
        }
    }

    #[test]
    fn parses_recording() {
        let recording = Recording::from_yaml_str(RECORDING).unwrap();
        assert_eq!(recording.frame_rate, 100.0);
        assert_eq!(recording.devices[0].product_id, 0x1202);
        assert_eq!(recording.events[0], RecordedEvent::Connection);
        assert_eq!(recording.events[1], RecordedEvent::Device(0));
        assert_eq!(recording.events[3], RecordedEvent::Idle);
        assert_eq!(recording.tracking_frames(), 2);
        assert_eq!(recording.duration(), Duration::from_millis(20));
    }

    #[test]
    fn rejects_undeclared_device() {
        let err = Recording::from_yaml_str("events:\n  - device: 2\n").unwrap_err();
        assert!(matches!(err, TrackingError::Parse { .. }));
    }

    #[test]
    fn rejects_non_positive_frame_rate() {
        let err = Recording::from_yaml_str("frame_rate: 0.0\n").unwrap_err();
        assert!(matches!(err, TrackingError::Parse { .. }));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = Recording::from_yaml_str("events: [ { tracking: ").unwrap_err();
        assert!(matches!(err, TrackingError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_recording_error() {
        let err = Recording::open("/nonexistent/session.yaml").unwrap_err();
        assert!(matches!(err, TrackingError::Recording { .. }));
    }

    #[test]
    fn serves_events_in_order() {
        let provider = provider();
        provider.create_session().unwrap();

        assert_eq!(next_event(&provider), Event::Connection);
        assert_eq!(next_event(&provider), Event::Device(0));
        match next_event(&provider) {
            Event::Tracking(frame) => {
                assert_eq!(frame.frame_id, 1);
                assert_eq!(frame.hand(HandSide::Left).map(|h| h.id), Some(3));
            }
            other => panic!("expected tracking, got {:?}", other),
        }
        assert_eq!(provider.poll(&1, Duration::from_millis(5)).unwrap(), PollResult::Timeout);
        assert!(matches!(next_event(&provider), Event::Tracking(f) if f.frame_id == 2));

        assert!(provider.is_exhausted());
        let start = Instant::now();
        assert_eq!(provider.poll(&1, Duration::from_millis(20)).unwrap(), PollResult::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn new_session_restarts_playback() {
        let provider = provider();
        assert_eq!(provider.create_session().unwrap(), 1);
        next_event(&provider);
        next_event(&provider);
        assert_eq!(provider.position(), 2);

        assert_eq!(provider.create_session().unwrap(), 2);
        assert_eq!(provider.position(), 0);
        assert_eq!(next_event(&provider), Event::Connection);
    }

    #[test]
    fn paces_tracking_events() {
        let mut yaml = String::from("frame_rate: 50.0\nevents:\n");
        for id in 1..=4 {
            yaml.push_str(&format!("  - tracking: {{ frame_id: {} }}\n", id));
        }
        let provider = ReplayProvider::new(Recording::from_yaml_str(&yaml).unwrap());
        provider.create_session().unwrap();

        let start = Instant::now();
        for _ in 0..4 {
            next_event(&provider);
        }
        // Three gaps of 20ms between four frames
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn speed_scales_pacing_and_rate() {
        let provider = provider().with_speed(2.0);
        assert_eq!(provider.frame_rate(), 200.0);
        assert_eq!(provider.frame_interval(), Duration::from_millis(5));

        let clamped = ReplayProvider::new(Recording::from_yaml_str(RECORDING).unwrap()).with_speed(0.0);
        assert_eq!(clamped.speed(), 0.1);
    }

    #[test]
    fn device_info_negotiates_buffer() {
        let provider = provider();
        let device = provider.open_device(&0).unwrap();

        let mut small = [0u8; 1];
        assert_eq!(
            provider.device_info(&device, &mut small).unwrap(),
            DescriptorFetch::InsufficientBuffer { required: 8 }
        );

        let descriptor = DescriptorNegotiator::default().negotiate(&provider, &0).unwrap();
        assert_eq!(descriptor.serial, "ABC12345");
        assert_eq!(descriptor.product, DeviceProduct::from(0x1202));
        assert!(descriptor.status.is_streaming());
    }

    #[test]
    fn unknown_device_fails_to_open() {
        let err = provider().open_device(&4).unwrap_err();
        assert!(matches!(err, TrackingError::DeviceOpen { .. }));
    }
}
