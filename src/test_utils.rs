//! Test utilities: a scriptable provider and fixture path resolution
//!
//! [`ScriptedProvider`] lets tests queue poll results, inject creation and
//! activation failures, and inspect exactly which provider calls were made.

#![cfg(any(test, feature = "benchmark"))]

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;
use std::time::Duration;

use crate::provider::SessionProvider;
use crate::types::{
    DescriptorFetch, DeviceProduct, DeviceProperties, DeviceStatus, Event, PollResult,
    TrackingFrame,
};
use crate::{Result, TrackingError};

/// Guidance shown when recording fixtures are missing from the checkout.
pub const FIXTURE_INSTALL_GUIDANCE: &str =
    "Recording fixtures are stored under test-data/recordings/.";

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Find the repository root by walking up to the directory holding `Cargo.toml`
/// and `test-data/`.
pub fn find_repository_root() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

    loop {
        if current_dir.join("test-data").is_dir() {
            return Ok(current_dir);
        }

        if let Some(parent) = current_dir.parent() {
            current_dir = parent.to_path_buf();
        } else {
            return Err("Repository root with test-data/ not found".into());
        }
    }
}

/// Resolve a recording fixture by file name.
pub fn recording_fixture(name: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = find_repository_root()?.join("test-data").join("recordings").join(name);
    require_fixture(&path)
}

fn require_fixture(path: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(format!("Missing fixture: {}. {}", path.display(), FIXTURE_INSTALL_GUIDANCE).into())
    }
}

/// A device known to a [`ScriptedProvider`].
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    pub serial: Vec<u8>,
    pub product: DeviceProduct,
    pub status: DeviceStatus,
    /// Reject every buffer as too small
    pub always_insufficient: bool,
    /// Fail `device_info` outright
    pub failing_info: bool,
    /// Sleep inside `device_info` to simulate a slow device
    pub info_delay: Option<Duration>,
    /// Answer every request with `InsufficientBuffer { required }` using this length
    pub reported_required: Option<usize>,
    /// Claim this many serial bytes in a complete answer
    pub reported_serial_len: Option<usize>,
}

impl ScriptedDevice {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.as_bytes().to_vec(),
            product: DeviceProduct::Rigel,
            status: DeviceStatus::new(crate::types::status::STREAMING),
            always_insufficient: false,
            failing_info: false,
            info_delay: None,
            reported_required: None,
            reported_serial_len: None,
        }
    }

    pub fn always_insufficient(mut self) -> Self {
        self.always_insufficient = true;
        self
    }

    pub fn failing_info(mut self) -> Self {
        self.failing_info = true;
        self
    }

    pub fn with_info_delay(mut self, delay: Duration) -> Self {
        self.info_delay = Some(delay);
        self
    }

    pub fn reporting_required(mut self, required: usize) -> Self {
        self.reported_required = Some(required);
        self
    }

    pub fn with_reported_serial_len(mut self, len: usize) -> Self {
        self.reported_serial_len = Some(len);
        self
    }
}

#[derive(Default)]
struct ScriptState {
    polls: VecDeque<Result<PollResult<usize>>>,
    devices: Vec<ScriptedDevice>,
    create_failures: u32,
    activate_failures: u32,
    info_buffer_sizes: Vec<usize>,
    next_session: u64,
    closed_sessions: Vec<u64>,
    poll_threads: HashSet<ThreadId>,
}

/// In-memory provider driven by a queue of poll results.
///
/// Sessions are plain `u64` ids, device references are indices into the list
/// of devices added with [`add_device`](Self::add_device). Once the queue is
/// empty every poll sleeps for its timeout and reports `Timeout`.
#[derive(Default)]
pub struct ScriptedProvider {
    state: Mutex<ScriptState>,
    create_calls: AtomicUsize,
    activate_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    open_calls: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, device: ScriptedDevice) -> usize {
        let mut state = self.state.lock();
        state.devices.push(device);
        state.devices.len() - 1
    }

    pub fn push_event(&self, event: Event<usize>) {
        self.state.lock().polls.push_back(Ok(PollResult::Event(event)));
    }

    pub fn push_frame(&self, frame: TrackingFrame) {
        self.push_event(Event::Tracking(frame));
    }

    pub fn push_timeout(&self) {
        self.state.lock().polls.push_back(Ok(PollResult::Timeout));
    }

    pub fn push_poll_error(&self, reason: &str) {
        self.state.lock().polls.push_back(Err(TrackingError::poll_failed(reason)));
    }

    pub fn fail_create(&self, times: u32) {
        self.state.lock().create_failures = times;
    }

    pub fn fail_activate(&self, times: u32) {
        self.state.lock().activate_failures = times;
    }

    pub fn pending_polls(&self) -> usize {
        self.state.lock().polls.len()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn activate_calls(&self) -> usize {
        self.activate_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    /// Every `open_device` call, including failed ones.
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Devices opened and not yet closed.
    pub fn open_devices(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }

    pub fn closed_devices(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Buffer length offered on every `device_info` call, in order.
    pub fn info_buffer_sizes(&self) -> Vec<usize> {
        self.state.lock().info_buffer_sizes.clone()
    }

    /// Number of distinct threads that have called `poll`.
    pub fn poll_thread_count(&self) -> usize {
        self.state.lock().poll_threads.len()
    }

    pub fn closed_sessions(&self) -> Vec<u64> {
        self.state.lock().closed_sessions.clone()
    }
}

impl SessionProvider for ScriptedProvider {
    type Session = u64;
    type DeviceRef = usize;
    type Device = usize;

    fn create_session(&self) -> Result<u64> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.create_failures > 0 {
            state.create_failures -= 1;
            return Err(TrackingError::connection_failed("scripted create failure"));
        }
        state.next_session += 1;
        Ok(state.next_session)
    }

    fn activate(&self, _session: &u64) -> Result<()> {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.activate_failures > 0 {
            state.activate_failures -= 1;
            return Err(TrackingError::connection_failed("scripted activate failure"));
        }
        Ok(())
    }

    fn poll(&self, _session: &u64, timeout: Duration) -> Result<PollResult<usize>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut state = self.state.lock();
            state.poll_threads.insert(std::thread::current().id());
            state.polls.pop_front()
        };
        match next {
            Some(result) => result,
            None => {
                std::thread::sleep(timeout);
                Ok(PollResult::Timeout)
            }
        }
    }

    fn open_device(&self, device: &usize) -> Result<usize> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if *device >= self.state.lock().devices.len() {
            return Err(TrackingError::device_open_failed(format!("no device {}", device)));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(*device)
    }

    fn device_info(&self, device: &usize, serial: &mut [u8]) -> Result<DescriptorFetch> {
        let scripted = {
            let mut state = self.state.lock();
            state.info_buffer_sizes.push(serial.len());
            state
                .devices
                .get(*device)
                .cloned()
                .ok_or_else(|| TrackingError::descriptor_fetch_failed("device vanished"))?
        };

        if let Some(delay) = scripted.info_delay {
            std::thread::sleep(delay);
        }
        if scripted.failing_info {
            return Err(TrackingError::provider_failed("device_info", "scripted failure"));
        }

        if let Some(required) = scripted.reported_required {
            return Ok(DescriptorFetch::InsufficientBuffer { required });
        }

        let required = scripted.serial.len();
        if scripted.always_insufficient || serial.len() < required {
            return Ok(DescriptorFetch::InsufficientBuffer { required });
        }

        serial[..required].copy_from_slice(&scripted.serial);
        Ok(DescriptorFetch::Complete(DeviceProperties {
            serial_len: scripted.reported_serial_len.unwrap_or(required),
            product: scripted.product,
            status: scripted.status,
            caps: 0,
            baseline_um: 40_000,
            h_fov: 2.53,
            v_fov: 2.53,
            range_um: 800_000,
        }))
    }

    fn close_device(&self, _device: usize) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn close_session(&self, session: &u64) {
        self.state.lock().closed_sessions.push(*session);
    }
}
