//! Provider trait for tracking services

use std::fmt::Debug;
use std::time::Duration;

use crate::Result;
use crate::types::{DescriptorFetch, PollResult};

/// Trait for tracking session providers
///
/// A provider wraps whatever actually talks to the tracking service (a native
/// client library, a network bridge, a recording). The core only ever calls
/// the narrow set of operations below.
///
/// All methods take `&self`: the connection manager, the poll thread and the
/// device thread share one provider, so implementations synchronise
/// internally where they need to. `poll` is only ever called from the poll
/// thread. The device methods run on the device thread, concurrently with
/// `poll` and after the poll that produced the device reference returned.
pub trait SessionProvider: Send + Sync + 'static {
    /// Opaque identity of one logical connection to the service
    type Session: Clone + Debug + Send + Sync + 'static;

    /// Raw device reference carried by device events
    ///
    /// Must be an owned value that stays valid after `poll` returns, at least
    /// until `open_device` has been called on it. It must not borrow from the
    /// provider's poll buffers, and ids must not be recycled while a reference
    /// may still be queued for negotiation.
    type DeviceRef: Debug + Send + 'static;

    /// Handle to an opened device
    type Device: Send;

    /// Create a new session handle. Does not connect yet.
    fn create_session(&self) -> Result<Self::Session>;

    /// Activate a created session.
    fn activate(&self, session: &Self::Session) -> Result<()>;

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns:
    /// - `Ok(PollResult::Event(event))` - an event arrived
    /// - `Ok(PollResult::Timeout)` - nothing arrived (not an error)
    /// - `Err(e)` - the poll itself failed
    ///
    /// Tracking frames in the returned event must be owned copies; the
    /// provider may recycle its own buffers once this call returns.
    fn poll(&self, session: &Self::Session, timeout: Duration) -> Result<PollResult<Self::DeviceRef>>;

    /// Open the device behind a reference taken from a device event.
    fn open_device(&self, device: &Self::DeviceRef) -> Result<Self::Device>;

    /// Fetch the device properties, writing the serial into `serial`.
    ///
    /// When `serial` is too short the provider reports the exact length it
    /// needs via [`DescriptorFetch::InsufficientBuffer`].
    fn device_info(&self, device: &Self::Device, serial: &mut [u8]) -> Result<DescriptorFetch>;

    /// Release an opened device.
    fn close_device(&self, device: Self::Device);

    /// Close a session during orderly shutdown.
    fn close_session(&self, _session: &Self::Session) {}

    /// Nominal tracking frame rate in Hz
    fn frame_rate(&self) -> f64 {
        120.0
    }
}
