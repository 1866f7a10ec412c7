//! Events delivered by a tracking session

use super::TrackingFrame;

/// One message received from a session poll.
///
/// `D` is the provider's raw device reference type. It is an owned value: the
/// poll loop hands it to the device thread, which opens it after the poll that
/// delivered it has returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<D> {
    /// A new tracking frame (already copied out of provider memory)
    Tracking(TrackingFrame),
    /// A device was attached or became available
    Device(D),
    /// A device was detached
    DeviceLost(D),
    /// The service confirmed the session is live
    Connection,
    /// The service dropped the session
    ConnectionLost,
    /// A message type this crate does not handle
    Other(u32),
}

impl<D> Event<D> {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Tracking(_) => "tracking",
            Event::Device(_) => "device",
            Event::DeviceLost(_) => "device_lost",
            Event::Connection => "connection",
            Event::ConnectionLost => "connection_lost",
            Event::Other(_) => "other",
        }
    }
}

/// Result of one bounded poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult<D> {
    Event(Event<D>),
    /// Nothing arrived within the timeout
    Timeout,
}
