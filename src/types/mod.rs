//! Core data types for hand-tracking state.
//!
//! - [`TrackingFrame`] is one snapshot of tracked hands, replaced wholesale on
//!   every tracking event
//! - [`DeviceDescriptor`] describes the attached device, including its
//!   variable-length serial
//! - [`Event`] and [`PollResult`] are what a provider hands back from a poll
//! - [`UpdateRate`] controls how often async frame streams yield

mod device;
mod event;
mod frame;
mod update_rate;

pub use device::{
    DescriptorFetch, DeviceDescriptor, DeviceFailure, DeviceProduct, DeviceProperties,
    DeviceStatus, status,
};
pub use event::{Event, PollResult};
pub use frame::{Bone, Digit, Finger, Hand, HandSide, Palm, Quaternion, TrackingFrame, Vector3};
pub use update_rate::UpdateRate;
