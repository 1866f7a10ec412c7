//! Stream combinators for async consumers

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
