//! Session providers shipped with the crate
//!
//! Live service bindings implement [`SessionProvider`](crate::SessionProvider)
//! outside this crate; the replay provider serves recorded sessions for tests,
//! demos and offline development.

pub mod replay;

pub use replay::{RecordedDevice, RecordedEvent, Recording, ReplayProvider};
