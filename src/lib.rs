//! Thread-safe access to hand-tracking sessions.
//!
//! Handtrack keeps one session with a tracking service open, polls it on a
//! dedicated thread, and publishes the most recent tracking frame and device
//! descriptor into a latest-value cache that any number of threads can read
//! without waiting on the poll loop.
//!
//! # Features
//!
//! - **Idempotent sessions**: `open()` creates, activates and starts polling once
//! - **Lock-light reads**: each cached value sits behind its own short lock
//! - **Device negotiation**: variable-length serials fetched with a
//!   grow-and-retry-once buffer protocol, off the frame path
//! - **Replay**: recorded sessions served through the same provider trait
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use handtrack::{HandTrack, UpdateRate};
//! use futures::StreamExt;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = HandTrack::replay("session.yaml")?;
//!     connection.wait_until_ready(Duration::from_secs(2)).await?;
//!
//!     let mut frames = connection.frames(UpdateRate::Max(30));
//!     while let Some(frame) = frames.next().await {
//!         println!("frame {} with {} hands", frame.frame_id, frame.hand_count());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod driver;
mod error;
pub mod negotiator;
pub mod provider;
pub mod providers;
pub mod stream;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub use cache::{FrameCursor, LatestValueCache};
pub use config::ServiceConfig;
pub use connection::Connection;
pub use driver::LoopStats;
pub use error::*;
pub use negotiator::DescriptorNegotiator;
pub use provider::SessionProvider;
pub use providers::{Recording, ReplayProvider};
pub use types::*;

/// Entry point for opening tracking connections.
///
/// ```rust,no_run
/// use handtrack::HandTrack;
///
/// let connection = HandTrack::replay("session.yaml")?;
/// if let Some(frame) = connection.read_frame() {
///     println!("latest frame {}", frame.frame_id);
/// }
/// # Ok::<(), handtrack::TrackingError>(())
/// ```
pub struct HandTrack;

impl HandTrack {
    /// Open a session on `provider` with default configuration.
    ///
    /// # Errors
    ///
    /// Returns the creation or activation failure. Use [`Connection::new`]
    /// directly to keep the manager around and retry `open()` later.
    pub fn connect<P: SessionProvider>(provider: P) -> Result<Connection<P>> {
        Self::connect_with_config(provider, ServiceConfig::default())
    }

    pub fn connect_with_config<P: SessionProvider>(
        provider: P,
        config: ServiceConfig,
    ) -> Result<Connection<P>> {
        let connection = Connection::with_config(provider, config);
        connection.open()?;
        Ok(connection)
    }

    /// Replay a recorded session from a YAML file.
    pub fn replay<P: AsRef<std::path::Path>>(path: P) -> Result<Connection<ReplayProvider>> {
        Self::connect(ReplayProvider::open(path)?)
    }
}
