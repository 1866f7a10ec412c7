//! Connection manager: session lifecycle and the consumer-facing surface

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::cache::LatestValueCache;
use crate::config::ServiceConfig;
use crate::driver::{Driver, DriverContext, DriverHandle, LoopStats};
use crate::provider::SessionProvider;
use crate::stream::ThrottleExt;
use crate::types::{DeviceDescriptor, TrackingFrame, UpdateRate};
use crate::{Result, TrackingError};


struct ManagerState<S> {
    session: Option<S>,
    driver: Option<DriverHandle>,
}

/// Owns one tracking session and the poll loop that serves it.
///
/// Consumers read the latest frame and device descriptor from any thread
/// through `&Connection`; reads never wait on the poll loop.
pub struct Connection<P: SessionProvider> {
    provider: Arc<P>,
    config: ServiceConfig,
    cache: Arc<LatestValueCache>,
    ready: Arc<watch::Sender<bool>>,
    state: Mutex<ManagerState<P::Session>>,
}

impl<P: SessionProvider> Connection<P> {
    /// Create a manager with default configuration. Nothing is opened yet.
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, ServiceConfig::default())
    }

    pub fn with_config(provider: P, config: ServiceConfig) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            provider: Arc::new(provider),
            config,
            cache: Arc::new(LatestValueCache::new()),
            ready: Arc::new(ready),
            state: Mutex::new(ManagerState { session: None, driver: None }),
        }
    }

    /// Open the session and start the poll loop.
    ///
    /// Idempotent: while running, returns the existing handle without touching
    /// the provider. Otherwise creates a session handle if there is none yet,
    /// activates it and spawns the poll loop.
    ///
    /// Creation and activation failures are returned and leave the manager
    /// stopped, so calling `open()` again retries. A handle whose activation
    /// failed is kept and reused by the retry. An invalid configuration is
    /// rejected before the provider is touched.
    ///
    /// A call made while `shutdown()` is in progress waits for it to finish
    /// and then opens a fresh session.
    pub fn open(&self) -> Result<P::Session> {
        self.config.validate()?;
        let mut state = self.state.lock();

        if let (Some(session), Some(driver)) = (&state.session, &state.driver) {
            if !driver.is_finished() {
                return Ok(session.clone());
            }
            warn!(?session, "Poll loop exited unexpectedly, restarting");
        }
        if let Some(stale) = state.driver.take() {
            stale.cancel();
        }

        let session = match &state.session {
            Some(session) => session.clone(),
            None => {
                let session = self.provider.create_session().map_err(|e| {
                    warn!("Failed to create session: {}", e);
                    into_connection_error("create session", e)
                })?;
                debug!(?session, "Session created");
                state.session = Some(session.clone());
                session
            }
        };

        self.provider.activate(&session).map_err(|e| {
            warn!(?session, "Failed to activate session: {}", e);
            into_connection_error("activate session", e)
        })?;

        let ctx = DriverContext {
            session: session.clone(),
            cache: Arc::clone(&self.cache),
            ready: Arc::clone(&self.ready),
            config: self.config.clone(),
        };
        state.driver = Some(Driver::spawn(Arc::clone(&self.provider), ctx)?);

        info!(?session, "Session open, poll loop running");
        Ok(session)
    }

    /// Current session handle, if one has been created.
    pub fn session(&self) -> Option<P::Session> {
        self.state.lock().session.clone()
    }

    /// Whether a poll loop is live for this connection.
    pub fn is_running(&self) -> bool {
        self.state.lock().driver.as_ref().is_some_and(|d| !d.is_finished())
    }

    /// Whether the service has confirmed the session. Never goes back to false.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the readiness flag is set.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let mut ready = self.ready.subscribe();
        match tokio::time::timeout(timeout, ready.wait_for(|is_ready| *is_ready)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(TrackingError::connection_failed("readiness channel closed")),
            Err(_) => Err(TrackingError::Timeout { duration: timeout }),
        }
    }

    pub fn read_frame(&self) -> Option<Arc<TrackingFrame>> {
        self.cache.read_frame()
    }

    pub fn read_device(&self) -> Option<Arc<DeviceDescriptor>> {
        self.cache.read_device()
    }

    /// Shared cache, for consumers that hold it independently of the manager.
    pub fn cache(&self) -> &Arc<LatestValueCache> {
        &self.cache
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Stream of published frames.
    ///
    /// Yields the current frame first (if any), then every later frame the
    /// consumer is fast enough to observe. With `UpdateRate::Max(hz)` below the
    /// provider's frame rate, at most `hz` frames per second are yielded,
    /// always the latest one.
    pub fn frames(&self, rate: UpdateRate) -> BoxStream<'static, Arc<TrackingFrame>> {
        let frames = WatchStream::new(self.cache.subscribe_frames()).filter_map(|opt| async move { opt });

        match rate.throttle_interval(self.provider.frame_rate()) {
            None => frames.boxed(),
            Some(interval) => frames.throttle(interval).boxed(),
        }
    }

    /// Stream of published device descriptors.
    pub fn device_updates(&self) -> BoxStream<'static, Arc<DeviceDescriptor>> {
        WatchStream::new(self.cache.subscribe_devices()).filter_map(|opt| async move { opt }).boxed()
    }

    /// Stop the poll loop and close the session.
    ///
    /// Blocks for about one poll timeout plus the device negotiation in
    /// flight, if any; device events still queued are dropped. Returns the
    /// loop's counters, or default counters if nothing was running. Cached
    /// values stay readable and the readiness flag stays set.
    ///
    /// The manager lock is held until the session is closed, so a concurrent
    /// `open()` cannot start a new session while the old one is shutting down.
    pub fn shutdown(&self) -> Result<LoopStats> {
        let mut state = self.state.lock();
        Self::stop(&self.provider, &mut state)
    }

    fn stop(provider: &P, state: &mut ManagerState<P::Session>) -> Result<LoopStats> {
        let stats = match state.driver.take() {
            Some(driver) => driver.join(),
            None => Ok(LoopStats::default()),
        };

        // Close the session even if a thread panicked
        if let Some(session) = state.session.take() {
            provider.close_session(&session);
            info!(?session, "Session closed");
        }
        stats
    }
}

impl<P: SessionProvider> Drop for Connection<P> {
    fn drop(&mut self) {
        debug!("Dropping connection");
        if let Err(e) = Self::stop(&self.provider, self.state.get_mut()) {
            warn!("Poll loop did not stop cleanly: {}", e);
        }
    }
}

fn into_connection_error(operation: &str, err: TrackingError) -> TrackingError {
    match err {
        TrackingError::Connection { .. } => err,
        other => TrackingError::connection_failed_with_source(
            format!("{} failed", operation),
            Box::new(other),
        ),
    }
}
