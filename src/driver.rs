//! Driver runs the poll loop and device negotiation on dedicated threads

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::cache::LatestValueCache;
use crate::config::ServiceConfig;
use crate::negotiator::DescriptorNegotiator;
use crate::provider::SessionProvider;
use crate::types::{Event, PollResult};
use crate::{Result, TrackingError};

/// Counters collected by one run of the poll loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub polls: u64,
    pub timeouts: u64,
    pub frames: u64,
    pub devices: u64,
    pub device_failures: u64,
    pub poll_failures: u64,
    pub ignored: u64,
    /// Device events still queued when the loop was cancelled
    pub dropped_devices: u64,
}

/// Handle to a running poll loop and its device worker
pub struct DriverHandle {
    poll_thread: Option<JoinHandle<LoopStats>>,
    device_thread: Option<JoinHandle<DeviceStats>>,
    cancel: CancellationToken,
}

impl DriverHandle {
    /// Request the loop to stop. It exits within one poll timeout.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.poll_thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Cancel and wait for both threads to exit.
    pub fn join(mut self) -> Result<LoopStats> {
        self.cancel.cancel();

        let mut stats = match self.poll_thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| TrackingError::provider_failed("poll", "poll thread panicked"))?,
            None => LoopStats::default(),
        };

        // The poll thread dropped its sender on exit, so the worker drains and stops
        if let Some(thread) = self.device_thread.take() {
            let devices = thread.join().map_err(|_| {
                TrackingError::provider_failed("device_info", "device thread panicked")
            })?;
            stats.devices = devices.published;
            stats.device_failures = devices.failures;
            stats.dropped_devices = devices.dropped;
        }

        Ok(stats)
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything the poll loop needs besides the provider
pub struct DriverContext<S> {
    pub session: S,
    pub cache: Arc<LatestValueCache>,
    pub ready: Arc<watch::Sender<bool>>,
    pub config: ServiceConfig,
}

#[derive(Debug, Default, Clone, Copy)]
struct DeviceStats {
    published: u64,
    failures: u64,
    dropped: u64,
}

/// Driver spawns and manages the poll loop
///
/// Two threads per session:
/// - the poll thread owns the polling side of the session, publishes frames
///   and flips the readiness flag on the first connection event
/// - the device thread runs descriptor negotiation for device events in
///   arrival order, so a slow device never holds up frame publication
///
/// Failures never end the poll loop; only cancellation does. Once cancelled,
/// the device thread finishes the negotiation in flight, drops whatever is
/// still queued and stops when the poll thread is gone.
///
/// Device references are handed from the poll thread to the device thread,
/// so `open_device` runs after the `poll` that delivered the reference
/// returned and may overlap later polls.
pub struct Driver;

impl Driver {
    /// Spawn the poll and device threads
    pub fn spawn<P>(provider: Arc<P>, ctx: DriverContext<P::Session>) -> Result<DriverHandle>
    where
        P: SessionProvider,
    {
        let cancel = CancellationToken::new();
        let (device_tx, device_rx) = mpsc::unbounded_channel();

        let negotiator = DescriptorNegotiator::new(ctx.config.initial_serial_capacity);
        let device_provider = Arc::clone(&provider);
        let device_cache = Arc::clone(&ctx.cache);
        let device_cancel = cancel.clone();
        let device_thread = std::thread::Builder::new()
            .name(format!("{}-device", ctx.config.thread_name))
            .spawn(move || {
                Self::device_worker(
                    device_provider.as_ref(),
                    negotiator,
                    device_rx,
                    &device_cache,
                    &device_cancel,
                )
            })
            .map_err(|source| TrackingError::Spawn { source })?;

        let poll_cancel = cancel.clone();
        let poll_thread = std::thread::Builder::new()
            .name(ctx.config.thread_name.clone())
            .spawn(move || Self::poll_loop(provider.as_ref(), ctx, device_tx, &poll_cancel));

        let poll_thread = match poll_thread {
            Ok(thread) => thread,
            Err(source) => {
                // device_tx went down with the failed closure, so the worker exits on its own
                cancel.cancel();
                let _ = device_thread.join();
                return Err(TrackingError::Spawn { source });
            }
        };

        Ok(DriverHandle {
            poll_thread: Some(poll_thread),
            device_thread: Some(device_thread),
            cancel,
        })
    }

    fn poll_loop<P>(
        provider: &P,
        ctx: DriverContext<P::Session>,
        device_tx: mpsc::UnboundedSender<P::DeviceRef>,
        cancel: &CancellationToken,
    ) -> LoopStats
    where
        P: SessionProvider,
    {
        let DriverContext { session, cache, ready, config } = ctx;
        let timeout = config.poll_timeout();

        info!(?session, timeout_ms = config.poll_timeout_ms, "Poll loop started");
        let mut stats = LoopStats::default();
        let mut consecutive_failures = 0u32;

        loop {
            if cancel.is_cancelled() {
                info!("Poll loop cancelled");
                break;
            }

            stats.polls += 1;
            let event = match provider.poll(&session, timeout) {
                Ok(PollResult::Event(event)) => event,
                Ok(PollResult::Timeout) => {
                    stats.timeouts += 1;
                    consecutive_failures = 0;
                    trace!("Poll timed out");
                    continue;
                }
                Err(e) => {
                    // Transient; keep polling after a short backoff
                    stats.poll_failures += 1;
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    let backoff = config.backoff_for(consecutive_failures);
                    if consecutive_failures == 1 {
                        warn!("Poll failed: {}", e);
                    } else {
                        debug!(consecutive_failures, ?backoff, "Poll failed again: {}", e);
                    }
                    sleep_unless_cancelled(cancel, backoff);
                    continue;
                }
            };

            consecutive_failures = 0;
            trace!(kind = event.kind(), "Event received");

            match event {
                Event::Tracking(frame) => {
                    stats.frames += 1;
                    trace!(frame_id = frame.frame_id, hands = frame.hands.len(), "Tracking frame");
                    cache.write_frame(frame);
                }
                Event::Device(device_ref) => {
                    debug!(?device_ref, "Device event queued for negotiation");
                    if let Err(mpsc::error::SendError(device_ref)) = device_tx.send(device_ref) {
                        error!(?device_ref, "Device thread gone, dropping device event");
                    }
                }
                Event::Connection => {
                    let flipped = ready.send_if_modified(|is_ready| {
                        let was_ready = *is_ready;
                        *is_ready = true;
                        !was_ready
                    });
                    if flipped {
                        info!("Session connected");
                    } else {
                        debug!("Repeated connection event");
                    }
                }
                Event::DeviceLost(device_ref) => {
                    stats.ignored += 1;
                    debug!(?device_ref, "Device lost, keeping last descriptor");
                }
                Event::ConnectionLost => {
                    stats.ignored += 1;
                    debug!("Connection lost event ignored");
                }
                Event::Other(tag) => {
                    stats.ignored += 1;
                    debug!(tag, "Unhandled event type");
                }
            }
        }

        info!(
            polls = stats.polls,
            frames = stats.frames,
            poll_failures = stats.poll_failures,
            "Poll loop ended"
        );
        stats
    }

    fn device_worker<P>(
        provider: &P,
        negotiator: DescriptorNegotiator,
        mut device_rx: mpsc::UnboundedReceiver<P::DeviceRef>,
        cache: &LatestValueCache,
        cancel: &CancellationToken,
    ) -> DeviceStats
    where
        P: SessionProvider,
    {
        let mut stats = DeviceStats::default();

        // Ends once the poll thread drops its sender
        while let Some(device_ref) = device_rx.blocking_recv() {
            if cancel.is_cancelled() {
                stats.dropped += 1;
                debug!(?device_ref, "Shutting down, dropping queued device event");
                continue;
            }
            match negotiator.negotiate(provider, &device_ref) {
                Ok(descriptor) => {
                    stats.published += 1;
                    info!(
                        serial = %descriptor.serial,
                        product = ?descriptor.product,
                        "Device descriptor updated"
                    );
                    cache.write_device(descriptor);
                }
                Err(e) => {
                    stats.failures += 1;
                    error!(?device_ref, "Device event not handled: {}", e);
                }
            }
        }

        debug!(
            published = stats.published,
            failures = stats.failures,
            dropped = stats.dropped,
            "Device thread ended"
        );
        stats
    }
}

/// Sleep for `duration` in short slices so a cancel is noticed promptly.
fn sleep_unless_cancelled(cancel: &CancellationToken, duration: Duration) {
    const SLICE: Duration = Duration::from_millis(10);
    let mut remaining = duration;
    while !remaining.is_zero() && !cancel.is_cancelled() {
        let step = remaining.min(SLICE);
        std::thread::sleep(step);
        remaining -= step;
    }
}
