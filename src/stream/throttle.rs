//! Latest-wins throttling for frame streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Emit at most one item per `period`.
    ///
    /// Items arriving faster than that are dropped except for the newest,
    /// which is what a consumer of tracking state wants.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`]
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        period: Duration,
        // Created on first poll so the stream can be built outside a runtime
        interval: Option<Interval>,
        pending: Option<S::Item>,
        done: bool,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        Self { stream, period, interval: None, pending: None, done: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.done {
            return Poll::Ready(this.pending.take());
        }

        // Drain whatever is ready, keeping only the newest
        loop {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => {
                    *this.done = true;
                    return Poll::Ready(this.pending.take());
                }
                Poll::Pending => break,
            }
        }

        if this.pending.is_none() {
            return Poll::Pending;
        }

        let period = *this.period;
        let ticker = this.interval.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        ready!(ticker.poll_tick(cx));

        Poll::Ready(this.pending.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_latest() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = Box::pin(UnboundedReceiverStream::new(rx).throttle(Duration::from_millis(100)));

        for i in 0..5 {
            tx.send(i).unwrap();
        }
        // First tick of a tokio interval completes immediately
        assert_eq!(stream.next().await, Some(4));

        for i in 5..10 {
            tx.send(i).unwrap();
        }
        let start = tokio::time::Instant::now();
        assert_eq!(stream.next().await, Some(9));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_stream_flushes_pending() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = Box::pin(UnboundedReceiverStream::new(rx).throttle(Duration::from_millis(50)));

        tx.send(1).unwrap();
        drop(tx);
        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, None);
    }
}
