//! Keep-alive sources for the dispatcher.
//!
//! The receiver drops a control connection that carries no traffic for a
//! while. The dispatcher polls a [`KeepAliveSource`] alongside its request
//! queue and sends a no-op each time the source fires, so keep-alive traffic
//! goes through the same single writer as every other command.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// A trigger the dispatcher waits on to emit no-op commands.
///
/// `tick` must be cancel-safe: the dispatcher drops the pending future
/// whenever a queued command wins the race.
#[async_trait]
pub trait KeepAliveSource: Send + 'static {
    /// Completes when the next no-op should be sent.
    async fn tick(&mut self);
}

/// Fires at a fixed period, starting one full period after creation.
pub struct IntervalKeepAlive {
    interval: Interval,
}

impl IntervalKeepAlive {
    /// Creates a source that fires every `period`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        // A tick missed while a slow command was in flight should not
        // turn into a burst of no-ops afterwards.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl KeepAliveSource for IntervalKeepAlive {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Never fires. Callers that drive keep-alive themselves use `Link::noop`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeepAlive;

#[async_trait]
impl KeepAliveSource for NoKeepAlive {
    async fn tick(&mut self) {
        std::future::pending::<()>().await;
    }
}
