//! Injectable time source.
//!
//! Every wall-clock read and every wait in the engine goes through [`Clock`],
//! so tests can run polling loops without real delay.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time source and timer.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Shared reference to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Production clock backed by the tokio timer.
///
/// Wall time is anchored at construction and advanced by the tokio monotonic
/// clock, so a runtime with paused time (`start_paused = true`) moves `now()`
/// forward exactly as far as its timers.
#[derive(Debug, Clone)]
pub struct SystemClock {
    wall_origin: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Clock whose `now()` reads `wall_origin` at construction. Combined with
    /// paused tokio time this replays a fixed moment at full speed.
    pub fn starting_at(wall_origin: DateTime<Utc>) -> Self {
        Self {
            wall_origin,
            origin: tokio::time::Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.origin.elapsed();
        self.wall_origin
            + chrono::Duration::milliseconds(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Hand-driven clock: `sleep` advances time instantly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn shared(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    /// Move time forward without suspending.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::milliseconds(
            i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
        );
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn manual_clock_sleep_advances_time() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.sleep(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_follows_paused_runtime() {
        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_secs(300)).await;
        let elapsed = clock.now() - before;
        assert!(elapsed >= chrono::Duration::seconds(300));
        assert!(elapsed < chrono::Duration::seconds(301));
    }

    #[tokio::test(start_paused = true)]
    async fn anchored_clock_starts_at_given_instant() {
        let start = Utc.with_ymd_and_hms(2025, 6, 10, 14, 0, 0).unwrap();
        let clock = SystemClock::starting_at(start);
        assert_eq!(clock.now(), start);
        clock.sleep(Duration::from_secs(60)).await;
        let elapsed = clock.now() - start;
        assert!(elapsed >= chrono::Duration::seconds(60));
        assert!(elapsed < chrono::Duration::seconds(61));
    }
}
