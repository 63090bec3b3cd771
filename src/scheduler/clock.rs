use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of time for movement execution.
///
/// The scheduler only suspends through `sleep`, so swapping the clock swaps
/// real relay timing for instant, recorded waits.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now_monotonic(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Clock that returns from `sleep` immediately and remembers each request.
///
/// `now_monotonic` advances by the total requested sleep so elapsed-time
/// arithmetic still adds up.
#[derive(Debug)]
pub struct SimulatedClock {
    start: Instant,
    sleeps: Mutex<Vec<Duration>>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }

    pub fn clear(&self) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.clear();
        }
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now_monotonic(&self) -> Instant {
        self.start + self.total_slept()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}
