//! Pluggable inter-attempt delay

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provides the pause between a failed attempt and the next one
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()>;
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(delay).boxed()
    }
}

/// Records every requested delay and returns immediately
///
/// Clones share the same record, so a test can keep one handle and give the
/// other to the runner.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order
    pub fn calls(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Total time the runner asked to wait
    pub fn total(&self) -> Duration {
        self.calls().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(delay);
        }
        futures::future::ready(()).boxed()
    }
}

impl<T: Sleeper + ?Sized> Sleeper for Arc<T> {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        (**self).sleep(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_recording_sleeper_shares_calls_across_clones() {
        let sleeper = RecordingSleeper::new();
        let handle = sleeper.clone();

        sleeper.sleep(Duration::from_millis(500)).await;
        sleeper.sleep(Duration::from_millis(250)).await;

        assert_eq!(
            handle.calls(),
            vec![Duration::from_millis(500), Duration::from_millis(250)]
        );
        assert_eq!(handle.total(), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_tokio_sleeper_waits() {
        let start = Instant::now();
        TokioSleeper.sleep(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
