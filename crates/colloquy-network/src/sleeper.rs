use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Waits between retry attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately. For tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.delays.lock().map(|d| d.len()).unwrap_or(0)
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_sleeper_records() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_millis(5)).await;
        sleeper.sleep(Duration::from_millis(10)).await;

        assert_eq!(sleeper.count(), 2);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(5), Duration::from_millis(10)]
        );
    }

    #[tokio::test]
    async fn test_clones_share_log() {
        let sleeper = RecordingSleeper::new();
        let clone = sleeper.clone();
        clone.sleep(Duration::from_secs(1)).await;
        assert_eq!(sleeper.count(), 1);
    }

    #[tokio::test]
    async fn test_tokio_sleeper_zero() {
        TokioSleeper.sleep(Duration::ZERO).await;
    }
}
