// Global pacing for requests to the ranking site, which blocks aggressive clients.

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};

/// Spaces out callers of [`Throttle::wait`] by at least `min_interval`, plus a
/// little random jitter. Share one instance (behind an `Arc`) across every
/// worker that talks to the same site.
pub struct Throttle {
    min_interval: Duration,
    max_jitter: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_jitter(min_interval, Duration::from_millis(500))
    }

    pub fn with_jitter(min_interval: Duration, max_jitter: Duration) -> Self {
        Self {
            min_interval,
            max_jitter,
            last: Mutex::new(None),
        }
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(..=max))
    }

    /// Waits until this caller may issue its request. The lock is held while
    /// sleeping so concurrent callers queue up one interval apart.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            sleep_until(prev + self.min_interval + self.jitter()).await;
        }
        *last = Some(Instant::now());
    }
}
