use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// User-visible notification seam. The embedding surface decides how
/// messages are rendered; the core only decides when to emit them.
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default notifier: routes everything to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// Warning throttle: at most one warning per interval. Concurrent failures
/// race on a compare-and-set, so exactly one of them notifies.
pub struct RateLimitedWarner {
    notifier: Arc<dyn Notifier>,
    min_interval: Duration,
    last_warned_ms: AtomicU64,
}

impl RateLimitedWarner {
    pub fn new(notifier: Arc<dyn Notifier>, min_interval: Duration) -> Self {
        Self {
            notifier,
            min_interval,
            last_warned_ms: AtomicU64::new(0),
        }
    }

    /// Emit the warning unless one was emitted within the interval.
    /// Returns whether the message went through.
    pub fn warn(&self, message: &str) -> bool {
        let now = epoch_millis();
        let last = self.last_warned_ms.load(Ordering::Relaxed);
        if last != 0 && now.saturating_sub(last) < self.min_interval.as_millis() as u64 {
            return false;
        }
        if self
            .last_warned_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        self.notifier.warn(message);
        true
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
