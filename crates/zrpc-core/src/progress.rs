//! Progress tracking for streamed transfers.
//!
//! `ProgressTracker` counts bytes flowing through a transfer pipeline and
//! reports percent-granularity updates, so callers are not flooded with a
//! callback per chunk. A separate keep-alive hook fires on every chunk,
//! because liveness needs finer granularity than percentage.

use std::sync::Arc;

/// Callback for transfer progress, invoked with a 0-100 percentage.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, percent: u8);
}

/// A no-op progress callback that ignores all updates.
pub struct NoOpCallback;

impl ProgressCallback for NoOpCallback {
    fn on_progress(&self, _percent: u8) {}
}

struct FnCallback<F>(F);

impl<F> ProgressCallback for FnCallback<F>
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        (self.0)(percent)
    }
}

/// Helper to create an Arc-wrapped callback from a closure.
pub fn callback<F>(f: F) -> Arc<dyn ProgressCallback>
where
    F: Fn(u8) + Send + Sync + 'static,
{
    Arc::new(FnCallback(f))
}

/// Pass-through byte accounting with change-only percent reporting.
pub struct ProgressTracker {
    processed: u64,
    total: Option<u64>,
    last_percent: Option<u8>,
    progress: Option<Arc<dyn ProgressCallback>>,
    keepalive: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ProgressTracker {
    /// Create a tracker. When both a callback and a total are present, the
    /// callback is immediately invoked with 0 so consumers can render an
    /// empty bar before the first byte moves.
    pub fn new(progress: Option<Arc<dyn ProgressCallback>>, total: Option<u64>) -> Self {
        let mut tracker = Self {
            processed: 0,
            total,
            last_percent: None,
            progress,
            keepalive: None,
        };
        if tracker.total.is_some() {
            tracker.report(0);
        }
        tracker
    }

    /// Attach a hook invoked on every chunk regardless of percent change.
    pub fn with_keepalive(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.keepalive = Some(Box::new(hook));
        self
    }

    /// Record `n` bytes moving through the pipeline.
    pub fn update(&mut self, n: usize) {
        self.processed += n as u64;
        if let Some(hook) = &self.keepalive {
            hook();
        }
        if let Some(total) = self.total.filter(|t| *t > 0) {
            let percent = (self.processed as f64 / total as f64 * 100.0).round() as u64;
            self.report(percent.min(100) as u8);
        }
    }

    /// Total bytes processed so far.
    pub fn bytes_processed(&self) -> u64 {
        self.processed
    }

    fn report(&mut self, percent: u8) {
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        if let Some(cb) = &self.progress {
            cb.on_progress(percent);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn recording() -> (Arc<dyn ProgressCallback>, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cloned = Arc::clone(&seen);
        (callback(move |p| cloned.lock().unwrap().push(p)), seen)
    }

    #[test]
    fn reports_zero_on_creation() {
        let (cb, seen) = recording();
        let _tracker = ProgressTracker::new(Some(cb), Some(100));
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[test]
    fn reports_only_on_percent_change() {
        let (cb, seen) = recording();
        let mut tracker = ProgressTracker::new(Some(cb), Some(1000));
        tracker.update(250);
        tracker.update(250);
        tracker.update(250);
        tracker.update(250);
        assert_eq!(*seen.lock().unwrap(), vec![0, 25, 50, 75, 100]);
    }

    #[test]
    fn sub_percent_chunks_do_not_flood() {
        let (cb, seen) = recording();
        let mut tracker = ProgressTracker::new(Some(cb), Some(100_000));
        for _ in 0..100 {
            tracker.update(1);
        }
        // 100 bytes of 100k is still 0%: only the initial report fired.
        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert_eq!(tracker.bytes_processed(), 100);
    }

    #[test]
    fn percent_is_capped_at_100() {
        let (cb, seen) = recording();
        let mut tracker = ProgressTracker::new(Some(cb), Some(10));
        tracker.update(25);
        assert_eq!(seen.lock().unwrap().last(), Some(&100));
    }

    #[test]
    fn keepalive_fires_every_chunk() {
        let ticks = Arc::new(AtomicU64::new(0));
        let cloned = Arc::clone(&ticks);
        let mut tracker = ProgressTracker::new(None, None)
            .with_keepalive(move || {
                cloned.fetch_add(1, Ordering::SeqCst);
            });
        for _ in 0..7 {
            tracker.update(1);
        }
        assert_eq!(ticks.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn counts_without_total() {
        let mut tracker = ProgressTracker::new(None, None);
        tracker.update(512);
        tracker.update(512);
        assert_eq!(tracker.bytes_processed(), 1024);
    }
}
