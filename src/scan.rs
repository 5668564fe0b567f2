//! # Proximity Scanner
//!
//! Drives the full pipeline against an [`ObservationSource`]:
//!
//! 1. Ask the source for the global start-time range
//! 2. Partition it into windows ([`WindowPartitioner`])
//! 3. Fetch each window's observations, retrying transient failures
//! 4. Bucketize the window and run the pair finder on every bucket with at
//!    least two observations
//! 5. Union each window's pairs into the run's [`PairSet`]
//!
//! Windows are fetched one after another. With the `parallel` feature the
//! buckets of a window are searched concurrently, each worker filling its own
//! shard that is merged afterwards.
//!
//! A [`CancelToken`] is checked before every window. Cancelling keeps the pairs
//! found so far, which are always a valid subset of the full result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use log::{debug, info, warn};
use serde::Serialize;

use crate::bucket::{bucketize, Buckets};
use crate::error::{ProximityError, Result};
use crate::pairs::find_close_pairs_with;
use crate::source::ObservationSource;
use crate::window::{Window, WindowPartitioner};
use crate::{Observation, PairSet, ProximityConfig};

/// Cooperative cancellation flag shared between a scan and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The scan stops before its next window.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Counters collected during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Windows in the partition
    pub windows_total: usize,
    /// Windows fetched and searched (including empty ones)
    pub windows_processed: usize,
    /// Windows whose fetch returned no observations
    pub empty_windows: usize,
    pub observations: usize,
    /// Observations dropped for invalid coordinates
    pub dropped_observations: usize,
    pub buckets: usize,
    /// Buckets with two or more observations, the only ones indexed
    pub indexed_buckets: usize,
    /// Fetch attempts that failed and were retried
    pub fetch_retries: u32,
    pub elapsed_ms: u64,
}

/// Result of a scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub pairs: PairSet,
    pub stats: ScanStats,
    /// True when the scan stopped early on a [`CancelToken`]
    pub cancelled: bool,
}

/// Runs proximity scans with a fixed configuration.
#[derive(Debug, Clone)]
pub struct ProximityScanner {
    config: ProximityConfig,
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    parallel: bool,
}

impl ProximityScanner {
    /// Create a scanner, validating the configuration.
    pub fn new(config: ProximityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            parallel: cfg!(feature = "parallel"),
        })
    }

    /// Enable or disable parallel bucket search. Has no effect without the
    /// `parallel` feature.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel && cfg!(feature = "parallel");
        self
    }

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    /// Scan every window of `source`.
    pub fn run<S: ObservationSource>(&self, source: &S) -> Result<ScanOutcome> {
        self.run_with_cancel(source, &CancelToken::new())
    }

    /// Scan every window of `source`, stopping early if `cancel` fires.
    pub fn run_with_cancel<S: ObservationSource>(
        &self,
        source: &S,
        cancel: &CancelToken,
    ) -> Result<ScanOutcome> {
        let started = Instant::now();
        let range = source.time_range()?;
        let windows = WindowPartitioner::for_range(
            range,
            self.config.window_span(),
            self.config.align_to_midnight,
        )?;

        let mut stats = ScanStats {
            windows_total: windows.len(),
            ..ScanStats::default()
        };
        let mut pairs = PairSet::new();
        let mut cancelled = false;

        match range {
            Some((min, max)) => info!(
                "[Scanner] Scanning {} to {} in {} windows of {} days",
                min, max, stats.windows_total, self.config.window_span_days
            ),
            None => info!("[Scanner] Source holds no trips"),
        }

        for window in windows {
            if cancel.is_cancelled() {
                info!(
                    "[Scanner] Cancelled before window {}/{}, keeping {} pairs",
                    window.index + 1,
                    stats.windows_total,
                    pairs.len()
                );
                cancelled = true;
                break;
            }

            let observations = self.fetch_with_retry(source, &window, &mut stats)?;
            stats.windows_processed += 1;

            if observations.is_empty() {
                stats.empty_windows += 1;
                info!(
                    "[Scanner] No observations in window {}/{} ({} to {})",
                    window.index + 1,
                    stats.windows_total,
                    window.start,
                    window.end
                );
                continue;
            }

            let buckets = bucketize(&observations, self.config.bucket_width());
            stats.observations += observations.len();
            stats.dropped_observations += buckets.dropped;
            stats.buckets += buckets.len();
            stats.indexed_buckets += buckets.pairable_count();

            let before = pairs.len();
            pairs.merge(self.search_buckets(&buckets));

            info!(
                "[Scanner] Window {}/{} done: {} observations, {} buckets, {} new pairs",
                window.index + 1,
                stats.windows_total,
                observations.len(),
                buckets.len(),
                pairs.len() - before
            );
        }

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "[Scanner] Found {} taxi pairs in {}ms",
            pairs.len(),
            stats.elapsed_ms
        );

        Ok(ScanOutcome {
            pairs,
            stats,
            cancelled,
        })
    }

    /// Find the pairs of every pairable bucket in one window.
    pub fn search_buckets(&self, buckets: &Buckets) -> PairSet {
        let pairable: Vec<&[Observation]> = buckets.pairable().map(|(_, obs)| obs).collect();

        #[cfg(feature = "parallel")]
        {
            if self.parallel {
                return self.search_parallel(&pairable);
            }
        }

        let mut pairs = PairSet::new();
        for bucket in pairable {
            find_close_pairs_with(
                self.config.index,
                bucket,
                self.config.threshold_degrees(),
                &mut pairs,
            );
        }
        pairs
    }

    #[cfg(feature = "parallel")]
    fn search_parallel(&self, pairable: &[&[Observation]]) -> PairSet {
        use rayon::prelude::*;

        let threshold = self.config.threshold_degrees();
        let index = self.config.index;

        pairable
            .par_iter()
            .fold(PairSet::new, |mut shard, bucket| {
                find_close_pairs_with(index, bucket, threshold, &mut shard);
                shard
            })
            .reduce(PairSet::new, |mut a, b| {
                a.merge(b);
                a
            })
    }

    fn fetch_with_retry<S: ObservationSource>(
        &self,
        source: &S,
        window: &Window,
        stats: &mut ScanStats,
    ) -> Result<Vec<Observation>> {
        let attempts = self.config.fetch_retries.saturating_add(1);
        let mut backoff = self.config.retry_backoff_ms;
        let mut attempt = 1;

        loop {
            match source.observations(window.start, window.end) {
                Ok(observations) => {
                    debug!(
                        "[Scanner] Fetched {} observations for window {}",
                        observations.len(),
                        window.index + 1
                    );
                    return Ok(observations);
                }
                Err(err) if attempt < attempts => {
                    warn!(
                        "[Scanner] Fetch of window {} failed (attempt {}/{}): {}, retrying in {}ms",
                        window.index + 1,
                        attempt,
                        attempts,
                        err,
                        backoff
                    );
                    stats.fetch_retries += 1;
                    if backoff > 0 {
                        thread::sleep(StdDuration::from_millis(backoff));
                    }
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(ProximityError::WindowFetchFailed {
                        window_index: window.index,
                        start: window.start,
                        end: window.end,
                        attempts,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}
