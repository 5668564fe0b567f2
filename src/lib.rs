//! # Porto Proximity
//!
//! Spatio-temporal proximity search over the Porto taxi-trip GPS dataset.
//!
//! Finds every pair of distinct taxis that were observed within a small
//! distance of each other (5 m by default) inside the same short time bucket
//! (15 s by default), at any point during the observation period.
//!
//! The search runs as a three stage pipeline:
//! - [`window`] slices the global time range into multi-day windows
//! - [`bucket`] groups each window's observations into fixed time buckets
//! - [`pairs`] indexes each bucket with an R-tree and reports close pairs
//!
//! [`scan::ProximityScanner`] drives the stages against any
//! [`source::ObservationSource`] and accumulates a single [`PairSet`].
//!
//! ## Features
//!
//! - **`parallel`** - Process the buckets of a window in parallel with rayon
//! - **`persistence`** - SQLite-backed observation source
//! - **`cli`** - The `porto-proximity` command line runner
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use porto_proximity::{GpsPoint, ProximityConfig, ProximityScanner, Trip};
//! use porto_proximity::source::MemorySource;
//!
//! let start = NaiveDate::from_ymd_opt(2013, 7, 1)
//!     .unwrap()
//!     .and_hms_opt(8, 0, 0)
//!     .unwrap();
//!
//! let source = MemorySource::new(vec![
//!     Trip::new(1, 20000001, start, vec![GpsPoint::new(41.15794, -8.62911)]),
//!     Trip::new(2, 20000002, start, vec![GpsPoint::new(41.15796, -8.62911)]),
//! ]);
//!
//! let scanner = ProximityScanner::new(ProximityConfig::default()).unwrap();
//! let outcome = scanner.run(&source).unwrap();
//! assert_eq!(outcome.pairs.len(), 1);
//! ```

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, ProximityError, Result};

// Window partitioning of the global time range
pub mod window;
pub use window::{Window, WindowPartitioner};

// Time bucketing inside a window
pub mod bucket;
pub use bucket::{bucket_key, bucketize, Buckets};

// Spatial pair finding inside a bucket
pub mod pairs;
pub use pairs::{find_close_pairs, find_close_pairs_brute_force};

// Accumulated result set
pub mod pair_set;
pub use pair_set::PairSet;

// Data-store collaborator
pub mod source;
pub use source::{MemorySource, ObservationSource};

// SQLite observation source
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteStore;

// Pipeline driver
pub mod scan;
pub use scan::{CancelToken, ProximityScanner, ScanOutcome, ScanStats};

// Report output
pub mod report;
pub use report::{write_report, ReportFormat};

// ============================================================================
// Constants
// ============================================================================

/// Approximate length of one degree of latitude, in meters.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Sampling interval of the Porto dataset, in seconds.
pub const SAMPLE_INTERVAL_SECS: i64 = 15;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use porto_proximity::GpsPoint;
/// let point = GpsPoint::new(41.15794, -8.62911); // Porto City Hall
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// One taxi trip with its ordered GPS path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Trip identifier from the source dataset
    pub original_trip_id: i64,
    pub taxi_id: i64,
    /// Time the trip started
    pub start_time: NaiveDateTime,
    /// GPS fixes in path order, one per sampling interval
    pub points: Vec<GpsPoint>,
}

impl Trip {
    pub fn new(
        original_trip_id: i64,
        taxi_id: i64,
        start_time: NaiveDateTime,
        points: Vec<GpsPoint>,
    ) -> Self {
        Self {
            original_trip_id,
            taxi_id,
            start_time,
            points,
        }
    }
}

/// A single GPS fix attributed to a taxi at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub taxi_id: i64,
    pub timestamp: NaiveDateTime,
    pub longitude: f64,
    pub latitude: f64,
}

impl Observation {
    pub fn new(taxi_id: i64, timestamp: NaiveDateTime, longitude: f64, latitude: f64) -> Self {
        Self {
            taxi_id,
            timestamp,
            longitude,
            latitude,
        }
    }

    /// Check if the coordinates can take part in a distance comparison.
    pub fn has_valid_coordinates(&self) -> bool {
        self.longitude.is_finite() && self.latitude.is_finite()
    }
}

/// An unordered pair of two distinct taxis, stored as `(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxiPair {
    first: i64,
    second: i64,
}

impl TaxiPair {
    /// Normalize two taxi ids into a pair.
    ///
    /// Returns `None` when both ids are the same taxi.
    ///
    /// # Example
    /// ```
    /// use porto_proximity::TaxiPair;
    /// let pair = TaxiPair::new(7, 3).unwrap();
    /// assert_eq!((pair.first(), pair.second()), (3, 7));
    /// assert!(TaxiPair::new(5, 5).is_none());
    /// ```
    pub fn new(a: i64, b: i64) -> Option<Self> {
        if a == b {
            return None;
        }
        Some(Self {
            first: a.min(b),
            second: a.max(b),
        })
    }

    /// The smaller taxi id.
    pub fn first(&self) -> i64 {
        self.first
    }

    /// The larger taxi id.
    pub fn second(&self) -> i64 {
        self.second
    }
}

/// How the timestamp of each GPS fix is derived from its trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationTime {
    /// Every fix carries its trip's start time
    #[default]
    TripStart,
    /// Trip start plus `idx * 15s`, the dataset's sampling interval
    Sampled,
}

/// Which spatial search the pair finder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpatialIndexKind {
    /// R-tree over the bucket's coordinates
    #[default]
    Rtree,
    /// Compare every pair of observations
    BruteForce,
}

/// Configuration for a proximity scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Length of each window in days.
    /// Default: 6
    pub window_span_days: u32,

    /// Width of each time bucket in seconds.
    /// Default: 15
    pub bucket_width_secs: u32,

    /// Maximum distance between two taxis to count as a pair (meters).
    /// Converted to degrees with [`METERS_PER_DEGREE`]. Default: 5.0
    pub threshold_meters: f64,

    /// Start windows at midnight of the first trip's date.
    /// Default: true
    pub align_to_midnight: bool,

    /// Timestamp used for each fix.
    /// Default: trip start time
    pub observation_time: ObservationTime,

    /// Spatial search used per bucket.
    /// Default: R-tree
    pub index: SpatialIndexKind,

    /// Extra attempts for a failed window fetch.
    /// Default: 2
    pub fetch_retries: u32,

    /// Delay before the first retry, doubled on each further retry (ms).
    /// Default: 250
    pub retry_backoff_ms: u64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            window_span_days: 6,
            bucket_width_secs: 15,
            threshold_meters: 5.0,
            align_to_midnight: true,
            observation_time: ObservationTime::TripStart,
            index: SpatialIndexKind::Rtree,
            fetch_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

impl ProximityConfig {
    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ProximityError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a scan.
    pub fn validate(&self) -> Result<()> {
        if self.window_span_days == 0 {
            return Err(ProximityError::Config {
                message: "window_span_days must be at least 1".to_string(),
            });
        }
        if self.bucket_width_secs == 0 {
            return Err(ProximityError::Config {
                message: "bucket_width_secs must be at least 1".to_string(),
            });
        }
        if !self.threshold_meters.is_finite() || self.threshold_meters < 0.0 {
            return Err(ProximityError::Config {
                message: format!(
                    "threshold_meters must be a non-negative number, got {}",
                    self.threshold_meters
                ),
            });
        }
        Ok(())
    }

    /// Distance threshold in coordinate units (degrees).
    pub fn threshold_degrees(&self) -> f64 {
        self.threshold_meters / METERS_PER_DEGREE
    }

    pub fn bucket_width(&self) -> Duration {
        Duration::seconds(i64::from(self.bucket_width_secs))
    }

    pub fn window_span(&self) -> Duration {
        Duration::days(i64::from(self.window_span_days))
    }
}

// ============================================================================
// Tests
// ============================================================================
