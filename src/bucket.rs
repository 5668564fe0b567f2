//! Time bucketing of a window's observations.
//!
//! Observations are grouped by `floor(timestamp / bucket_width)`. Only
//! observations sharing a bucket are ever compared, so two fixes a few
//! seconds apart that straddle a bucket boundary never form a pair.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use log::debug;

use crate::Observation;

/// Observations of one window grouped by bucket key.
#[derive(Debug, Clone, Default)]
pub struct Buckets {
    buckets: BTreeMap<i64, Vec<Observation>>,
    /// Observations dropped for non-finite coordinates
    pub dropped: usize,
}

impl Buckets {
    /// Number of distinct buckets, including singletons.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Observations in the bucket with the given key.
    pub fn get(&self, key: i64) -> Option<&[Observation]> {
        self.buckets.get(&key).map(Vec::as_slice)
    }

    /// All buckets in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[Observation])> {
        self.buckets.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Buckets holding at least two observations, the only ones that can
    /// produce a pair.
    pub fn pairable(&self) -> impl Iterator<Item = (i64, &[Observation])> {
        self.iter().filter(|(_, obs)| obs.len() >= 2)
    }

    /// Number of buckets [`Buckets::pairable`] yields.
    pub fn pairable_count(&self) -> usize {
        self.buckets.values().filter(|obs| obs.len() >= 2).count()
    }
}

/// Bucket key of a timestamp for the given width.
///
/// Uses floor division on nanoseconds since the Unix epoch, so timestamps
/// before 1970 land in negative buckets rather than sharing bucket 0.
///
/// # Example
/// ```
/// use chrono::{Duration, NaiveDate};
/// use porto_proximity::bucket_key;
///
/// let ts = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 29).unwrap();
/// assert_eq!(bucket_key(&ts, Duration::seconds(15)), 1);
/// ```
pub fn bucket_key(ts: &NaiveDateTime, width: Duration) -> i64 {
    let utc = ts.and_utc();
    let nanos = i128::from(utc.timestamp()) * 1_000_000_000 + i128::from(utc.timestamp_subsec_nanos());
    let width_nanos =
        (i128::from(width.num_seconds()) * 1_000_000_000 + i128::from(width.subsec_nanos())).max(1);
    // Only sub-millisecond widths can overflow i64 here
    let key = nanos.div_euclid(width_nanos);
    i64::try_from(key).unwrap_or(if key < 0 { i64::MIN } else { i64::MAX })
}

/// Group observations into buckets of `width`.
///
/// Input order does not matter. Observations with non-finite coordinates
/// are dropped and counted in [`Buckets::dropped`].
pub fn bucketize<'a, I>(observations: I, width: Duration) -> Buckets
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut result = Buckets::default();

    for obs in observations {
        if !obs.has_valid_coordinates() {
            result.dropped += 1;
            continue;
        }
        result
            .buckets
            .entry(bucket_key(&obs.timestamp, width))
            .or_default()
            .push(*obs);
    }

    if result.dropped > 0 {
        debug!(
            "[Bucketizer] Dropped {} observations with invalid coordinates",
            result.dropped
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2013, 7, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn width() -> Duration {
        Duration::seconds(15)
    }

    #[test]
    fn test_same_bucket_within_width() {
        assert_eq!(bucket_key(&at(8, 0, 0), width()), bucket_key(&at(8, 0, 14), width()));
        assert_ne!(bucket_key(&at(8, 0, 14), width()), bucket_key(&at(8, 0, 15), width()));
    }

    #[test]
    fn test_boundary_straddle_splits_buckets() {
        // Two seconds apart but on either side of a boundary
        let buckets = bucketize(
            &[
                Observation::new(1, at(8, 0, 14), -8.6, 41.1),
                Observation::new(2, at(8, 0, 16), -8.6, 41.1),
            ],
            width(),
        );
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets.pairable_count(), 0);
    }

    #[test]
    fn test_pre_epoch_floor() {
        let before = NaiveDate::from_ymd_opt(1969, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(bucket_key(&before, width()), -1);
    }

    #[test]
    fn test_singletons_not_pairable() {
        let obs = vec![
            Observation::new(1, at(8, 0, 0), -8.6, 41.1),
            Observation::new(2, at(8, 0, 5), -8.6, 41.1),
            Observation::new(3, at(9, 0, 0), -8.6, 41.1),
        ];
        let buckets = bucketize(&obs, width());
        assert_eq!(buckets.len(), 2);
        let pairable: Vec<_> = buckets.pairable().collect();
        assert_eq!(pairable.len(), 1);
        assert_eq!(pairable[0].1.len(), 2);
    }

    #[test]
    fn test_invalid_coordinates_dropped() {
        let obs = vec![
            Observation::new(1, at(8, 0, 0), f64::NAN, 41.1),
            Observation::new(2, at(8, 0, 0), -8.6, 41.1),
        ];
        let buckets = bucketize(&obs, width());
        assert_eq!(buckets.dropped, 1);
        assert_eq!(buckets.pairable_count(), 0);
    }

    #[test]
    fn test_input_order_irrelevant() {
        let mut obs = vec![
            Observation::new(1, at(8, 0, 0), -8.6, 41.1),
            Observation::new(2, at(8, 0, 31), -8.6, 41.1),
            Observation::new(3, at(8, 0, 7), -8.6, 41.1),
        ];
        let forward = bucketize(&obs, width());
        obs.reverse();
        let backward = bucketize(&obs, width());

        let keys = |b: &Buckets| b.iter().map(|(k, o)| (k, o.len())).collect::<Vec<_>>();
        assert_eq!(keys(&forward), keys(&backward));
    }
}
