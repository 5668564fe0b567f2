//! # Spatial Pair Finder
//!
//! Finds every pair of observations in one time bucket whose planar distance
//! is at most a threshold, and records the cross-taxi ones.
//!
//! ## Distance model
//! Longitude and latitude are treated as plain planar coordinates. At the
//! scale of a few meters the distortion is negligible, so the metric
//! threshold is converted to degrees once with a fixed factor
//! ([`crate::METERS_PER_DEGREE`]) instead of projecting every point.
//!
//! The threshold is inclusive: a pair exactly `threshold` apart is reported.

mod rtree;

use log::debug;

use crate::{Observation, PairSet, SpatialIndexKind};

pub(crate) use rtree::build_rtree;
pub use rtree::IndexedPoint;

/// All index pairs `(i, j)` with `i < j` whose planar distance is within
/// `threshold`, found through an R-tree.
///
/// The result is sorted, so it only depends on the bucket's contents.
pub fn close_index_pairs(observations: &[Observation], threshold: f64) -> Vec<(usize, usize)> {
    if observations.len() < 2 || threshold.is_nan() || threshold < 0.0 {
        return vec![];
    }

    let tree = build_rtree(observations);
    let max_dist_2 = threshold * threshold;
    let mut result = Vec::new();

    for (i, obs) in observations.iter().enumerate() {
        let query = [obs.longitude, obs.latitude];
        for neighbor in tree.locate_within_distance(query, max_dist_2) {
            if neighbor.idx > i {
                result.push((i, neighbor.idx));
            }
        }
    }

    result.sort_unstable();
    result
}

/// Same contract as [`close_index_pairs`], comparing every pair directly.
pub fn close_index_pairs_brute_force(
    observations: &[Observation],
    threshold: f64,
) -> Vec<(usize, usize)> {
    if observations.len() < 2 || threshold.is_nan() || threshold < 0.0 {
        return vec![];
    }

    let max_dist_2 = threshold * threshold;
    let mut result = Vec::new();

    for (i, a) in observations.iter().enumerate() {
        for (j, b) in observations.iter().enumerate().skip(i + 1) {
            let dlng = a.longitude - b.longitude;
            let dlat = a.latitude - b.latitude;
            if dlng * dlng + dlat * dlat <= max_dist_2 {
                result.push((i, j));
            }
        }
    }

    result
}

/// Record every cross-taxi pair within `threshold` in `pairs`, using an
/// R-tree over the bucket.
///
/// Buckets with fewer than two observations are skipped without building
/// an index.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use porto_proximity::{find_close_pairs, Observation, PairSet, TaxiPair};
///
/// let ts = NaiveDate::from_ymd_opt(2013, 7, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let bucket = [
///     Observation::new(1, ts, 0.0, 0.0),
///     Observation::new(2, ts, 0.0, 0.00003),
///     Observation::new(3, ts, 10.0, 10.0),
/// ];
///
/// let mut pairs = PairSet::new();
/// find_close_pairs(&bucket, 5.0 / 111_000.0, &mut pairs);
/// assert_eq!(pairs.sorted(), vec![TaxiPair::new(1, 2).unwrap()]);
/// ```
pub fn find_close_pairs(observations: &[Observation], threshold: f64, pairs: &mut PairSet) {
    let close = close_index_pairs(observations, threshold);
    record_cross_taxi(observations, &close, pairs);
}

/// Brute-force counterpart of [`find_close_pairs`].
pub fn find_close_pairs_brute_force(
    observations: &[Observation],
    threshold: f64,
    pairs: &mut PairSet,
) {
    let close = close_index_pairs_brute_force(observations, threshold);
    record_cross_taxi(observations, &close, pairs);
}

/// Dispatch to the finder selected by `kind`.
pub fn find_close_pairs_with(
    kind: SpatialIndexKind,
    observations: &[Observation],
    threshold: f64,
    pairs: &mut PairSet,
) {
    match kind {
        SpatialIndexKind::Rtree => find_close_pairs(observations, threshold, pairs),
        SpatialIndexKind::BruteForce => {
            find_close_pairs_brute_force(observations, threshold, pairs)
        }
    }
}

fn record_cross_taxi(observations: &[Observation], close: &[(usize, usize)], pairs: &mut PairSet) {
    let mut added = 0usize;
    for &(i, j) in close {
        if pairs.insert_taxis(observations[i].taxi_id, observations[j].taxi_id) {
            added += 1;
        }
    }
    if added > 0 {
        debug!(
            "[PairFinder] {} close points in bucket of {}, {} new pairs",
            close.len(),
            observations.len(),
            added
        );
    }
}
