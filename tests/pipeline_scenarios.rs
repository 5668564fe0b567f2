//! End-to-end scenarios for the proximity pipeline.
//!
//! Covers the full path from a trip store through windowing, bucketing and
//! pair finding to the written report, plus randomized cross-checks of the
//! R-tree finder against brute force.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use porto_proximity::pairs::{close_index_pairs, close_index_pairs_brute_force};
use porto_proximity::{
    bucketize, write_report, GpsPoint, MemorySource, Observation, PairSet, ProximityConfig,
    ProximityScanner, ReportFormat, TaxiPair, Trip,
};

const THRESHOLD: f64 = 5.0 / 111_000.0;

fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2013, 7, day)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

fn config() -> ProximityConfig {
    ProximityConfig {
        retry_backoff_ms: 0,
        ..ProximityConfig::default()
    }
}

/// A month of trips for `taxis` taxis clustered around Porto City Hall,
/// started on a coarse time grid so that buckets collect several taxis.
fn synthetic_month(seed: u64, taxis: i64, trips_per_taxi: usize) -> Vec<Trip> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut trips = Vec::new();
    let mut trip_id = 1;

    for taxi in 0..taxis {
        for _ in 0..trips_per_taxi {
            let day = rng.random_range(1..=30);
            let minute = rng.random_range(0..4) * 15;
            let start = at(day, 8, minute, 0);
            let points = (0..rng.random_range(1..6))
                .map(|_| {
                    GpsPoint::new(
                        41.15794 + rng.random_range(-0.0003..0.0003),
                        -8.62911 + rng.random_range(-0.0003..0.0003),
                    )
                })
                .collect();
            trips.push(Trip::new(trip_id, 20000000 + taxi, start, points));
            trip_id += 1;
        }
    }
    trips
}

fn brute_force_reference(trips: &[Trip], config: &ProximityConfig) -> PairSet {
    let observations: Vec<Observation> = trips
        .iter()
        .flat_map(|t| {
            t.points
                .iter()
                .map(move |p| Observation::new(t.taxi_id, t.start_time, p.longitude, p.latitude))
        })
        .collect();

    let buckets = bucketize(&observations, config.bucket_width());
    let mut pairs = PairSet::new();
    for (_, bucket) in buckets.pairable() {
        for (i, j) in close_index_pairs_brute_force(bucket, config.threshold_degrees()) {
            pairs.insert_taxis(bucket[i].taxi_id, bucket[j].taxi_id);
        }
    }
    pairs
}

#[test]
fn test_rtree_matches_brute_force_on_random_buckets() {
    let mut rng = StdRng::seed_from_u64(7);
    let ts = at(1, 8, 0, 0);

    for _ in 0..50 {
        let n = rng.random_range(2..120);
        let bucket: Vec<Observation> = (0..n)
            .map(|_| {
                Observation::new(
                    rng.random_range(0..10),
                    ts,
                    -8.62911 + rng.random_range(-0.0002..0.0002),
                    41.15794 + rng.random_range(-0.0002..0.0002),
                )
            })
            .collect();

        assert_eq!(
            close_index_pairs(&bucket, THRESHOLD),
            close_index_pairs_brute_force(&bucket, THRESHOLD)
        );
    }
}

#[test]
fn test_full_scan_matches_reference() {
    let trips = synthetic_month(11, 25, 30);
    let reference = brute_force_reference(&trips, &config());
    assert!(!reference.is_empty());

    let outcome = ProximityScanner::new(config())
        .unwrap()
        .run(&MemorySource::new(trips))
        .unwrap();
    assert_eq!(outcome.pairs, reference);
    assert_eq!(outcome.stats.windows_processed, outcome.stats.windows_total);
}

#[test]
fn test_determinism_under_shuffles_and_repeats() {
    let trips = synthetic_month(3, 15, 20);
    let scanner = ProximityScanner::new(config()).unwrap();
    let baseline = scanner.run(&MemorySource::new(trips.clone())).unwrap().pairs;

    let mut rng = StdRng::seed_from_u64(99);
    for round in 0..5 {
        let mut shuffled = trips.clone();
        shuffled.shuffle(&mut rng);
        let parallel = round % 2 == 0;
        let again = scanner
            .clone()
            .with_parallel(parallel)
            .run(&MemorySource::new(shuffled))
            .unwrap()
            .pairs;
        assert_eq!(again, baseline, "round {round} diverged");
    }
}

#[test]
fn test_pairs_are_normalized_and_distinct() {
    let trips = synthetic_month(5, 20, 25);
    let outcome = ProximityScanner::new(config())
        .unwrap()
        .run(&MemorySource::new(trips))
        .unwrap();

    for pair in outcome.pairs.iter() {
        assert!(pair.first() < pair.second());
        let flipped = TaxiPair::new(pair.second(), pair.first()).unwrap();
        assert_eq!(&flipped, pair);
    }
}

#[test]
fn test_straddling_bucket_boundary_is_missed() {
    // 2 seconds apart, same place, on either side of a 15s boundary
    let trips = vec![
        Trip::new(1, 1, at(2, 8, 0, 14), vec![GpsPoint::new(41.15794, -8.62911)]),
        Trip::new(2, 2, at(2, 8, 0, 16), vec![GpsPoint::new(41.15794, -8.62911)]),
    ];
    let outcome = ProximityScanner::new(config())
        .unwrap()
        .run(&MemorySource::new(trips))
        .unwrap();
    assert!(outcome.pairs.is_empty());
}

#[test]
fn test_gap_between_trips_gives_empty_windows() {
    let trips = vec![
        Trip::new(1, 1, at(1, 8, 0, 0), vec![GpsPoint::new(41.15794, -8.62911)]),
        Trip::new(2, 2, at(1, 8, 0, 0), vec![GpsPoint::new(41.15795, -8.62911)]),
        Trip::new(3, 3, at(31, 8, 0, 0), vec![GpsPoint::new(41.15794, -8.62911)]),
    ];
    let outcome = ProximityScanner::new(config())
        .unwrap()
        .run(&MemorySource::new(trips))
        .unwrap();
    assert_eq!(outcome.pairs.sorted(), vec![TaxiPair::new(1, 2).unwrap()]);
    assert_eq!(outcome.stats.windows_total, 6);
    assert_eq!(outcome.stats.empty_windows, 4);
}

#[test]
fn test_report_written_from_scan() {
    let trips = vec![
        Trip::new(1, 20000010, at(1, 8, 0, 0), vec![GpsPoint::new(41.15794, -8.62911)]),
        Trip::new(2, 20000589, at(1, 8, 0, 0), vec![GpsPoint::new(41.15794, -8.62912)]),
    ];
    let outcome = ProximityScanner::new(config())
        .unwrap()
        .run(&MemorySource::new(trips))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results").join("task8Output.csv");
    write_report(&path, &outcome.pairs, ReportFormat::Csv).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, "TaxiA,TaxiB\n20000010,20000589\n");
}

#[cfg(feature = "persistence")]
mod sqlite {
    use super::*;
    use porto_proximity::{ObservationTime, SqliteStore};

    #[test]
    fn test_sqlite_store_matches_memory_source() {
        let trips = synthetic_month(21, 12, 15);
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("porto.db");

        let mut store = SqliteStore::new(db_path.to_str().unwrap()).unwrap();
        store.add_trips(&trips).unwrap();

        let scanner = ProximityScanner::new(config()).unwrap();
        let from_db = scanner.run(&store).unwrap();
        let from_memory = scanner.run(&MemorySource::new(trips)).unwrap();

        assert_eq!(from_db.pairs, from_memory.pairs);
        assert_eq!(from_db.stats.observations, from_memory.stats.observations);
    }

    #[test]
    fn test_sampled_time_separates_later_fixes() {
        // Both trips start together; the second fixes are 15s later and
        // only meet when every fix carries the trip start time.
        let start = at(4, 10, 0, 0);
        let trips = vec![
            Trip::new(
                1,
                1,
                start,
                vec![GpsPoint::new(41.100, -8.600), GpsPoint::new(41.15794, -8.62911)],
            ),
            Trip::new(
                2,
                2,
                start - Duration::seconds(15),
                vec![GpsPoint::new(41.15794, -8.62911), GpsPoint::new(41.200, -8.700)],
            ),
        ];

        let mut store = SqliteStore::in_memory().unwrap();
        store.add_trips(&trips).unwrap();
        let scanner = ProximityScanner::new(config()).unwrap();

        // Trip starts fall in different buckets
        assert!(scanner.run(&store).unwrap().pairs.is_empty());

        // Trip 1 idx 1 at 10:00:15 vs trip 2 idx 0 at 09:59:45: still apart
        store.set_observation_time(ObservationTime::Sampled);
        assert!(scanner.run(&store).unwrap().pairs.is_empty());
    }

    #[test]
    fn test_sampled_time_can_join_fixes() {
        let start = at(4, 10, 0, 0);
        let trips = vec![
            // idx 1 is sampled at 10:00:15
            Trip::new(
                1,
                1,
                start,
                vec![GpsPoint::new(41.100, -8.600), GpsPoint::new(41.15794, -8.62911)],
            ),
            // idx 0 starts at 10:00:15
            Trip::new(
                2,
                2,
                start + Duration::seconds(15),
                vec![GpsPoint::new(41.15794, -8.62911)],
            ),
        ];

        let mut store = SqliteStore::in_memory().unwrap();
        store.add_trips(&trips).unwrap();
        let scanner = ProximityScanner::new(config()).unwrap();

        assert!(scanner.run(&store).unwrap().pairs.is_empty());

        store.set_observation_time(ObservationTime::Sampled);
        assert_eq!(
            scanner.run(&store).unwrap().pairs.sorted(),
            vec![TaxiPair::new(1, 2).unwrap()]
        );
    }
}
