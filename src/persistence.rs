//! # SQLite Observation Store
//!
//! Trip/point/path storage in SQLite, mirroring the relational layout of the
//! Porto dataset:
//!
//! - `trip`: one row per trip with its taxi and start time
//! - `point`: distinct coordinates, shared across trips
//! - `path`: ordered `(trip, idx) -> point` links
//!
//! Start times are stored as Unix seconds. Range queries are parameterized;
//! no SQL is built by formatting dates.

use chrono::{DateTime, NaiveDateTime};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};

use crate::error::{OptionExt, Result};
use crate::source::ObservationSource;
use crate::{Observation, ObservationTime, Trip, SAMPLE_INTERVAL_SECS};

/// SQLite-backed [`ObservationSource`].
pub struct SqliteStore {
    db: Connection,
    observation_time: ObservationTime,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: &str) -> SqlResult<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        info!("[SqliteStore] Opened {}", db_path);

        Ok(Self {
            db,
            observation_time: ObservationTime::default(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqlResult<Self> {
        Self::new(":memory:")
    }

    /// Use `mode` to timestamp each fix returned by range queries.
    pub fn set_observation_time(&mut self, mode: ObservationTime) {
        self.observation_time = mode;
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS trip (
                trip_id INTEGER PRIMARY KEY AUTOINCREMENT,
                original_trip_id INTEGER NOT NULL,
                taxi_id INTEGER NOT NULL,
                start_time INTEGER NOT NULL
            );

            -- Coordinates may be NULL for fixes that were missing in the source
            CREATE TABLE IF NOT EXISTS point (
                point_id INTEGER PRIMARY KEY AUTOINCREMENT,
                latitude REAL,
                longitude REAL,
                UNIQUE (latitude, longitude)
            );

            CREATE TABLE IF NOT EXISTS path (
                trip_id INTEGER NOT NULL,
                point_id INTEGER NOT NULL,
                idx INTEGER NOT NULL,
                PRIMARY KEY (trip_id, idx),
                FOREIGN KEY (trip_id) REFERENCES trip(trip_id) ON DELETE CASCADE,
                FOREIGN KEY (point_id) REFERENCES point(point_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_trip_start_time ON trip(start_time);

            PRAGMA foreign_keys = ON;
        "#,
        )?;
        Ok(())
    }

    /// Store a trip and its path. Returns the new trip's row id.
    pub fn add_trip(&mut self, trip: &Trip) -> Result<i64> {
        let tx = self.db.transaction()?;

        tx.execute(
            "INSERT INTO trip (original_trip_id, taxi_id, start_time) VALUES (?, ?, ?)",
            params![
                trip.original_trip_id,
                trip.taxi_id,
                trip.start_time.and_utc().timestamp()
            ],
        )?;
        let trip_id = tx.last_insert_rowid();

        {
            let mut insert_point =
                tx.prepare("INSERT OR IGNORE INTO point (latitude, longitude) VALUES (?, ?)")?;
            let mut insert_missing =
                tx.prepare("INSERT INTO point (latitude, longitude) VALUES (NULL, NULL)")?;
            let mut find_point =
                tx.prepare("SELECT point_id FROM point WHERE latitude = ? AND longitude = ?")?;
            let mut insert_path =
                tx.prepare("INSERT INTO path (trip_id, point_id, idx) VALUES (?, ?, ?)")?;

            for (idx, point) in trip.points.iter().enumerate() {
                let point_id: i64 = if point.is_finite() {
                    insert_point.execute(params![point.latitude, point.longitude])?;
                    find_point.query_row(params![point.latitude, point.longitude], |row| {
                        row.get(0)
                    })?
                } else {
                    insert_missing.execute([])?;
                    tx.last_insert_rowid()
                };
                insert_path.execute(params![trip_id, point_id, idx as i64])?;
            }
        }

        tx.commit()?;
        debug!(
            "[SqliteStore] Added trip {} (taxi {}, {} points)",
            trip.original_trip_id,
            trip.taxi_id,
            trip.points.len()
        );
        Ok(trip_id)
    }

    /// Store many trips.
    pub fn add_trips(&mut self, trips: &[Trip]) -> Result<()> {
        for trip in trips {
            self.add_trip(trip)?;
        }
        Ok(())
    }

    pub fn trip_count(&self) -> Result<u64> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM trip", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete all trips, points and paths.
    pub fn clear(&mut self) -> Result<()> {
        self.db.execute_batch(
            r#"
            DELETE FROM path;
            DELETE FROM point;
            DELETE FROM trip;
        "#,
        )?;
        info!("[SqliteStore] Cleared all trips");
        Ok(())
    }
}

fn from_unix_seconds(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

impl ObservationSource for SqliteStore {
    fn time_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        let bounds: Option<(Option<i64>, Option<i64>)> = self
            .db
            .query_row("SELECT MIN(start_time), MAX(start_time) FROM trip", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;

        match bounds {
            Some((Some(min), Some(max))) => {
                let min = from_unix_seconds(min).ok_or_invalid_timestamp("MIN(start_time)")?;
                let max = from_unix_seconds(max).ok_or_invalid_timestamp("MAX(start_time)")?;
                Ok(Some((min, max)))
            }
            _ => Ok(None),
        }
    }

    fn observations(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<Observation>> {
        let step = match self.observation_time {
            ObservationTime::TripStart => 0,
            ObservationTime::Sampled => SAMPLE_INTERVAL_SECS,
        };

        let mut stmt = self.db.prepare_cached(
            "SELECT t.taxi_id, t.start_time + p.idx * ?3, pt.longitude, pt.latitude
             FROM trip t
             JOIN path p ON p.trip_id = t.trip_id
             JOIN point pt ON pt.point_id = p.point_id
             WHERE t.start_time >= ?1
               AND t.start_time < ?2
               AND pt.longitude IS NOT NULL
               AND pt.latitude IS NOT NULL",
        )?;

        let rows = stmt.query_map(
            params![start.and_utc().timestamp(), end.and_utc().timestamp(), step],
            |row| {
                let secs: i64 = row.get(1)?;
                let timestamp = from_unix_seconds(secs)
                    .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, secs))?;
                Ok(Observation::new(row.get(0)?, timestamp, row.get(2)?, row.get(3)?))
            },
        )?;

        let mut observations = Vec::new();
        for row in rows {
            let obs = row?;
            if obs.has_valid_coordinates() {
                observations.push(obs);
            }
        }
        Ok(observations)
    }
}

// ============================================================================
// Tests
// ============================================================================
