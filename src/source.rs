//! The data-store collaborator the scanner reads observations from.

use chrono::{Duration, NaiveDateTime};

use crate::{Observation, ObservationTime, Result, Trip, SAMPLE_INTERVAL_SECS};

/// Read access to trip/point data.
///
/// Implementations filter out fixes with missing or non-finite coordinates
/// so they never reach the pair finder.
pub trait ObservationSource {
    /// `(MIN(start_time), MAX(start_time))` over all trips, or `None` when the
    /// store holds no trips.
    fn time_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>>;

    /// Every GPS fix of every trip that started in `[start, end)`.
    fn observations(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<Observation>>;
}

impl<S: ObservationSource + ?Sized> ObservationSource for &S {
    fn time_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        (**self).time_range()
    }

    fn observations(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<Observation>> {
        (**self).observations(start, end)
    }
}

/// Timestamp of the fix at path position `idx` of a trip.
pub fn observation_timestamp(
    mode: ObservationTime,
    trip_start: NaiveDateTime,
    idx: usize,
) -> NaiveDateTime {
    match mode {
        ObservationTime::TripStart => trip_start,
        ObservationTime::Sampled => {
            let offset = Duration::seconds(SAMPLE_INTERVAL_SECS.saturating_mul(idx as i64));
            trip_start.checked_add_signed(offset).unwrap_or(NaiveDateTime::MAX)
        }
    }
}

/// In-memory source over a list of trips.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    trips: Vec<Trip>,
    observation_time: ObservationTime,
}

impl MemorySource {
    pub fn new(trips: Vec<Trip>) -> Self {
        Self {
            trips,
            observation_time: ObservationTime::default(),
        }
    }

    /// Use `mode` to timestamp each fix.
    pub fn with_observation_time(mut self, mode: ObservationTime) -> Self {
        self.observation_time = mode;
        self
    }

    pub fn push(&mut self, trip: Trip) {
        self.trips.push(trip);
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }
}

impl ObservationSource for MemorySource {
    fn time_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        let min = self.trips.iter().map(|t| t.start_time).min();
        let max = self.trips.iter().map(|t| t.start_time).max();
        Ok(min.zip(max))
    }

    fn observations(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<Observation>> {
        let observations = self
            .trips
            .iter()
            .filter(|t| t.start_time >= start && t.start_time < end)
            .flat_map(|t| {
                t.points
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.is_finite())
                    .map(move |(idx, p)| {
                        Observation::new(
                            t.taxi_id,
                            observation_timestamp(self.observation_time, t.start_time, idx),
                            p.longitude,
                            p.latitude,
                        )
                    })
            })
            .collect();
        Ok(observations)
    }
}
