//! Window partitioning of the global time range.
//!
//! The full observation period is cut into consecutive fixed-length windows so
//! that only one window's observations are held in memory at a time. Windows
//! are half-open, ascending, and tile the range without gaps or overlaps.

use chrono::{Duration, NaiveDateTime};

use crate::error::{ProximityError, Result};

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Zero-based position in the partition
    pub index: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    /// Check if a timestamp falls inside the window.
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start && *ts < self.end
    }
}

/// Lazy iterator of windows covering `[global_min, global_max]`.
///
/// # Example
/// ```
/// use chrono::{Duration, NaiveDate};
/// use porto_proximity::WindowPartitioner;
///
/// let day = |d| NaiveDate::from_ymd_opt(2013, 7, d).unwrap().and_hms_opt(9, 30, 0).unwrap();
/// let windows: Vec<_> = WindowPartitioner::calendar(day(1), day(14), Duration::days(6))
///     .unwrap()
///     .collect();
/// assert_eq!(windows.len(), 3);
/// assert_eq!(windows[0].start.to_string(), "2013-07-01 00:00:00");
/// ```
#[derive(Debug, Clone)]
pub struct WindowPartitioner {
    next_start: Option<NaiveDateTime>,
    next_index: usize,
    global_max: NaiveDateTime,
    span: Duration,
}

impl WindowPartitioner {
    /// Windows starting exactly at `global_min`.
    ///
    /// Produces an empty sequence when `global_min > global_max`.
    pub fn new(global_min: NaiveDateTime, global_max: NaiveDateTime, span: Duration) -> Result<Self> {
        if span <= Duration::zero() {
            return Err(ProximityError::Config {
                message: format!("window span must be positive, got {}", span),
            });
        }
        let next_start = if global_min > global_max {
            None
        } else {
            Some(global_min)
        };
        Ok(Self {
            next_start,
            next_index: 0,
            global_max,
            span,
        })
    }

    /// Windows starting at midnight of `global_min`'s date, so that every
    /// boundary falls on a calendar day.
    pub fn calendar(
        global_min: NaiveDateTime,
        global_max: NaiveDateTime,
        span: Duration,
    ) -> Result<Self> {
        let midnight = global_min
            .date()
            .and_hms_opt(0, 0, 0)
            .unwrap_or(global_min);
        if global_min > global_max {
            // Keep the empty result even if truncation would reorder the bounds
            return Self::new(global_min, global_max, span);
        }
        Self::new(midnight, global_max, span)
    }

    /// Windows covering an optional `(min, max)` range, aligned or not.
    ///
    /// `None` means the source holds no data and yields no windows.
    pub fn for_range(
        range: Option<(NaiveDateTime, NaiveDateTime)>,
        span: Duration,
        align_to_midnight: bool,
    ) -> Result<Self> {
        match range {
            Some((min, max)) if align_to_midnight => Self::calendar(min, max, span),
            Some((min, max)) => Self::new(min, max, span),
            None => {
                let mut empty = Self::new(NaiveDateTime::MIN, NaiveDateTime::MIN, span)?;
                empty.next_start = None;
                Ok(empty)
            }
        }
    }

    fn remaining(&self) -> usize {
        let Some(start) = self.next_start else {
            return 0;
        };
        let elapsed = duration_nanos(self.global_max - start);
        let span = duration_nanos(self.span);
        usize::try_from(elapsed / span + 1).unwrap_or(usize::MAX)
    }
}

impl Iterator for WindowPartitioner {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let start = self.next_start?;
        let end = start.checked_add_signed(self.span);

        self.next_start = end.filter(|next| *next <= self.global_max);
        let window = Window {
            index: self.next_index,
            start,
            end: end.unwrap_or(NaiveDateTime::MAX),
        };
        self.next_index += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for WindowPartitioner {}

fn duration_nanos(d: Duration) -> i128 {
    i128::from(d.num_seconds()) * 1_000_000_000 + i128::from(d.subsec_nanos())
}
