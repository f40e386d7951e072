//! Time intervals for temporal relations.
//!
//! An interval is half-open, `[start, end)`, and either bound may be absent,
//! meaning unbounded in that direction.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A half-open, optionally unbounded range of time.
///
/// Intervals order by start, with an unbounded start sorting first; ties are
/// broken by end, with an unbounded end sorting last.
///
/// # Examples
///
/// ```
/// use logos_ontology::TimeInterval;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let meeting = TimeInterval::new(Some(now), Some(now + Duration::minutes(30))).unwrap();
/// assert!(meeting.contains(now));
/// assert!(!meeting.contains(now + Duration::minutes(30)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IntervalBounds")]
pub struct TimeInterval {
    /// Start of the interval (inclusive). None means unbounded in the past.
    pub start: Option<DateTime<Utc>>,

    /// End of the interval (exclusive). None means unbounded in the future.
    pub end: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct IntervalBounds {
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
}

impl TryFrom<IntervalBounds> for TimeInterval {
    type Error = ValidationError;

    fn try_from(bounds: IntervalBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.start, bounds.end)
    }
}

impl TimeInterval {
    /// Creates an interval.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if both bounds are present
    /// and `start >= end`.
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Err(ValidationError::InvalidInterval { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Creates a bounded interval `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if `start >= end`.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        Self::new(Some(start), Some(end))
    }

    /// Creates an interval starting at `start` and never ending.
    #[must_use]
    pub const fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Creates an interval that has always held and stops at `end`.
    #[must_use]
    pub const fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// Creates an interval starting at `start` and lasting `duration`.
    ///
    /// # Errors
    ///
    /// - `ValidationError::InvalidInterval` if `duration` is not positive
    /// - `ValidationError::DurationOutOfRange` if the end is past the
    ///   representable range
    pub fn starting_for(start: DateTime<Utc>, duration: Duration) -> Result<Self, ValidationError> {
        let end = start
            .checked_add_signed(duration)
            .ok_or_else(|| ValidationError::DurationOutOfRange {
                reason: format!("{start} + {duration} overflows"),
            })?;
        Self::between(start, end)
    }

    /// Checks `start < end` for an interval built from its public fields.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if both bounds are present
    /// and out of order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::new(self.start, self.end).map(|_| ())
    }

    /// The interval covering all of time.
    #[must_use]
    pub const fn always() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub const fn is_unbounded(&self) -> bool {
        self.start.is_none() || self.end.is_none()
    }

    /// Check if a moment falls within `[start, end)`.
    #[must_use]
    pub fn contains(&self, moment: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| moment >= start) && self.end.map_or(true, |end| moment < end)
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        let self_start = self.start.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let self_end = self.end.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let other_start = other.start.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let other_end = other.end.unwrap_or(DateTime::<Utc>::MAX_UTC);
        self_start < other_end && other_start < self_end
    }

    /// Returns the intersection of two intervals, if any.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }

        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, None) => a,
            (None, b) => b,
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        };

        Some(Self { start, end })
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Moves the bounds that are given, keeping the other one.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if the result would not
    /// satisfy `start < end`; the interval is left untouched.
    pub fn modify(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(), ValidationError> {
        let updated = Self::new(start.or(self.start), end.or(self.end))?;
        *self = updated;
        Ok(())
    }
}

impl PartialOrd for TimeInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        // `Option` already orders None first, which is what an unbounded start needs.
        self.start.cmp(&other.start).then_with(|| match (self.end, other.end) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(start) => write!(f, "[{start} → ")?,
            None => write!(f, "(-∞ → ")?,
        }
        match self.end {
            Some(end) => write!(f, "{end})"),
            None => write!(f, "∞)"),
        }
    }
}
