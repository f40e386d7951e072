//! Interval-indexed truth for temporal relations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::TimeInterval;
use crate::truth::TruthValue;

/// A truth value holding over one interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalTruth {
    pub interval: TimeInterval,
    pub truth: TruthValue,
}

/// A map from pairwise non-overlapping intervals to truth values.
///
/// Moments outside every stored interval resolve to `default_truth`.
/// Intervals are kept ordered by start.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use logos_ontology::{TemporalTruth, TimeInterval, TruthState, TruthValue};
///
/// let t0 = Utc::now();
/// let mut truth = TemporalTruth::new(TruthValue::UNKNOWN);
/// truth
///     .add_interval(TimeInterval::between(t0, t0 + Duration::minutes(30)).unwrap(), TruthValue::TRUE)
///     .unwrap();
///
/// assert_eq!(truth.truth_value_at(t0 + Duration::minutes(15)).evaluate(), TruthState::True);
/// assert_eq!(truth.truth_value_at(t0 - Duration::minutes(5)).evaluate(), TruthState::Unknown);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "TemporalFields")]
pub struct TemporalTruth {
    #[serde(default)]
    intervals: Vec<IntervalTruth>,

    /// Truth for moments no interval covers.
    #[serde(default)]
    pub default_truth: TruthValue,
}

#[derive(Deserialize)]
struct TemporalFields {
    #[serde(default)]
    intervals: Vec<IntervalTruth>,
    #[serde(default)]
    default_truth: TruthValue,
}

impl TryFrom<TemporalFields> for TemporalTruth {
    type Error = ValidationError;

    fn try_from(fields: TemporalFields) -> Result<Self, Self::Error> {
        let mut truth = Self::new(fields.default_truth);
        for it in fields.intervals {
            truth.add_interval(it.interval, it.truth)?;
        }
        Ok(truth)
    }
}

impl TemporalTruth {
    #[must_use]
    pub const fn new(default_truth: TruthValue) -> Self {
        Self {
            intervals: Vec::new(),
            default_truth,
        }
    }

    /// Stores `truth` for `interval`.
    ///
    /// # Errors
    ///
    /// - `ValidationError::InvalidInterval` if `interval` ends before it starts
    /// - `ValidationError::IntervalOverlap` if `interval` overlaps a stored
    ///   interval
    ///
    /// Nothing is changed in either case.
    pub fn add_interval(
        &mut self,
        interval: TimeInterval,
        truth: TruthValue,
    ) -> Result<(), ValidationError> {
        interval.validate()?;
        if let Some(existing) = self.intervals.iter().find(|it| it.interval.overlaps(&interval)) {
            return Err(ValidationError::IntervalOverlap {
                new: interval,
                existing: existing.interval,
            });
        }
        let at = self.intervals.partition_point(|it| it.interval < interval);
        self.intervals.insert(at, IntervalTruth { interval, truth });
        Ok(())
    }

    /// Removes an interval, returning the truth it carried.
    pub fn remove_interval(&mut self, interval: &TimeInterval) -> Option<TruthValue> {
        let index = self.intervals.iter().position(|it| &it.interval == interval)?;
        Some(self.intervals.remove(index).truth)
    }

    pub fn clear_intervals(&mut self) {
        self.intervals.clear();
    }

    /// Stored intervals, ordered by start.
    #[must_use]
    pub fn intervals(&self) -> &[IntervalTruth] {
        &self.intervals
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// The stored interval containing `moment`, if any.
    ///
    /// At most one can match since intervals never overlap.
    #[must_use]
    pub fn interval_at(&self, moment: DateTime<Utc>) -> Option<&IntervalTruth> {
        self.intervals.iter().find(|it| it.interval.contains(moment))
    }

    #[must_use]
    pub fn truth_value_at(&self, moment: DateTime<Utc>) -> TruthValue {
        self.interval_at(moment)
            .map_or(self.default_truth, |it| it.truth)
    }

    /// Replaces the truth holding at `moment`: the covering interval's if
    /// there is one, otherwise the default. Returns true if it changed.
    pub fn set_truth_at(&mut self, moment: DateTime<Utc>, truth: TruthValue) -> bool {
        let slot = match self.intervals.iter_mut().find(|it| it.interval.contains(moment)) {
            Some(it) => &mut it.truth,
            None => &mut self.default_truth,
        };
        if *slot == truth {
            return false;
        }
        *slot = truth;
        true
    }

    /// The interval covering the current instant and its truth.
    #[must_use]
    pub fn current_interval(&self) -> Option<IntervalTruth> {
        self.interval_at(Utc::now()).copied()
    }

    /// True if no intervals are stored or one of them contains `moment`.
    #[must_use]
    pub fn is_active_at(&self, moment: DateTime<Utc>) -> bool {
        self.intervals.is_empty() || self.interval_at(moment).is_some()
    }
}
