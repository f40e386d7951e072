//! Multi-valued truth.
//!
//! The logic has four states: TRUE, FALSE, UNKNOWN and SUPERPOSITION. A
//! SUPERPOSITION is an unresolved probabilistic fact and always carries the
//! probability that it would collapse to TRUE.
//!
//! Combination follows Kleene's strong three-valued logic. SUPERPOSITION
//! sits between the determined states and UNKNOWN:
//!
//! - a determining operand (FALSE under AND, TRUE under OR) always wins;
//! - otherwise any UNKNOWN operand makes the result UNKNOWN;
//! - otherwise the result is a SUPERPOSITION whose probability is computed
//!   assuming independent operands, collapsing to TRUE/FALSE at 1.0/0.0.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The four truth states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TruthState {
    True,
    False,
    Unknown,
    Superposition,
}

impl TruthState {
    /// Stable numeric code used by the persisted form.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::True => 1,
            Self::False => 2,
            Self::Unknown => 3,
            Self::Superposition => 4,
        }
    }

    /// Inverse of [`TruthState::code`].
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::True),
            2 => Some(Self::False),
            3 => Some(Self::Unknown),
            4 => Some(Self::Superposition),
            _ => None,
        }
    }

    /// Returns true for TRUE and FALSE.
    #[must_use]
    pub const fn is_determined(self) -> bool {
        matches!(self, Self::True | Self::False)
    }
}

impl From<bool> for TruthState {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

impl fmt::Display for TruthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "TRUE"),
            Self::False => write!(f, "FALSE"),
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Superposition => write!(f, "SUPERPOSITION"),
        }
    }
}

/// The mode under which a truth is asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    /// Necessary or possible truth.
    #[default]
    Alethic,
    /// Obligation or permission.
    Deontic,
    /// Knowledge or belief.
    Epistemic,
    /// Chance.
    Probabilistic,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alethic => write!(f, "alethic"),
            Self::Deontic => write!(f, "deontic"),
            Self::Epistemic => write!(f, "epistemic"),
            Self::Probabilistic => write!(f, "probabilistic"),
        }
    }
}

/// A truth state under a modality.
///
/// # Examples
///
/// ```
/// use logos_ontology::{TruthState, TruthValue};
///
/// let maybe = TruthValue::superposition(0.7).unwrap();
/// assert_eq!(maybe.evaluate(), TruthState::Superposition);
/// assert_eq!(maybe.probability(), Some(0.7));
///
/// let both = TruthValue::TRUE.and(&maybe);
/// assert_eq!(both.probability(), Some(0.7));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TruthValueFields")]
pub struct TruthValue {
    value: TruthState,

    #[serde(default)]
    modality: Modality,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    probability: Option<f64>,
}

/// Unchecked wire form of [`TruthValue`]; deserialization goes through
/// [`TruthValue::new`].
#[derive(Deserialize)]
struct TruthValueFields {
    value: TruthState,

    #[serde(default)]
    modality: Modality,

    #[serde(default)]
    probability: Option<f64>,
}

impl TryFrom<TruthValueFields> for TruthValue {
    type Error = ValidationError;

    fn try_from(fields: TruthValueFields) -> Result<Self, Self::Error> {
        Self::new(fields.value, fields.modality, fields.probability)
    }
}

impl TruthValue {
    /// Alethic TRUE.
    pub const TRUE: Self = Self::certain(TruthState::True);

    /// Alethic FALSE.
    pub const FALSE: Self = Self::certain(TruthState::False);

    /// Alethic UNKNOWN.
    pub const UNKNOWN: Self = Self::certain(TruthState::Unknown);

    const fn certain(value: TruthState) -> Self {
        Self {
            value,
            modality: Modality::Alethic,
            probability: None,
        }
    }

    /// Creates a truth value with validation.
    ///
    /// The probability is kept only for SUPERPOSITION, where it is required.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingProbability` for a SUPERPOSITION with
    /// no probability and `ValidationError::ProbabilityOutOfRange` when the
    /// probability is outside [0.0, 1.0].
    pub fn new(
        value: TruthState,
        modality: Modality,
        probability: Option<f64>,
    ) -> Result<Self, ValidationError> {
        let probability = match value {
            TruthState::Superposition => {
                let p = probability.ok_or(ValidationError::MissingProbability)?;
                Some(Self::validate_probability(p)?)
            }
            _ => None,
        };
        Ok(Self {
            value,
            modality,
            probability,
        })
    }

    /// Creates a SUPERPOSITION that collapses to TRUE with probability `p`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ProbabilityOutOfRange` if `p` is not in [0.0, 1.0].
    pub fn superposition(p: f64) -> Result<Self, ValidationError> {
        Self::new(TruthState::Superposition, Modality::Probabilistic, Some(p))
    }

    /// Wraps a bare state.
    ///
    /// A SUPERPOSITION built this way has no prior information and gets
    /// probability 0.5.
    #[must_use]
    pub const fn from_state(value: TruthState) -> Self {
        match value {
            TruthState::Superposition => Self {
                value,
                modality: Modality::Probabilistic,
                probability: Some(0.5),
            },
            _ => Self::certain(value),
        }
    }

    fn validate_probability(p: f64) -> Result<f64, ValidationError> {
        if p.is_finite() && (0.0..=1.0).contains(&p) {
            Ok(p)
        } else {
            Err(ValidationError::ProbabilityOutOfRange { value: p })
        }
    }

    /// Returns a copy under a different modality.
    #[must_use]
    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = modality;
        self
    }

    /// The stored state, without sampling.
    #[must_use]
    pub const fn evaluate(&self) -> TruthState {
        self.value
    }

    #[must_use]
    pub const fn modality(&self) -> Modality {
        self.modality
    }

    /// Probability of TRUE; present only for SUPERPOSITION.
    #[must_use]
    pub const fn probability(&self) -> Option<f64> {
        self.probability
    }

    /// Draws a concrete state without mutating the stored value.
    ///
    /// SUPERPOSITION collapses through a Bernoulli draw; every other state is
    /// returned as is.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> TruthState {
        match (self.value, self.probability) {
            (TruthState::Superposition, Some(p)) => TruthState::from(rng.gen_bool(p)),
            (state, _) => state,
        }
    }

    /// Evaluates, optionally sampling a SUPERPOSITION.
    pub fn evaluate_with<R: Rng + ?Sized>(&self, sample: bool, rng: &mut R) -> TruthState {
        if sample {
            self.sample(rng)
        } else {
            self.value
        }
    }

    /// Collapses a SUPERPOSITION in place and returns the new state.
    pub fn collapse<R: Rng + ?Sized>(&mut self, rng: &mut R) -> TruthState {
        let state = self.sample(rng);
        self.value = state;
        if state != TruthState::Superposition {
            self.probability = None;
        }
        state
    }

    /// Probability of TRUE for a resolved operand: 1 for TRUE, 0 for FALSE.
    fn truth_probability(&self) -> Option<f64> {
        match self.value {
            TruthState::True => Some(1.0),
            TruthState::False => Some(0.0),
            TruthState::Superposition => self.probability,
            TruthState::Unknown => None,
        }
    }

    fn from_probability(p: f64, modality: Modality) -> Self {
        if p >= 1.0 {
            Self::TRUE.with_modality(modality)
        } else if p <= 0.0 {
            Self::FALSE.with_modality(modality)
        } else {
            Self {
                value: TruthState::Superposition,
                modality,
                probability: Some(p),
            }
        }
    }

    fn shared_modality(values: &[Self]) -> Modality {
        match values.first() {
            Some(first) if values.iter().all(|v| v.modality == first.modality) => first.modality,
            _ => Modality::Alethic,
        }
    }

    /// Logical negation.
    ///
    /// TRUE and FALSE swap, UNKNOWN passes through and a SUPERPOSITION stays
    /// a SUPERPOSITION with its probability complemented.
    #[must_use]
    pub fn not(&self) -> Self {
        let value = match self.value {
            TruthState::True => TruthState::False,
            TruthState::False => TruthState::True,
            other => other,
        };
        Self {
            value,
            modality: self.modality,
            probability: self.probability.map(|p| 1.0 - p),
        }
    }

    /// Binary conjunction.
    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        Self::and_all(&[*self, *other])
    }

    /// Binary disjunction.
    #[must_use]
    pub fn or(&self, other: &Self) -> Self {
        Self::or_all(&[*self, *other])
    }

    /// Binary exclusive or.
    #[must_use]
    pub fn xor(&self, other: &Self) -> Self {
        Self::xor_all(&[*self, *other])
    }

    /// N-ary conjunction. The empty conjunction is TRUE.
    #[must_use]
    pub fn and_all(values: &[Self]) -> Self {
        let modality = Self::shared_modality(values);
        if values.iter().any(|v| v.value == TruthState::False) {
            return Self::FALSE.with_modality(modality);
        }
        if values.iter().any(|v| v.value == TruthState::Unknown) {
            return Self::UNKNOWN.with_modality(modality);
        }
        let p = values
            .iter()
            .filter_map(Self::truth_probability)
            .product::<f64>();
        Self::from_probability(p, modality)
    }

    /// N-ary disjunction. The empty disjunction is FALSE.
    #[must_use]
    pub fn or_all(values: &[Self]) -> Self {
        let modality = Self::shared_modality(values);
        if values.iter().any(|v| v.value == TruthState::True) {
            return Self::TRUE.with_modality(modality);
        }
        if values.iter().any(|v| v.value == TruthState::Unknown) {
            return Self::UNKNOWN.with_modality(modality);
        }
        let none = values
            .iter()
            .filter_map(Self::truth_probability)
            .map(|p| 1.0 - p)
            .product::<f64>();
        Self::from_probability(1.0 - none, modality)
    }

    /// N-ary exclusive or: TRUE iff an odd number of operands are TRUE.
    #[must_use]
    pub fn xor_all(values: &[Self]) -> Self {
        let modality = Self::shared_modality(values);
        if values.iter().any(|v| v.value == TruthState::Unknown) {
            return Self::UNKNOWN.with_modality(modality);
        }
        let odd = values
            .iter()
            .filter_map(Self::truth_probability)
            .fold(0.0, |odd, p| odd * (1.0 - p) + (1.0 - odd) * p);
        Self::from_probability(odd, modality)
    }
}

impl Default for TruthValue {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl From<bool> for TruthValue {
    fn from(value: bool) -> Self {
        if value {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }
}

impl fmt::Display for TruthValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.probability {
            Some(p) => write!(f, "{}(p={p:.2})", self.value)?,
            None => write!(f, "{}", self.value)?,
        }
        if self.modality != Modality::Alethic {
            write!(f, " [{}]", self.modality)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sup(p: f64) -> TruthValue {
        TruthValue::superposition(p).unwrap()
    }

    #[test]
    fn test_state_codes_roundtrip() {
        for state in [
            TruthState::True,
            TruthState::False,
            TruthState::Unknown,
            TruthState::Superposition,
        ] {
            assert_eq!(TruthState::from_code(state.code()), Some(state));
        }
        assert_eq!(TruthState::from_code(0), None);
    }

    #[test]
    fn test_superposition_requires_probability() {
        let err = TruthValue::new(TruthState::Superposition, Modality::Alethic, None);
        assert!(matches!(err, Err(ValidationError::MissingProbability)));

        let err = TruthValue::superposition(1.5);
        assert!(matches!(
            err,
            Err(ValidationError::ProbabilityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_probability_dropped_for_determined_states() {
        let tv = TruthValue::new(TruthState::True, Modality::Epistemic, Some(0.3)).unwrap();
        assert_eq!(tv.probability(), None);
        assert_eq!(tv.modality(), Modality::Epistemic);
    }

    #[test]
    fn test_not_table() {
        assert_eq!(TruthValue::TRUE.not().evaluate(), TruthState::False);
        assert_eq!(TruthValue::FALSE.not().evaluate(), TruthState::True);
        assert_eq!(TruthValue::UNKNOWN.not().evaluate(), TruthState::Unknown);

        let negated = sup(0.7).not();
        assert_eq!(negated.evaluate(), TruthState::Superposition);
        assert!((negated.probability().unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_and_table() {
        use TruthValue as T;
        assert_eq!(T::TRUE.and(&T::TRUE).evaluate(), TruthState::True);
        assert_eq!(T::TRUE.and(&T::FALSE).evaluate(), TruthState::False);
        assert_eq!(T::UNKNOWN.and(&T::FALSE).evaluate(), TruthState::False);
        assert_eq!(T::UNKNOWN.and(&T::TRUE).evaluate(), TruthState::Unknown);
        assert_eq!(sup(0.5).and(&T::FALSE).evaluate(), TruthState::False);
        assert_eq!(sup(0.5).and(&T::UNKNOWN).evaluate(), TruthState::Unknown);

        let both = sup(0.5).and(&sup(0.5));
        assert_eq!(both.evaluate(), TruthState::Superposition);
        assert!((both.probability().unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_or_table() {
        use TruthValue as T;
        assert_eq!(T::FALSE.or(&T::FALSE).evaluate(), TruthState::False);
        assert_eq!(T::FALSE.or(&T::TRUE).evaluate(), TruthState::True);
        assert_eq!(T::UNKNOWN.or(&T::TRUE).evaluate(), TruthState::True);
        assert_eq!(T::UNKNOWN.or(&T::FALSE).evaluate(), TruthState::Unknown);
        assert_eq!(sup(0.2).or(&T::TRUE).evaluate(), TruthState::True);

        let either = sup(0.5).or(&sup(0.5));
        assert!((either.probability().unwrap() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_xor_table() {
        use TruthValue as T;
        assert_eq!(T::TRUE.xor(&T::FALSE).evaluate(), TruthState::True);
        assert_eq!(T::TRUE.xor(&T::TRUE).evaluate(), TruthState::False);
        assert_eq!(T::TRUE.xor(&T::UNKNOWN).evaluate(), TruthState::Unknown);
        assert_eq!(
            T::xor_all(&[T::TRUE, T::TRUE, T::TRUE]).evaluate(),
            TruthState::True
        );

        let flipped = sup(0.7).xor(&T::TRUE);
        assert_eq!(flipped.evaluate(), TruthState::Superposition);
        assert!((flipped.probability().unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_empty_combinations() {
        assert_eq!(TruthValue::and_all(&[]).evaluate(), TruthState::True);
        assert_eq!(TruthValue::or_all(&[]).evaluate(), TruthState::False);
        assert_eq!(TruthValue::xor_all(&[]).evaluate(), TruthState::False);
    }

    #[test]
    fn test_sample_does_not_mutate() {
        let tv = sup(0.5);
        let mut rng = StdRng::seed_from_u64(7);
        let drawn = tv.sample(&mut rng);
        assert!(drawn.is_determined());
        assert_eq!(tv.evaluate(), TruthState::Superposition);
        assert_eq!(tv.evaluate_with(false, &mut rng), TruthState::Superposition);
    }

    #[test]
    fn test_sample_extremes() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            assert_eq!(sup(1.0).sample(&mut rng), TruthState::True);
            assert_eq!(sup(0.0).sample(&mut rng), TruthState::False);
        }
        assert_eq!(TruthValue::UNKNOWN.sample(&mut rng), TruthState::Unknown);
    }

    #[test]
    fn test_collapse_mutates() {
        let mut tv = sup(0.9);
        let mut rng = StdRng::seed_from_u64(1);
        let state = tv.collapse(&mut rng);
        assert!(state.is_determined());
        assert_eq!(tv.evaluate(), state);
        assert_eq!(tv.probability(), None);
    }

    #[test]
    fn test_modality_preserved_when_shared() {
        let a = TruthValue::TRUE.with_modality(Modality::Deontic);
        let b = TruthValue::TRUE.with_modality(Modality::Deontic);
        assert_eq!(a.and(&b).modality(), Modality::Deontic);
        assert_eq!(a.and(&TruthValue::TRUE).modality(), Modality::Alethic);
    }

    #[test]
    fn test_display() {
        assert_eq!(TruthValue::TRUE.to_string(), "TRUE");
        assert!(sup(0.7).to_string().contains("p=0.70"));
    }

    #[test]
    fn test_serialization() {
        let tv = sup(0.25);
        let json = serde_json::to_string(&tv).unwrap();
        let back: TruthValue = serde_json::from_str(&json).unwrap();
        assert_eq!(tv, back);
    }

    #[test]
    fn test_deserialization_validates() {
        let err = serde_json::from_str::<TruthValue>(
            r#"{"value":"SUPERPOSITION","probability":1.5}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));

        assert!(serde_json::from_str::<TruthValue>(r#"{"value":"SUPERPOSITION"}"#).is_err());

        // A stray probability on a determined state is dropped.
        let tv: TruthValue = serde_json::from_str(r#"{"value":"TRUE","probability":0.3}"#).unwrap();
        assert_eq!(tv, TruthValue::TRUE);
    }
}
