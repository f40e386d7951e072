//! Implications between relations.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::relation::RelationId;
use crate::truth::{TruthState, TruthValue};

/// Unique identifier for an implication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImplicationId(Uuid);

impl ImplicationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ImplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `antecedent → consequent`, itself carrying a truth value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implication {
    pub id: ImplicationId,
    pub antecedent: RelationId,
    pub consequent: RelationId,
    pub truth: TruthValue,
}

impl Implication {
    #[must_use]
    pub fn new(antecedent: RelationId, consequent: RelationId, truth: TruthValue) -> Self {
        Self {
            id: ImplicationId::new(),
            antecedent,
            consequent,
            truth,
        }
    }

    /// Infers the consequent's truth.
    ///
    /// A consequent whose own truth is known keeps it. Otherwise the
    /// consequent is TRUE only when both this implication and the antecedent
    /// are TRUE, and UNKNOWN in every other case (a false antecedent says
    /// nothing about the consequent).
    #[must_use]
    pub fn infer_consequent(&self, antecedent: &TruthValue, consequent: &TruthValue) -> TruthValue {
        if consequent.evaluate() != TruthState::Unknown {
            return *consequent;
        }
        if self.truth.evaluate() == TruthState::True && antecedent.evaluate() == TruthState::True {
            TruthValue::TRUE
        } else {
            TruthValue::UNKNOWN
        }
    }
}

impl fmt::Display for Implication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IMPLIES({} → {}): {}", self.antecedent, self.consequent, self.truth)
    }
}
