//! Error types for the ontology.
//!
//! All errors are strongly typed using thiserror. Every failure is a local
//! validation problem surfaced directly to the caller; an operation that
//! returns an error has left the ontology exactly as it found it.

use thiserror::Error;

use crate::entity::EntityId;
use crate::implication::ImplicationId;
use crate::quantifier::QuantifiedId;
use crate::relation::RelationId;
use crate::time::TimeInterval;

/// Validation errors raised before any mutation takes place.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Duplicate {kind} identifier: {key}")]
    DuplicateIdentifier {
        kind: &'static str,
        key: String,
    },

    #[error("Interval {new} overlaps existing interval {existing}")]
    IntervalOverlap {
        new: TimeInterval,
        existing: TimeInterval,
    },

    #[error("Invalid interval: start ({start}) must be before end ({end})")]
    InvalidInterval {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    #[error("Variable '{variable}' is not bound")]
    UnboundVariable {
        variable: String,
    },

    #[error("Variable '{variable}' is used in the template but not declared")]
    UndeclaredVariable {
        variable: String,
    },

    #[error("Unknown logical operator: {operator}")]
    UnknownOperator {
        operator: String,
    },

    #[error("Operator {operator} expects {expected} operand(s), got {actual}")]
    InvalidArity {
        operator: String,
        expected: &'static str,
        actual: usize,
    },

    #[error("{field} cannot be empty")]
    EmptyName {
        field: &'static str,
    },

    #[error("Probability {value} is out of range [0.0, 1.0]")]
    ProbabilityOutOfRange {
        value: f64,
    },

    #[error("SUPERPOSITION requires a probability")]
    MissingProbability,

    #[error("Role '{role}' is not declared by predicate {predicate}")]
    UndeclaredRole {
        predicate: String,
        role: String,
    },

    #[error("Role mapping for predicate {predicate} names unknown role '{role}'")]
    InvalidRoleMapping {
        predicate: String,
        role: String,
    },

    #[error("Roles of predicate {predicate} collide on '{role}'")]
    RoleCollision {
        predicate: String,
        role: String,
    },

    #[error("Relation {relation} already states this fact {reason}")]
    ConflictingFact {
        relation: RelationId,
        reason: &'static str,
    },

    #[error("Relation {relation} takes its truth from a context")]
    DerivedTruth {
        relation: RelationId,
    },

    #[error("Context of relation {relation} would create a dependency cycle")]
    ContextCycle {
        relation: RelationId,
    },

    #[error("Relation {relation} is not temporal")]
    NotTemporal {
        relation: RelationId,
    },

    #[error("Duration out of range: {reason}")]
    DurationOutOfRange {
        reason: String,
    },

    #[error("Invalid name pattern: {reason}")]
    InvalidPattern {
        reason: String,
    },
}

/// A referenced object is not registered in the ontology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissingReference {
    #[error("Entity not found: {0}")]
    Entity(EntityId),

    #[error("No entity named '{0}'")]
    EntityName(String),

    #[error("Relation not found: {0}")]
    Relation(RelationId),

    #[error("Predicate not found: {0}")]
    Predicate(String),

    #[error("Quantified relation not found: {0}")]
    Quantified(QuantifiedId),

    #[error("Implication not found: {0}")]
    Implication(ImplicationId),
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum LogosError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Missing reference: {0}")]
    MissingReference(#[from] MissingReference),

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl LogosError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a referenced object was missing.
    #[must_use]
    pub const fn is_missing_reference(&self) -> bool {
        matches!(self, Self::MissingReference(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Nothing in the ontology fails transiently, so this is always false.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}

/// Result type alias for ontology operations.
pub type LogosResult<T> = Result<T, LogosError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_duplicate_identifier_message() {
        let err = ValidationError::DuplicateIdentifier {
            kind: "entity",
            key: "DOG".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("entity"));
        assert!(msg.contains("DOG"));
    }

    #[test]
    fn test_interval_overlap_message() {
        let now = Utc::now();
        let a = TimeInterval::new(Some(now), Some(now + Duration::minutes(30))).unwrap();
        let b = TimeInterval::new(
            Some(now + Duration::minutes(15)),
            Some(now + Duration::minutes(45)),
        )
        .unwrap();
        let err = ValidationError::IntervalOverlap { new: b, existing: a };
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_unknown_operator_message() {
        let err = ValidationError::UnknownOperator {
            operator: "IMPLIES".to_string(),
        };
        assert!(err.to_string().contains("IMPLIES"));
    }

    #[test]
    fn test_logos_error_from_validation() {
        let err: LogosError = ValidationError::MissingProbability.into();
        assert!(err.is_validation());
        assert!(!err.is_missing_reference());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_logos_error_from_missing_reference() {
        let err: LogosError = MissingReference::Predicate("EATS".to_string()).into();
        assert!(err.is_missing_reference());
        assert!(err.to_string().contains("EATS"));
    }

    #[test]
    fn test_logos_error_internal() {
        let err = LogosError::internal("unexpected state");
        assert!(!err.is_validation());
        assert!(err.to_string().contains("unexpected state"));
    }
}
