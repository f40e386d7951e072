//! # Logos - an in-memory ontology with truth maintenance
//!
//! Logos stores a directed acyclic hierarchy of entities and the relations
//! asserted between them. Relations carry a four-valued truth value and may
//! derive it from the truth of other relations; changing one relation
//! re-evaluates everything that depends on it.
//!
//! ## Core Concepts
//!
//! - **Entity**: a named concept with a word type and parents
//! - **Predicate**: a relation name with its declared roles
//! - **Relation**: a predicate applied to entities, with a truth value
//! - **Context**: where a contextual relation takes its truth from
//! - **TruthValue**: TRUE, FALSE, UNKNOWN or SUPERPOSITION with a probability
//!
//! A relation asserted about an entity holds for all of its descendants:
//! asserting `EATS(ANIMAL, FOOD)` makes the relation visible from `DOG` and
//! `FIDO` as well.
//!
//! ## Usage
//!
//! ```
//! use logos_ontology::{Ontology, RelationBuilder, RelationContext, TruthState, TruthValue};
//!
//! let mut ontology = Ontology::new();
//! let dex = ontology.add_entity("DEX", "PROPER_NOUN", &[], None)?;
//! ontology.add_predicate::<&str>("HUNGRY", &[])?;
//! ontology.add_predicate::<&str>("EATS", &[])?;
//!
//! let hungry = ontology.add_relation(
//!     RelationBuilder::new("HUNGRY").role("subject", dex).truth(TruthValue::TRUE),
//! )?;
//! let eats = ontology.add_relation(
//!     RelationBuilder::new("EATS")
//!         .role("subject", dex)
//!         .context(RelationContext::relation(hungry)),
//! )?;
//! assert_eq!(ontology.evaluate_truth(eats)?, TruthState::True);
//!
//! ontology.set_truth_value(hungry, TruthValue::FALSE)?;
//! assert_eq!(ontology.evaluate_truth(eats)?, TruthState::False);
//! # Ok::<(), logos_ontology::LogosError>(())
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod entity;
pub mod error;
pub mod predicate;
pub mod relation;
pub mod time;
pub mod truth;

// Rules
pub mod implication;
pub mod quantifier;

// Registry, configuration and persistence
pub mod config;
pub mod ontology;
pub mod snapshot;

pub use config::OntologyConfig;
pub use entity::{Entity, EntityId};
pub use error::{LogosError, LogosResult, MissingReference, ValidationError};
pub use implication::{Implication, ImplicationId};
pub use ontology::{EntityQuery, ExpiryHandle, Ontology, RelationQuery, SharedOntology};
pub use predicate::Predicate;
pub use quantifier::{QuantifiedId, QuantifiedRelation, Quantifier, RelationTemplate, TemplateRole};
pub use relation::{
    Context, IntervalTruth, LogicOp, Relation, RelationBuilder, RelationContext, RelationId,
    RelationType, TemporalTruth, TruthCallback, TruthResolver,
};
pub use snapshot::{OntologySnapshot, SNAPSHOT_VERSION};
pub use time::TimeInterval;
pub use truth::{Modality, TruthState, TruthValue};
