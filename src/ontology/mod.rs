//! The ontology registry.
//!
//! [`Ontology`] is the sole owner of entities, predicates, relations,
//! quantified relations and implications. Everything else refers to them by
//! id. The registry is single-writer and synchronous; wrap it in a
//! [`SharedOntology`] to share it across threads.
//!
//! Operations are split by concern:
//!
//! - this module: registration, removal and lookup;
//! - [`propagation`]: hierarchy walks, relation propagation and truth
//!   maintenance;
//! - [`query`]: filtered scans;
//! - [`rules`]: quantified relations, implications and inverses;
//! - [`expiry`]: the shared handle and background expiry timers.

pub mod expiry;
pub mod propagation;
pub mod query;
pub mod rules;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::OntologyConfig;
use crate::entity::{normalize_name, Entity, EntityId};
use crate::error::{LogosError, LogosResult, MissingReference, ValidationError};
use crate::implication::{Implication, ImplicationId};
use crate::predicate::Predicate;
use crate::quantifier::{QuantifiedId, QuantifiedRelation};
use crate::relation::{
    Context, Relation, RelationBuilder, RelationId, RelationType, TemporalTruth,
};
use crate::time::TimeInterval;
use crate::truth::TruthValue;

pub use expiry::{ExpiryHandle, SharedOntology};
pub use query::{EntityQuery, RelationQuery};

/// In-memory knowledge base of entities and the relations between them.
///
/// # Example
/// ```
/// use logos_ontology::{Ontology, RelationBuilder, TruthValue};
///
/// let mut ontology = Ontology::new();
/// let animal = ontology.add_entity("ANIMAL", "NOUN", &[], None)?;
/// let dog = ontology.add_entity("DOG", "NOUN", &[animal], None)?;
/// let food = ontology.add_entity("FOOD", "NOUN", &[], None)?;
/// ontology.add_predicate("EATS", &["subject", "object"])?;
///
/// let eats = ontology.add_relation(
///     RelationBuilder::new("EATS")
///         .role("subject", animal)
///         .role("object", food)
///         .truth(TruthValue::TRUE),
/// )?;
///
/// let inherited = ontology.all_relations(dog)?;
/// assert_eq!(inherited[0].id, eats);
/// # Ok::<(), logos_ontology::LogosError>(())
/// ```
#[derive(Default)]
pub struct Ontology {
    config: OntologyConfig,

    pub(crate) entities: HashMap<EntityId, Entity>,
    pub(crate) entity_order: Vec<EntityId>,
    /// Canonical name to entities (homonyms share a name).
    pub(crate) names: HashMap<String, Vec<EntityId>>,
    /// Alias to entities; one alias may name several entities.
    pub(crate) aliases: HashMap<String, Vec<EntityId>>,

    pub(crate) predicates: BTreeMap<String, Predicate>,

    pub(crate) relations: HashMap<RelationId, Relation>,
    pub(crate) relation_order: Vec<RelationId>,

    pub(crate) quantified: HashMap<QuantifiedId, QuantifiedRelation>,
    pub(crate) quantified_order: Vec<QuantifiedId>,

    pub(crate) implications: HashMap<ImplicationId, Implication>,
    pub(crate) implication_order: Vec<ImplicationId>,

    /// Cancel handles for pending expiry timers.
    pub(crate) timers: HashMap<RelationId, ExpiryHandle>,
}

impl Ontology {
    /// Creates an empty ontology with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty ontology.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Config` if the configuration is invalid.
    pub fn with_config(config: OntologyConfig) -> LogosResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    #[must_use]
    pub const fn config(&self) -> &OntologyConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Registers an entity under the given parents.
    ///
    /// The id is derived from name, word type and parent names, so declaring
    /// the same entity twice fails. When `inherit_on_insert` is set, the new
    /// entity picks up every relation already asserted about its ancestors.
    ///
    /// # Errors
    ///
    /// - `ValidationError::EmptyName` for a blank name or word type
    /// - `MissingReference::Entity` for an unknown parent
    /// - `ValidationError::DuplicateIdentifier` if the entity exists
    pub fn add_entity(
        &mut self,
        name: &str,
        word_type: &str,
        parents: &[EntityId],
        description: Option<&str>,
    ) -> LogosResult<EntityId> {
        let canonical = normalize_name(name);
        if canonical.is_empty() {
            return Err(ValidationError::EmptyName { field: "entity name" }.into());
        }
        if normalize_name(word_type).is_empty() {
            return Err(ValidationError::EmptyName { field: "word type" }.into());
        }

        let mut parent_ids = Vec::with_capacity(parents.len());
        let mut parent_names = Vec::with_capacity(parents.len());
        for parent in parents {
            let entity = self.entity_or_err(*parent)?;
            if !parent_ids.contains(parent) {
                parent_ids.push(*parent);
                parent_names.push(entity.name.clone());
            }
        }

        let id = EntityId::derive(&canonical, word_type, &parent_names);
        if self.entities.contains_key(&id) {
            return Err(ValidationError::DuplicateIdentifier {
                kind: "entity",
                key: canonical,
            }
            .into());
        }

        let entity = Entity::new(
            id,
            &canonical,
            word_type,
            parent_ids,
            description.map(str::to_string),
        );
        debug!(entity = %id, name = %entity.name, word_type = %entity.word_type, "entity registered");

        self.names.entry(canonical).or_default().push(id);
        self.entities.insert(id, entity);
        self.entity_order.push(id);

        if self.config.inherit_on_insert {
            self.inherit_relations(id);
        }
        Ok(id)
    }

    /// Adds an alternate name for an entity.
    ///
    /// Returns false if the entity already answered to that name.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Entity` for an unknown entity and
    /// `ValidationError::EmptyName` for a blank alias.
    pub fn add_alias(&mut self, entity: EntityId, alias: &str) -> LogosResult<bool> {
        let canonical = normalize_name(alias);
        if canonical.is_empty() {
            return Err(ValidationError::EmptyName { field: "alias" }.into());
        }
        let target = self
            .entities
            .get_mut(&entity)
            .ok_or(MissingReference::Entity(entity))?;
        if !target.add_alias(&canonical) {
            return Ok(false);
        }
        let owners = self.aliases.entry(canonical).or_default();
        if !owners.contains(&entity) {
            owners.push(entity);
        }
        Ok(true)
    }

    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub(crate) fn entity_or_err(&self, id: EntityId) -> LogosResult<&Entity> {
        self.entities
            .get(&id)
            .ok_or_else(|| MissingReference::Entity(id).into())
    }

    /// Entities in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entity_order.iter().filter_map(|id| self.entities.get(id))
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Every entity answering to `name`, by canonical name or alias.
    ///
    /// Homonyms are all returned, in registration order.
    #[must_use]
    pub fn resolve_entity(&self, name: &str) -> Vec<&Entity> {
        let key = normalize_name(name);
        let mut ids: BTreeSet<EntityId> = BTreeSet::new();
        for table in [&self.names, &self.aliases] {
            if let Some(found) = table.get(&key) {
                ids.extend(found.iter().copied());
            }
        }
        self.entities().filter(|e| ids.contains(&e.id)).collect()
    }

    /// The first entity registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::EntityName` if nothing answers to `name`.
    pub fn find_entity(&self, name: &str) -> LogosResult<EntityId> {
        self.resolve_entity(name)
            .first()
            .map(|e| e.id)
            .ok_or_else(|| MissingReference::EntityName(normalize_name(name)).into())
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    /// Registers a predicate with its declared roles.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyName` for blank names and
    /// `ValidationError::DuplicateIdentifier` if the name is taken.
    pub fn add_predicate<S: AsRef<str>>(&mut self, name: &str, roles: &[S]) -> LogosResult<&Predicate> {
        let predicate = Predicate::new(name, roles)?;
        self.insert_predicate(predicate)
    }

    fn insert_predicate(&mut self, predicate: Predicate) -> LogosResult<&Predicate> {
        if self.predicates.contains_key(&predicate.name) {
            return Err(ValidationError::DuplicateIdentifier {
                kind: "predicate",
                key: predicate.name,
            }
            .into());
        }
        debug!(predicate = %predicate.name, roles = ?predicate.roles, "predicate registered");
        let name = predicate.name.clone();
        Ok(self.predicates.entry(name).or_insert(predicate))
    }

    #[must_use]
    pub fn predicate(&self, name: &str) -> Option<&Predicate> {
        self.predicates.get(&normalize_name(name))
    }

    pub(crate) fn predicate_or_err(&self, name: &str) -> LogosResult<&Predicate> {
        let key = normalize_name(name);
        self.predicates
            .get(&key)
            .ok_or_else(|| MissingReference::Predicate(key).into())
    }

    /// Predicates in name order.
    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.values()
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    /// Asserts a relation.
    ///
    /// A relation stating the same fact as an existing one, meaning the same
    /// predicate, roles and context, is not created again; the existing id
    /// is returned. A new relation is attached to its role entities and to
    /// all of their registered descendants, and registered as a dependent of
    /// every relation its context reads.
    ///
    /// # Errors
    ///
    /// - `MissingReference` for an unknown predicate, role entity or context
    ///   relation
    /// - `ValidationError::UndeclaredRole` for a role the predicate does not
    ///   declare
    pub fn add_relation(&mut self, builder: RelationBuilder) -> LogosResult<RelationId> {
        self.insert_relation(builder, None, None)
    }

    /// Asserts a temporal relation whose truth is given per interval.
    ///
    /// Re-asserting a temporal fact with the same intervals returns the
    /// existing id.
    ///
    /// # Errors
    ///
    /// `ValidationError::ConflictingFact` if the fact is already asserted
    /// without intervals or with different ones, otherwise the errors of
    /// [`Ontology::add_relation`].
    pub fn add_temporal_relation(
        &mut self,
        builder: RelationBuilder,
        temporal: TemporalTruth,
    ) -> LogosResult<RelationId> {
        let builder = builder.relation_type(RelationType::Temporal);
        self.insert_relation(builder, Some(temporal), None)
    }

    /// Asserts a relation that stops holding after `duration`.
    ///
    /// Expired relations evaluate to FALSE and are removed by
    /// [`Ontology::expire_temporary_relations`]. For a timer that deactivates
    /// the relation on its own, use [`SharedOntology::add_temporary_relation`].
    ///
    /// # Errors
    ///
    /// - `ValidationError::DurationOutOfRange` if `duration` cannot be
    ///   represented
    /// - `ValidationError::ConflictingFact` if the fact is already asserted
    ///   without an expiry
    /// - otherwise the errors of [`Ontology::add_relation`]
    pub fn add_temporary_relation(
        &mut self,
        builder: RelationBuilder,
        duration: std::time::Duration,
    ) -> LogosResult<RelationId> {
        let expires_at = expiry_instant(Utc::now(), duration)?;
        let builder = builder.relation_type(RelationType::Temporary);
        self.insert_relation(builder, None, Some(expires_at))
    }

    fn insert_relation(
        &mut self,
        builder: RelationBuilder,
        temporal: Option<TemporalTruth>,
        expires_at: Option<DateTime<Utc>>,
    ) -> LogosResult<RelationId> {
        let predicate = self.validate_relation(&builder)?;

        if let Some(existing) = self
            .relations()
            .find(|r| r.same_fact(&predicate, &builder.roles, builder.context.as_ref()))
        {
            if let Some(temporal) = &temporal {
                match &existing.temporal {
                    None => {
                        return Err(ValidationError::ConflictingFact {
                            relation: existing.id,
                            reason: "without intervals",
                        }
                        .into());
                    }
                    Some(stored) if stored != temporal => {
                        return Err(ValidationError::ConflictingFact {
                            relation: existing.id,
                            reason: "with different intervals",
                        }
                        .into());
                    }
                    Some(_) => {}
                }
            }
            if expires_at.is_some() && existing.expires_at.is_none() {
                return Err(ValidationError::ConflictingFact {
                    relation: existing.id,
                    reason: "without an expiry",
                }
                .into());
            }
            debug!(relation = %existing.id, predicate = %predicate, "relation already asserted");
            return Ok(existing.id);
        }

        let mut relation = Relation::new(
            predicate,
            builder.roles,
            builder.relation_type,
            builder.context,
            builder.truth,
        );
        relation.temporal = temporal;
        relation.expires_at = expires_at;
        let id = relation.id;

        if self.config.sync_context_on_insert && relation.context.is_some() {
            relation.truth_value = self.evaluate_context(&relation, Utc::now());
        }

        debug!(relation = %id, predicate = %relation.predicate, kind = %relation.relation_type, "relation asserted");
        self.register_relation(relation);
        self.propagate(id);
        Ok(id)
    }

    /// Checks a relation assertion and returns the canonical predicate name.
    fn validate_relation(&self, builder: &RelationBuilder) -> LogosResult<String> {
        let predicate = self.predicate_or_err(&builder.predicate)?;
        for (role, entity) in &builder.roles {
            if !predicate.accepts_role(role) {
                return Err(ValidationError::UndeclaredRole {
                    predicate: predicate.name.clone(),
                    role: role.clone(),
                }
                .into());
            }
            self.entity_or_err(*entity)?;
        }
        if let Some(context) = &builder.context {
            self.validate_context(context)?;
        }
        Ok(predicate.name.clone())
    }

    pub(crate) fn validate_context(&self, context: &Context) -> LogosResult<()> {
        for source in context.relations() {
            self.relation_or_err(source)?;
        }
        Ok(())
    }

    /// Stores a relation, attaches it to its role entities and links it
    /// into the dependency graph. No validation.
    pub(crate) fn register_relation(&mut self, relation: Relation) {
        let id = relation.id;
        for entity in relation.participants() {
            if let Some(entity) = self.entities.get_mut(&entity) {
                entity.attach(id);
            }
        }
        if let Some(context) = &relation.context {
            self.link_dependents(id, context);
        }
        self.relations.insert(id, relation);
        self.relation_order.push(id);
    }

    pub(crate) fn link_dependents(&mut self, dependent: RelationId, context: &Context) {
        for source in context.relations() {
            if let Some(source) = self.relations.get_mut(&source) {
                source.dependents.insert(dependent);
            }
        }
    }

    pub(crate) fn unlink_dependents(&mut self, dependent: RelationId, context: &Context) {
        for source in context.relations() {
            if let Some(source) = self.relations.get_mut(&source) {
                source.dependents.remove(&dependent);
            }
        }
    }

    /// Removes a relation.
    ///
    /// The relation is detached from every entity and dependency set and its
    /// expiry timer is cancelled. Relations whose context read it are
    /// re-evaluated; the missing source reads as UNKNOWN.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` if the relation does not exist.
    pub fn remove_relation(&mut self, id: RelationId) -> LogosResult<Relation> {
        let removed = self.detach_relation(id)?;
        let seeds: Vec<RelationId> = removed.dependents.iter().copied().collect();
        self.cascade(seeds);
        Ok(removed)
    }

    /// Removes a relation without re-evaluating its dependents.
    pub(crate) fn detach_relation(&mut self, id: RelationId) -> LogosResult<Relation> {
        let removed = self
            .relations
            .remove(&id)
            .ok_or(MissingReference::Relation(id))?;
        self.relation_order.retain(|r| *r != id);
        for entity in self.entities.values_mut() {
            entity.detach(id);
        }
        for relation in self.relations.values_mut() {
            relation.dependents.remove(&id);
        }
        self.timers.remove(&id);
        debug!(relation = %id, "relation removed");
        Ok(removed)
    }

    #[must_use]
    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(&id)
    }

    pub(crate) fn relation_or_err(&self, id: RelationId) -> LogosResult<&Relation> {
        self.relations
            .get(&id)
            .ok_or_else(|| MissingReference::Relation(id).into())
    }

    pub(crate) fn relation_mut(&mut self, id: RelationId) -> LogosResult<&mut Relation> {
        self.relations
            .get_mut(&id)
            .ok_or_else(|| MissingReference::Relation(id).into())
    }

    /// Relations in assertion order.
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relation_order.iter().filter_map(|id| self.relations.get(id))
    }

    #[must_use]
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    /// Relations attached to `entity`, directly or by propagation, that are
    /// active now.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Entity` for an unknown entity.
    pub fn all_relations(&self, entity: EntityId) -> LogosResult<Vec<&Relation>> {
        self.all_relations_at(entity, Utc::now())
    }

    /// Relations attached to `entity` that are active at `moment`, in
    /// attachment order.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Entity` for an unknown entity.
    pub fn all_relations_at(
        &self,
        entity: EntityId,
        moment: DateTime<Utc>,
    ) -> LogosResult<Vec<&Relation>> {
        let entity = self.entity_or_err(entity)?;
        Ok(entity
            .relation_ids()
            .iter()
            .filter_map(|id| self.relations.get(id))
            .filter(|r| r.is_active_at(moment))
            .collect())
    }

    // ------------------------------------------------------------------
    // Temporal intervals
    // ------------------------------------------------------------------

    fn temporal_mut(&mut self, id: RelationId) -> LogosResult<&mut TemporalTruth> {
        self.relation_mut(id)?
            .temporal
            .as_mut()
            .ok_or_else(|| ValidationError::NotTemporal { relation: id }.into())
    }

    /// Stores `truth` for `interval` on a temporal relation and re-evaluates
    /// its dependents.
    ///
    /// # Errors
    ///
    /// - `MissingReference::Relation` for an unknown relation
    /// - `ValidationError::NotTemporal` if the relation is not temporal
    /// - `ValidationError::IntervalOverlap` if `interval` overlaps a stored
    ///   interval; nothing changes in that case
    pub fn add_interval(
        &mut self,
        id: RelationId,
        interval: TimeInterval,
        truth: TruthValue,
    ) -> LogosResult<()> {
        self.temporal_mut(id)?.add_interval(interval, truth)?;
        self.cascade_from(id);
        Ok(())
    }

    /// Removes an interval from a temporal relation.
    ///
    /// # Errors
    ///
    /// `MissingReference::Relation` or `ValidationError::NotTemporal`.
    pub fn remove_interval(
        &mut self,
        id: RelationId,
        interval: &TimeInterval,
    ) -> LogosResult<Option<TruthValue>> {
        let removed = self.temporal_mut(id)?.remove_interval(interval);
        if removed.is_some() {
            self.cascade_from(id);
        }
        Ok(removed)
    }

    /// Removes every interval from a temporal relation.
    ///
    /// # Errors
    ///
    /// `MissingReference::Relation` or `ValidationError::NotTemporal`.
    pub fn clear_intervals(&mut self, id: RelationId) -> LogosResult<()> {
        self.temporal_mut(id)?.clear_intervals();
        self.cascade_from(id);
        Ok(())
    }
}

/// `now + duration`, rejecting durations chrono cannot represent.
pub(crate) fn expiry_instant(
    now: DateTime<Utc>,
    duration: std::time::Duration,
) -> LogosResult<DateTime<Utc>> {
    let delta = chrono::Duration::from_std(duration).map_err(|e| {
        LogosError::from(ValidationError::DurationOutOfRange {
            reason: e.to_string(),
        })
    })?;
    now.checked_add_signed(delta).ok_or_else(|| {
        ValidationError::DurationOutOfRange {
            reason: format!("{duration:?} from {now} overflows"),
        }
        .into()
    })
}

impl fmt::Debug for Ontology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ontology")
            .field("entities", &self.entities.len())
            .field("predicates", &self.predicates.len())
            .field("relations", &self.relations.len())
            .field("quantified", &self.quantified.len())
            .field("implications", &self.implications.len())
            .field("pending_timers", &self.timers.len())
            .finish()
    }
}
