//! Hierarchy walks, relation propagation and truth maintenance.
//!
//! Two mechanisms keep derived state in step with the facts:
//!
//! - *Propagation* attaches a relation to every registered descendant of
//!   its role entities, so an entity's relation list includes what it
//!   inherits.
//! - *Truth maintenance* keeps the cached truth of context-governed
//!   relations current. Evaluation itself is pull-based and never reads a
//!   cache; the cache is refreshed by pushing changes along `dependents`
//!   ([`Ontology::cascade`]) or by a full pull pass
//!   ([`Ontology::refresh_context_relations`]).
//!
//! The context graph is kept acyclic: a new relation cannot be the source
//! of an existing context, and [`Ontology::set_context`] rejects an edge
//! that would close a cycle.

use std::collections::{BTreeSet, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info, trace};

use super::Ontology;
use crate::entity::EntityId;
use crate::error::{LogosResult, ValidationError};
use crate::relation::{Context, Relation, RelationId, TruthResolver};
use crate::truth::{TruthState, TruthValue};

/// Resolves relation truth at a fixed moment.
struct AtMoment<'a> {
    ontology: &'a Ontology,
    moment: DateTime<Utc>,
}

impl TruthResolver for AtMoment<'_> {
    fn resolve_relation(&self, relation: RelationId) -> TruthValue {
        self.ontology.truth_at(relation, self.moment)
    }
}

/// Resolves relation truth as of now, so a [`RelationContext`] can be
/// evaluated directly against the ontology.
///
/// [`RelationContext`]: crate::RelationContext
impl TruthResolver for Ontology {
    fn resolve_relation(&self, relation: RelationId) -> TruthValue {
        self.truth_at(relation, Utc::now())
    }
}

impl Ontology {
    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// Depth-first ancestor walk; each ancestor is visited once however many
    /// paths reach it.
    pub(crate) fn ancestors_of(&self, entity: EntityId) -> Vec<EntityId> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::from([entity]);
        let mut stack: Vec<EntityId> = self
            .entities
            .get(&entity)
            .map(|e| e.parents.iter().rev().copied().collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            ancestors.push(current);
            if let Some(e) = self.entities.get(&current) {
                stack.extend(e.parents.iter().rev().copied());
            }
        }
        ancestors
    }

    /// Every ancestor of `entity`, without duplicates, in depth-first order.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Entity` for an unknown entity.
    pub fn all_ancestors(&self, entity: EntityId) -> LogosResult<Vec<EntityId>> {
        self.entity_or_err(entity)?;
        Ok(self.ancestors_of(entity))
    }

    /// Every registered entity that has `entity` as an ancestor.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Entity` for an unknown entity.
    pub fn descendants(&self, entity: EntityId) -> LogosResult<Vec<EntityId>> {
        self.entity_or_err(entity)?;
        Ok(self
            .entity_order
            .iter()
            .copied()
            .filter(|e| self.ancestors_of(*e).contains(&entity))
            .collect())
    }

    #[must_use]
    pub fn is_descendant_of(&self, entity: EntityId, ancestor: EntityId) -> bool {
        self.ancestors_of(entity).contains(&ancestor)
    }

    /// Renders `entity` and its ancestors as an indented tree.
    ///
    /// A shared ancestor is printed once, under the first path that reaches it.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Entity` for an unknown entity.
    pub fn describe_hierarchy(&self, entity: EntityId, show_description: bool) -> LogosResult<String> {
        self.entity_or_err(entity)?;
        let mut out = String::new();
        let mut visited = HashSet::new();
        self.describe_into(entity, 0, show_description, &mut visited, &mut out);
        Ok(out)
    }

    fn describe_into(
        &self,
        id: EntityId,
        depth: usize,
        show_description: bool,
        visited: &mut HashSet<EntityId>,
        out: &mut String,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        out.push_str(&"  ".repeat(depth));
        out.push_str(&entity.to_string());
        if show_description {
            if let Some(description) = &entity.description {
                out.push_str(" - ");
                out.push_str(description);
            }
        }
        out.push('\n');
        for parent in &entity.parents {
            self.describe_into(*parent, depth + 1, show_description, visited, out);
        }
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Attaches `relation` to every registered descendant of its role
    /// entities. Returns the number of new attachments.
    pub(crate) fn propagate(&mut self, relation: RelationId) -> usize {
        let Some(participants) = self.relations.get(&relation).map(Relation::participants) else {
            return 0;
        };
        if participants.is_empty() {
            return 0;
        }

        let targets: Vec<EntityId> = self
            .entity_order
            .iter()
            .copied()
            .filter(|e| !participants.contains(e))
            .filter(|e| self.ancestors_of(*e).iter().any(|a| participants.contains(a)))
            .collect();

        let mut attached = 0;
        for id in targets {
            if let Some(entity) = self.entities.get_mut(&id) {
                if entity.attach(relation) {
                    trace!(relation = %relation, entity = %entity.name, "relation propagated");
                    attached += 1;
                }
            }
        }
        attached
    }

    /// Re-runs propagation for one relation.
    ///
    /// Propagation is a point-in-time snapshot of the hierarchy; this picks
    /// up descendants registered since the relation was asserted.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` for an unknown relation.
    pub fn propagate_to_descendants(&mut self, relation: RelationId) -> LogosResult<usize> {
        self.relation_or_err(relation)?;
        Ok(self.propagate(relation))
    }

    /// Attaches to `entity` every relation asserted about one of its
    /// ancestors.
    pub(crate) fn inherit_relations(&mut self, entity: EntityId) -> usize {
        let ancestors: BTreeSet<EntityId> = self.ancestors_of(entity).into_iter().collect();
        if ancestors.is_empty() {
            return 0;
        }
        let inherited: Vec<RelationId> = self
            .relations()
            .filter(|r| r.roles.values().any(|p| ancestors.contains(p)))
            .map(|r| r.id)
            .collect();

        let Some(target) = self.entities.get_mut(&entity) else {
            return 0;
        };
        let attached = inherited.into_iter().filter(|id| target.attach(*id)).count();
        if attached > 0 {
            trace!(entity = %target.name, attached, "inherited relations");
        }
        attached
    }

    /// Re-runs propagation for every relation. Returns the number of new
    /// attachments.
    pub fn repropagate_all(&mut self) -> usize {
        let ids = self.relation_order.clone();
        let attached: usize = ids.into_iter().map(|id| self.propagate(id)).sum();
        debug!(attached, "repropagated all relations");
        attached
    }

    // ------------------------------------------------------------------
    // Truth evaluation (pull)
    // ------------------------------------------------------------------

    /// Truth of a relation at `moment`, resolved through its context.
    ///
    /// - unknown relation: UNKNOWN
    /// - deactivated or expired: FALSE
    /// - relation context: the source's truth at `moment`
    /// - expression context: the expression evaluated at `moment`
    /// - callback context: the callback's answer
    /// - literal context: the literal
    /// - no context: the stored value, or the interval truth of a temporal
    ///   relation
    ///
    /// Never reads a cached derived value. Callbacks run while the ontology
    /// is borrowed, so a callback must not try to lock a [`SharedOntology`]
    /// holding it.
    ///
    /// [`SharedOntology`]: super::SharedOntology
    #[must_use]
    pub fn truth_at(&self, relation: RelationId, moment: DateTime<Utc>) -> TruthValue {
        let Some(relation) = self.relations.get(&relation) else {
            return TruthValue::UNKNOWN;
        };
        if !relation.active || relation.has_expired(moment) {
            return TruthValue::FALSE;
        }
        self.evaluate_context(relation, moment)
    }

    /// Resolves a relation's context, or its stored truth when it has none.
    pub(crate) fn evaluate_context(&self, relation: &Relation, moment: DateTime<Utc>) -> TruthValue {
        match &relation.context {
            Some(Context::Relation(source)) => self.truth_at(*source, moment),
            Some(Context::Expression(expr)) => expr.evaluate(&AtMoment {
                ontology: self,
                moment,
            }),
            Some(Context::Callback(callback)) => TruthValue::from_state(callback.call()),
            Some(Context::Literal(value)) => TruthValue::from(*value),
            None => relation.stored_truth_at(moment),
        }
    }

    /// Current truth of a relation.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` for an unknown relation.
    pub fn resolve_truth(&self, relation: RelationId) -> LogosResult<TruthValue> {
        self.relation_or_err(relation)?;
        Ok(self.truth_at(relation, Utc::now()))
    }

    /// Current truth state of a relation, without sampling.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` for an unknown relation.
    pub fn evaluate_truth(&self, relation: RelationId) -> LogosResult<TruthState> {
        self.resolve_truth(relation).map(|tv| tv.evaluate())
    }

    /// Current truth state with SUPERPOSITION collapsed by a draw. Nothing
    /// stored changes.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` for an unknown relation.
    pub fn sample_truth<R: Rng + ?Sized>(&self, relation: RelationId, rng: &mut R) -> LogosResult<TruthState> {
        self.resolve_truth(relation).map(|tv| tv.sample(rng))
    }

    /// Collapses a SUPERPOSITION relation by a draw and stores the outcome
    /// where evaluation reads it: the stored value, or for a temporal
    /// relation the truth of the interval covering now. Other states are
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// - `MissingReference::Relation` for an unknown relation
    /// - `ValidationError::DerivedTruth` if the SUPERPOSITION comes from the
    ///   relation's context; collapse the source relation instead
    pub fn collapse_truth<R: Rng + ?Sized>(&mut self, relation: RelationId, rng: &mut R) -> LogosResult<TruthState> {
        let now = Utc::now();
        if self.relation_or_err(relation)?.context.is_some() {
            let current = self.truth_at(relation, now);
            if current.evaluate() == TruthState::Superposition {
                return Err(ValidationError::DerivedTruth { relation }.into());
            }
            return Ok(current.evaluate());
        }

        let mut current = self.truth_at(relation, now);
        if current.evaluate() != TruthState::Superposition {
            return Ok(current.evaluate());
        }
        let drawn = current.collapse(rng);

        let target = self.relation_mut(relation)?;
        match target.temporal.as_mut() {
            Some(temporal) => {
                temporal.set_truth_at(now, current);
            }
            None => target.truth_value = current,
        }
        let seeds: Vec<RelationId> = target.dependents.iter().copied().collect();
        debug!(relation = %relation, %drawn, "superposition collapsed");
        self.cascade(seeds);
        Ok(drawn)
    }

    // ------------------------------------------------------------------
    // Truth maintenance (push)
    // ------------------------------------------------------------------

    /// Recomputes the cached truth of context-governed relations, starting
    /// from `seeds` and following `dependents` from every relation whose
    /// cache changed. Each relation is visited at most once per pass.
    /// Returns the number of caches updated.
    pub(crate) fn cascade(&mut self, seeds: Vec<RelationId>) -> usize {
        let now = Utc::now();
        let mut queue: VecDeque<RelationId> = seeds.into();
        let mut visited = HashSet::new();
        let mut updated = 0;

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            match self.relations.get(&id) {
                Some(relation) if relation.context.is_some() => {}
                _ => continue,
            }
            let fresh = self.truth_at(id, now);
            let Some(relation) = self.relations.get_mut(&id) else {
                continue;
            };
            if relation.truth_value == fresh {
                continue;
            }
            trace!(relation = %id, from = %relation.truth_value, to = %fresh, "cached truth updated");
            relation.truth_value = fresh;
            updated += 1;
            queue.extend(relation.dependents.iter().copied());
        }
        updated
    }

    /// Cascade seeded with a relation and its dependents, for changes that
    /// affect how the relation itself evaluates.
    pub(crate) fn cascade_from(&mut self, relation: RelationId) -> usize {
        let mut seeds = vec![relation];
        if let Some(r) = self.relations.get(&relation) {
            seeds.extend(r.dependents.iter().copied());
        }
        self.cascade(seeds)
    }

    /// Recomputes a relation's cached truth from its context and pushes any
    /// change to its dependents. Returns true if the relation's cache changed.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` for an unknown relation.
    pub fn update_from_context(&mut self, relation: RelationId) -> LogosResult<bool> {
        let before = *self.relation_or_err(relation)?.truth_value();
        self.cascade(vec![relation]);
        Ok(self
            .relations
            .get(&relation)
            .is_some_and(|r| r.truth_value != before))
    }

    /// Stores a truth value and re-evaluates the relation's dependents if it
    /// changed. Returns true if it changed.
    ///
    /// On a temporal relation this sets the default truth. On a relation
    /// governed by a context it overrides the cached value until the next
    /// re-evaluation.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` for an unknown relation.
    pub fn set_truth_value(&mut self, relation: RelationId, truth: TruthValue) -> LogosResult<bool> {
        let target = self.relation_mut(relation)?;
        let slot = match target.temporal.as_mut() {
            Some(temporal) => &mut temporal.default_truth,
            None => &mut target.truth_value,
        };
        if *slot == truth {
            return Ok(false);
        }
        *slot = truth;
        let seeds: Vec<RelationId> = target.dependents.iter().copied().collect();
        debug!(relation = %relation, %truth, "truth value set");
        self.cascade(seeds);
        Ok(true)
    }

    /// Marks a relation active again. Returns true if it was inactive.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` for an unknown relation.
    pub fn activate(&mut self, relation: RelationId) -> LogosResult<bool> {
        self.set_active(relation, true)
    }

    /// Marks a relation inactive; it evaluates to FALSE until reactivated.
    /// Returns true if it was active.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` for an unknown relation.
    pub fn deactivate(&mut self, relation: RelationId) -> LogosResult<bool> {
        self.set_active(relation, false)
    }

    fn set_active(&mut self, relation: RelationId, active: bool) -> LogosResult<bool> {
        let target = self.relation_mut(relation)?;
        if target.active == active {
            return Ok(false);
        }
        target.active = active;
        debug!(relation = %relation, active, "relation activity changed");
        self.cascade_from(relation);
        Ok(true)
    }

    /// Replaces the context governing a relation.
    ///
    /// # Errors
    ///
    /// - `MissingReference::Relation` for an unknown relation or context source
    /// - `ValidationError::ContextCycle` if the new context reads, directly
    ///   or through other contexts, the relation itself
    pub fn set_context(&mut self, relation: RelationId, context: Option<Context>) -> LogosResult<()> {
        self.relation_or_err(relation)?;
        if let Some(context) = &context {
            self.validate_context(context)?;
            if self.reaches(context, relation) {
                return Err(ValidationError::ContextCycle { relation }.into());
            }
        }

        let target = self.relation_mut(relation)?;
        let previous = std::mem::replace(&mut target.context, context.clone());
        if let Some(previous) = &previous {
            self.unlink_dependents(relation, previous);
        }
        if let Some(context) = &context {
            self.link_dependents(relation, context);
        }
        debug!(relation = %relation, "context replaced");
        self.cascade_from(relation);
        Ok(())
    }

    /// Returns true if `target` is read by `context`, directly or through
    /// the contexts of the relations it reads.
    fn reaches(&self, context: &Context, target: RelationId) -> bool {
        let mut stack = context.relations();
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(Relation {
                context: Some(next), ..
            }) = self.relations.get(&current)
            {
                stack.extend(next.relations());
            }
        }
        false
    }

    /// First relation found on a context cycle, if any.
    pub(crate) fn find_context_cycle(&self) -> Option<RelationId> {
        self.relations().find_map(|r| {
            r.context
                .as_ref()
                .filter(|context| self.reaches(context, r.id))
                .map(|_| r.id)
        })
    }

    /// Pull pass over every context-governed relation: the sources of a
    /// context are brought up to date before the relation reading them.
    /// Returns the number of caches updated.
    pub fn refresh_context_relations(&mut self) -> usize {
        let now = Utc::now();
        let mut visited = HashSet::new();
        let ids = self.relation_order.clone();
        let updated = ids
            .into_iter()
            .map(|id| self.refresh_one(id, now, &mut visited))
            .sum();
        debug!(updated, "context relations refreshed");
        updated
    }

    fn refresh_one(
        &mut self,
        id: RelationId,
        now: DateTime<Utc>,
        visited: &mut HashSet<RelationId>,
    ) -> usize {
        if !visited.insert(id) {
            return 0;
        }
        let Some(sources) = self
            .relations
            .get(&id)
            .and_then(|r| r.context.as_ref())
            .map(Context::relations)
        else {
            return 0;
        };

        let mut updated: usize = sources
            .into_iter()
            .map(|source| self.refresh_one(source, now, visited))
            .sum();

        let fresh = self.truth_at(id, now);
        if let Some(relation) = self.relations.get_mut(&id) {
            if relation.truth_value != fresh {
                relation.truth_value = fresh;
                updated += 1;
            }
        }
        updated
    }

    /// Removes every non-temporal relation that is not active at `now`:
    /// expired temporary relations and deactivated ones. Temporal relations
    /// are governed by their intervals and never swept.
    ///
    /// Returns the removed ids. Relations whose context read a removed
    /// relation are re-evaluated.
    pub fn expire_temporary_relations(&mut self, now: DateTime<Utc>) -> Vec<RelationId> {
        let expired: Vec<RelationId> = self
            .relations()
            .filter(|r| !r.is_temporal() && !r.is_active_at(now))
            .map(|r| r.id)
            .collect();

        let mut seeds = Vec::new();
        for id in &expired {
            if let Ok(removed) = self.detach_relation(*id) {
                seeds.extend(removed.dependents);
            }
        }
        self.cascade(seeds);

        if !expired.is_empty() {
            info!(count = expired.len(), "expired relations removed");
        }
        expired
    }
}
