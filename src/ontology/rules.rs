//! Quantified relations, implications and inverse predicates.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::Ontology;
use crate::entity::{normalize_name, EntityId};
use crate::error::{LogosResult, MissingReference, ValidationError};
use crate::implication::{Implication, ImplicationId};
use crate::predicate::{normalize_role, Predicate};
use crate::quantifier::{QuantifiedId, QuantifiedRelation, Quantifier, RelationTemplate};
use crate::relation::{Context, RelationBuilder, RelationId};
use crate::truth::TruthValue;

impl Ontology {
    // ------------------------------------------------------------------
    // Quantified relations
    // ------------------------------------------------------------------

    /// Registers a FORALL or EXISTS statement.
    ///
    /// A structurally identical statement is not stored twice; the existing
    /// id is returned.
    ///
    /// # Errors
    ///
    /// - `ValidationError::UndeclaredVariable` if the template uses an
    ///   undeclared variable
    /// - `MissingReference` for an unknown predicate or literal entity
    /// - `ValidationError::UndeclaredRole` for a role the predicate does not
    ///   declare
    pub fn add_quantified_relation<S: AsRef<str>>(
        &mut self,
        quantifier: Quantifier,
        variables: &[S],
        template: RelationTemplate,
        truth: TruthValue,
    ) -> LogosResult<QuantifiedId> {
        let quantified = QuantifiedRelation::new(quantifier, variables, template, truth)?;
        self.validate_quantified(&quantified)?;

        if let Some(existing) = self.quantified_relations().find(|q| **q == quantified) {
            debug!(quantified = %existing.id, "quantified relation already registered");
            return Ok(existing.id);
        }
        let id = quantified.id;
        debug!(quantified = %id, statement = %quantified, "quantified relation registered");
        self.quantified.insert(id, quantified);
        self.quantified_order.push(id);
        Ok(id)
    }

    pub(crate) fn validate_quantified(&self, quantified: &QuantifiedRelation) -> LogosResult<()> {
        let predicate = self.predicate_or_err(&quantified.template.predicate)?;
        for role in quantified.template.roles.keys() {
            if !predicate.accepts_role(role) {
                return Err(ValidationError::UndeclaredRole {
                    predicate: predicate.name.clone(),
                    role: role.clone(),
                }
                .into());
            }
        }
        for entity in quantified.template.entities() {
            self.entity_or_err(entity)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn quantified_relation(&self, id: QuantifiedId) -> Option<&QuantifiedRelation> {
        self.quantified.get(&id)
    }

    /// Quantified relations in registration order.
    pub fn quantified_relations(&self) -> impl Iterator<Item = &QuantifiedRelation> {
        self.quantified_order.iter().filter_map(|id| self.quantified.get(id))
    }

    /// Instantiates a quantified relation with `bindings` and asserts the
    /// result.
    ///
    /// The instance is TRUE when the statement is a true FORALL and UNKNOWN
    /// otherwise; an EXISTS claim says nothing about a particular binding.
    ///
    /// # Errors
    ///
    /// - `MissingReference::Quantified` for an unknown statement
    /// - `ValidationError::UnboundVariable` for a missing binding
    /// - the errors of [`Ontology::add_relation`]
    pub fn instantiate_quantified(
        &mut self,
        id: QuantifiedId,
        bindings: &HashMap<String, EntityId>,
    ) -> LogosResult<RelationId> {
        let quantified = self
            .quantified
            .get(&id)
            .ok_or(MissingReference::Quantified(id))?;
        let builder = quantified.instantiate(bindings)?;
        self.add_relation(builder)
    }

    // ------------------------------------------------------------------
    // Implications
    // ------------------------------------------------------------------

    /// Registers `antecedent → consequent` with its own truth value.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Relation` if either relation is unknown.
    pub fn add_implication(
        &mut self,
        antecedent: RelationId,
        consequent: RelationId,
        truth: TruthValue,
    ) -> LogosResult<ImplicationId> {
        self.relation_or_err(antecedent)?;
        self.relation_or_err(consequent)?;
        let implication = Implication::new(antecedent, consequent, truth);
        let id = implication.id;
        debug!(implication = %id, %antecedent, %consequent, "implication registered");
        self.implications.insert(id, implication);
        self.implication_order.push(id);
        Ok(id)
    }

    #[must_use]
    pub fn implication(&self, id: ImplicationId) -> Option<&Implication> {
        self.implications.get(&id)
    }

    /// Implications in registration order.
    pub fn implications(&self) -> impl Iterator<Item = &Implication> {
        self.implication_order
            .iter()
            .filter_map(|id| self.implications.get(id))
    }

    /// Infers the consequent's truth from the current state of the
    /// antecedent and consequent.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference::Implication` for an unknown implication
    /// and `MissingReference::Relation` if a side has been removed.
    pub fn infer_consequent(&self, id: ImplicationId) -> LogosResult<TruthValue> {
        let implication = self
            .implications
            .get(&id)
            .ok_or(MissingReference::Implication(id))?;
        let antecedent = self.resolve_truth(implication.antecedent)?;
        let consequent = self.resolve_truth(implication.consequent)?;
        Ok(implication.infer_consequent(&antecedent, &consequent))
    }

    // ------------------------------------------------------------------
    // Inverse predicates
    // ------------------------------------------------------------------

    /// Registers `inverse` as the inverse of `original`.
    ///
    /// `role_mapping` maps roles of the original to roles of the inverse;
    /// unmapped roles keep their name. The inverse declares the mapped roles
    /// of the original, or no roles if the original declares none.
    ///
    /// # Errors
    ///
    /// - `MissingReference::Predicate` for an unknown original
    /// - `ValidationError::InvalidRoleMapping` if a mapping key is not a
    ///   declared role of the original, or a target is blank
    /// - `ValidationError::RoleCollision` if two declared roles map to the
    ///   same inverse role
    /// - `ValidationError::DuplicateIdentifier` if `inverse` exists
    pub fn add_inverse_predicate(
        &mut self,
        original: &str,
        inverse: &str,
        role_mapping: &[(&str, &str)],
    ) -> LogosResult<&Predicate> {
        let source = self.predicate_or_err(original)?;
        let original_name = source.name.clone();

        let mut mapping = BTreeMap::new();
        for (from, to) in role_mapping {
            let from = normalize_role(from);
            let to = normalize_role(to);
            if (!source.roles.is_empty() && !source.roles.contains(&from)) || to.is_empty() {
                return Err(ValidationError::InvalidRoleMapping {
                    predicate: original_name,
                    role: from,
                }
                .into());
            }
            mapping.insert(from, to);
        }

        let mut roles: Vec<String> = Vec::with_capacity(source.roles.len());
        for role in &source.roles {
            let mapped = mapping.get(role).unwrap_or(role);
            if roles.contains(mapped) {
                return Err(ValidationError::RoleCollision {
                    predicate: normalize_name(inverse),
                    role: mapped.clone(),
                }
                .into());
            }
            roles.push(mapped.clone());
        }
        let mut predicate = Predicate::new(inverse, &roles)?;
        predicate.inverse_of = Some(original_name.clone());
        predicate.role_mapping = mapping;

        if self.predicates.contains_key(&predicate.name) {
            return Err(ValidationError::DuplicateIdentifier {
                kind: "predicate",
                key: predicate.name,
            }
            .into());
        }
        let inverse_name = predicate.name.clone();
        if let Some(source) = self.predicates.get_mut(&original_name) {
            source.inverses.push(inverse_name);
        }
        self.insert_predicate(predicate)
    }

    /// Asserts the inverse of a relation under every inverse of its
    /// predicate. Each inverse relation has the source as its context, so
    /// its truth follows the source.
    ///
    /// Every inverse is checked before any is asserted.
    ///
    /// # Errors
    ///
    /// - `MissingReference::Relation` for an unknown relation
    /// - `ValidationError::RoleCollision` if two roles of the relation map
    ///   to the same role of an inverse
    /// - `ValidationError::UndeclaredRole` if a mapped role is not declared
    ///   by the inverse
    pub fn assert_inverses(&mut self, relation: RelationId) -> LogosResult<Vec<RelationId>> {
        let source = self.relation_or_err(relation)?;
        let predicate = self.predicate_or_err(&source.predicate)?;

        let mut builders = Vec::with_capacity(predicate.inverses.len());
        for inverse_name in &predicate.inverses {
            let Some(inverse) = self.predicates.get(&normalize_name(inverse_name)) else {
                continue;
            };
            let mut roles: BTreeMap<String, EntityId> = BTreeMap::new();
            for (role, entity) in &source.roles {
                let mapped = normalize_role(inverse.map_role(role));
                if roles.insert(mapped.clone(), *entity).is_some() {
                    return Err(ValidationError::RoleCollision {
                        predicate: inverse.name.clone(),
                        role: mapped,
                    }
                    .into());
                }
            }
            let builder = roles.into_iter().fold(
                RelationBuilder::new(inverse.name.clone())
                    .relation_type(source.relation_type.clone())
                    .context(Context::Relation(relation)),
                |builder, (role, entity)| builder.role(&role, entity),
            );
            self.validate_relation(&builder)?;
            builders.push(builder);
        }

        builders
            .into_iter()
            .map(|builder| self.add_relation(builder))
            .collect()
    }
}
