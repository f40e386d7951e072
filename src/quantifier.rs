//! Quantified relations.
//!
//! A quantified relation states a FORALL or EXISTS claim over a relation
//! template whose roles are either literal entities or variable
//! placeholders, e.g. `FORALL X: EATS(subject=DEX, object=$X) = FALSE`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{normalize_name, EntityId};
use crate::error::ValidationError;
use crate::predicate::normalize_role;
use crate::relation::{RelationBuilder, RelationType};
use crate::truth::{TruthState, TruthValue};

/// Unique identifier for a quantified relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuantifiedId(Uuid);

impl QuantifiedId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for QuantifiedId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QuantifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quantifier {
    Forall,
    Exists,
}

impl Quantifier {
    /// Stable numeric code used by the persisted form.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Forall => 1,
            Self::Exists => 2,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Forall),
            2 => Some(Self::Exists),
            _ => None,
        }
    }
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forall => write!(f, "FORALL"),
            Self::Exists => write!(f, "EXISTS"),
        }
    }
}

/// The value bound to a role of a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TemplateRole {
    Entity(EntityId),
    /// Upper-cased variable name, without the `$` sigil.
    Variable(String),
}

/// Normalizes a variable name: strips a leading `$` and upper-cases.
#[must_use]
pub fn normalize_variable(name: &str) -> String {
    normalize_name(name.trim().trim_start_matches('$'))
}

/// A predicate with roles bound to entities or variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RelationTemplate {
    pub predicate: String,
    pub roles: BTreeMap<String, TemplateRole>,
}

impl RelationTemplate {
    pub fn new(predicate: &str) -> Self {
        Self {
            predicate: normalize_name(predicate),
            roles: BTreeMap::new(),
        }
    }

    /// Binds a role to a literal entity.
    #[must_use]
    pub fn entity(mut self, role: &str, entity: EntityId) -> Self {
        self.roles.insert(normalize_role(role), TemplateRole::Entity(entity));
        self
    }

    /// Binds a role to a variable placeholder.
    #[must_use]
    pub fn variable(mut self, role: &str, variable: &str) -> Self {
        self.roles
            .insert(normalize_role(role), TemplateRole::Variable(normalize_variable(variable)));
        self
    }

    /// Variables referenced by the template, in role order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.roles.values().filter_map(|value| match value {
            TemplateRole::Variable(name) => Some(name.as_str()),
            TemplateRole::Entity(_) => None,
        })
    }

    /// Literal entities referenced by the template.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.roles.values().filter_map(|value| match value {
            TemplateRole::Entity(id) => Some(*id),
            TemplateRole::Variable(_) => None,
        })
    }
}

impl fmt::Display for RelationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles = self
            .roles
            .iter()
            .map(|(role, value)| match value {
                TemplateRole::Entity(id) => format!("{role}={id}"),
                TemplateRole::Variable(name) => format!("{role}=${name}"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({roles})", self.predicate)
    }
}

/// A FORALL or EXISTS statement over a relation template.
///
/// Equality and hashing are structural: two quantified relations are equal
/// when quantifier, variable sequence and template match, whatever their id
/// or truth value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantifiedRelation {
    pub id: QuantifiedId,
    pub quantifier: Quantifier,
    pub variables: Vec<String>,
    pub template: RelationTemplate,
    pub truth_value: TruthValue,
}

impl QuantifiedRelation {
    /// Creates a quantified relation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyName` for a blank variable and
    /// `ValidationError::UndeclaredVariable` if the template uses a variable
    /// that is not declared.
    pub fn new<S: AsRef<str>>(
        quantifier: Quantifier,
        variables: &[S],
        template: RelationTemplate,
        truth_value: TruthValue,
    ) -> Result<Self, ValidationError> {
        let mut declared = Vec::with_capacity(variables.len());
        for variable in variables {
            let variable = normalize_variable(variable.as_ref());
            if variable.is_empty() {
                return Err(ValidationError::EmptyName { field: "variable name" });
            }
            if !declared.contains(&variable) {
                declared.push(variable);
            }
        }
        if let Some(undeclared) = template.variables().find(|v| !declared.iter().any(|d| d == v)) {
            return Err(ValidationError::UndeclaredVariable {
                variable: undeclared.to_string(),
            });
        }
        Ok(Self {
            id: QuantifiedId::new(),
            quantifier,
            variables: declared,
            template,
            truth_value,
        })
    }

    /// Substitutes bound entities for the template's variables.
    ///
    /// Binding names are matched case-insensitively, with or without `$`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnboundVariable` if a variable used by the
    /// template has no binding.
    pub fn instantiate(
        &self,
        bindings: &HashMap<String, EntityId>,
    ) -> Result<RelationBuilder, ValidationError> {
        let bound: HashMap<String, EntityId> = bindings
            .iter()
            .map(|(name, id)| (normalize_variable(name), *id))
            .collect();

        let mut builder = RelationBuilder::new(self.template.predicate.clone())
            .relation_type(RelationType::General)
            .truth(self.instance_truth());
        for (role, value) in &self.template.roles {
            let entity = match value {
                TemplateRole::Entity(id) => *id,
                TemplateRole::Variable(name) => {
                    *bound.get(name).ok_or_else(|| ValidationError::UnboundVariable {
                        variable: name.clone(),
                    })?
                }
            };
            builder = builder.role(role, entity);
        }
        Ok(builder)
    }

    /// Truth carried by an instance: only a true universal statement fixes
    /// the instance as TRUE.
    #[must_use]
    pub fn instance_truth(&self) -> TruthValue {
        if self.quantifier == Quantifier::Forall && self.truth_value.evaluate() == TruthState::True {
            TruthValue::TRUE
        } else {
            TruthValue::UNKNOWN
        }
    }
}

impl PartialEq for QuantifiedRelation {
    fn eq(&self, other: &Self) -> bool {
        self.quantifier == other.quantifier
            && self.variables == other.variables
            && self.template == other.template
    }
}

impl Eq for QuantifiedRelation {}

impl Hash for QuantifiedRelation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.quantifier.hash(state);
        self.variables.hash(state);
        self.template.hash(state);
    }
}

impl fmt::Display for QuantifiedRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} = {}",
            self.quantifier,
            self.variables.join(", "),
            self.template,
            self.truth_value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn entity(name: &str) -> EntityId {
        EntityId::derive::<&str>(name, "NOUN", &[])
    }

    fn eats_template() -> RelationTemplate {
        RelationTemplate::new("eats")
            .entity("subject", entity("DEX"))
            .variable("object", "$x")
    }

    fn hash_of(q: &QuantifiedRelation) -> u64 {
        let mut hasher = DefaultHasher::new();
        q.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_template_normalizes() {
        let template = eats_template();
        assert_eq!(template.predicate, "EATS");
        assert_eq!(
            template.roles.get("object"),
            Some(&TemplateRole::Variable("X".to_string()))
        );
        assert_eq!(template.variables().collect::<Vec<_>>(), vec!["X"]);
        assert_eq!(template.entities().collect::<Vec<_>>(), vec![entity("DEX")]);
    }

    #[test]
    fn test_undeclared_variable_rejected() {
        let err = QuantifiedRelation::new(Quantifier::Forall, &["Y"], eats_template(), TruthValue::FALSE);
        assert!(matches!(err, Err(ValidationError::UndeclaredVariable { variable }) if variable == "X"));
    }

    #[test]
    fn test_instantiate_substitutes() {
        let q = QuantifiedRelation::new(Quantifier::Forall, &["x"], eats_template(), TruthValue::TRUE).unwrap();
        let food = entity("FOOD");
        let bindings = HashMap::from([("$X".to_string(), food)]);

        let builder = q.instantiate(&bindings).unwrap();
        assert_eq!(builder.predicate, "EATS");
        assert_eq!(builder.roles.get("subject"), Some(&entity("DEX")));
        assert_eq!(builder.roles.get("object"), Some(&food));
        assert_eq!(builder.truth, TruthValue::TRUE);
    }

    #[test]
    fn test_instantiate_unbound() {
        let q = QuantifiedRelation::new(Quantifier::Exists, &["X"], eats_template(), TruthValue::TRUE).unwrap();
        let err = q.instantiate(&HashMap::new());
        assert!(matches!(err, Err(ValidationError::UnboundVariable { variable }) if variable == "X"));
    }

    #[test]
    fn test_instance_truth() {
        let forall_true = QuantifiedRelation::new(Quantifier::Forall, &["X"], eats_template(), TruthValue::TRUE).unwrap();
        let forall_false = QuantifiedRelation::new(Quantifier::Forall, &["X"], eats_template(), TruthValue::FALSE).unwrap();
        let exists_true = QuantifiedRelation::new(Quantifier::Exists, &["X"], eats_template(), TruthValue::TRUE).unwrap();

        assert_eq!(forall_true.instance_truth(), TruthValue::TRUE);
        assert_eq!(forall_false.instance_truth(), TruthValue::UNKNOWN);
        assert_eq!(exists_true.instance_truth(), TruthValue::UNKNOWN);
    }

    #[test]
    fn test_structural_equality() {
        let a = QuantifiedRelation::new(Quantifier::Forall, &["X"], eats_template(), TruthValue::TRUE).unwrap();
        let b = QuantifiedRelation::new(Quantifier::Forall, &["x"], eats_template(), TruthValue::FALSE).unwrap();
        let c = QuantifiedRelation::new(Quantifier::Exists, &["X"], eats_template(), TruthValue::TRUE).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn test_quantifier_codes() {
        assert_eq!(Quantifier::from_code(Quantifier::Exists.code()), Some(Quantifier::Exists));
        assert_eq!(Quantifier::from_code(9), None);
    }

    #[test]
    fn test_display() {
        let q = QuantifiedRelation::new(Quantifier::Forall, &["X"], eats_template(), TruthValue::FALSE).unwrap();
        let shown = q.to_string();
        assert!(shown.starts_with("FORALL X: EATS("));
        assert!(shown.contains("object=$X"));
        assert!(shown.ends_with("= FALSE"));
    }
}
