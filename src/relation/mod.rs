//! Relations: n-ary facts over entities.
//!
//! A relation binds role names to entities under a predicate and carries a
//! truth value. Its validity may instead be governed by a [`Context`]:
//! another relation, a boolean expression over relations, a callback or a
//! literal. Temporal relations replace the single truth value with a map
//! from time intervals to truth values.

pub mod context;
pub mod temporal;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityId;
use crate::predicate::normalize_role;
use crate::truth::{TruthState, TruthValue};

pub use context::{LogicOp, RelationContext, TruthResolver};
pub use temporal::{IntervalTruth, TemporalTruth};

/// Unique relation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(Uuid);

impl RelationId {
    /// Creates a new random relation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a relation ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for RelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical category of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    #[default]
    General,
    Permanent,
    Contextual,
    Temporary,
    Temporal,
    /// Any other tag, stored upper-cased.
    Custom(String),
}

impl FromStr for RelationType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_uppercase();
        Ok(match tag.as_str() {
            "GENERAL" | "" => Self::General,
            "PERMANENT" => Self::Permanent,
            "CONTEXTUAL" => Self::Contextual,
            "TEMPORARY" => Self::Temporary,
            "TEMPORAL" => Self::Temporal,
            _ => Self::Custom(tag),
        })
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => write!(f, "GENERAL"),
            Self::Permanent => write!(f, "PERMANENT"),
            Self::Contextual => write!(f, "CONTEXTUAL"),
            Self::Temporary => write!(f, "TEMPORARY"),
            Self::Temporal => write!(f, "TEMPORAL"),
            Self::Custom(tag) => write!(f, "{tag}"),
        }
    }
}

type TruthFn = dyn Fn() -> TruthState + Send + Sync;

/// A zero-argument truth-producing callback.
///
/// Two callbacks are equal only if they share the same allocation.
#[derive(Clone)]
pub struct TruthCallback(Arc<TruthFn>);

impl TruthCallback {
    pub fn new(f: impl Fn() -> TruthState + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn call(&self) -> TruthState {
        (self.0)()
    }
}

impl PartialEq for TruthCallback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TruthCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TruthCallback(..)")
    }
}

/// What governs a relation's validity.
#[derive(Debug, Clone, PartialEq)]
pub enum Context {
    /// Holds exactly when another relation holds.
    Relation(RelationId),
    /// A boolean expression over relations.
    Expression(RelationContext),
    /// An arbitrary callback.
    Callback(TruthCallback),
    /// A fixed boolean.
    Literal(bool),
}

impl Context {
    /// Every relation this context reads, without duplicates.
    #[must_use]
    pub fn relations(&self) -> Vec<RelationId> {
        match self {
            Self::Relation(id) => vec![*id],
            Self::Expression(expr) => expr.relations(),
            Self::Callback(_) | Self::Literal(_) => Vec::new(),
        }
    }
}

impl From<RelationId> for Context {
    fn from(id: RelationId) -> Self {
        Self::Relation(id)
    }
}

impl From<RelationContext> for Context {
    fn from(expr: RelationContext) -> Self {
        Self::Expression(expr)
    }
}

impl From<TruthCallback> for Context {
    fn from(callback: TruthCallback) -> Self {
        Self::Callback(callback)
    }
}

impl From<bool> for Context {
    fn from(value: bool) -> Self {
        Self::Literal(value)
    }
}

/// An asserted fact.
#[derive(Debug, Clone)]
pub struct Relation {
    pub id: RelationId,

    /// Upper-cased predicate name.
    pub predicate: String,

    /// Role name to participant.
    pub roles: BTreeMap<String, EntityId>,

    pub relation_type: RelationType,

    pub context: Option<Context>,

    /// Interval truth map; present only on temporal relations.
    pub temporal: Option<TemporalTruth>,

    /// Cleared by deactivation or expiry.
    pub active: bool,

    /// End of life for temporary relations.
    pub expires_at: Option<DateTime<Utc>>,

    /// Stored truth, or the last value derived from the context.
    pub(crate) truth_value: TruthValue,

    /// Relations whose context reads this one.
    pub(crate) dependents: BTreeSet<RelationId>,
}

impl Relation {
    pub(crate) fn new(
        predicate: String,
        roles: BTreeMap<String, EntityId>,
        relation_type: RelationType,
        context: Option<Context>,
        truth_value: TruthValue,
    ) -> Self {
        Self {
            id: RelationId::new(),
            predicate,
            roles,
            relation_type,
            context,
            temporal: None,
            active: true,
            expires_at: None,
            truth_value,
            dependents: BTreeSet::new(),
        }
    }

    /// The cached truth value.
    #[must_use]
    pub const fn truth_value(&self) -> &TruthValue {
        &self.truth_value
    }

    /// Relations whose context reads this one.
    #[must_use]
    pub const fn dependents(&self) -> &BTreeSet<RelationId> {
        &self.dependents
    }

    pub const fn is_temporal(&self) -> bool {
        self.temporal.is_some()
    }

    /// Distinct participating entities.
    #[must_use]
    pub fn participants(&self) -> BTreeSet<EntityId> {
        self.roles.values().copied().collect()
    }

    pub fn has_expired(&self, moment: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| moment >= at)
    }

    /// Whether the relation holds any claim at `moment`.
    ///
    /// A temporal relation is active only inside one of its intervals, unless
    /// it has no intervals at all.
    #[must_use]
    pub fn is_active_at(&self, moment: DateTime<Utc>) -> bool {
        self.active
            && !self.has_expired(moment)
            && self.temporal.as_ref().map_or(true, |t| t.is_active_at(moment))
    }

    /// Truth stored on the relation itself at `moment`, ignoring context.
    #[must_use]
    pub fn stored_truth_at(&self, moment: DateTime<Utc>) -> TruthValue {
        match &self.temporal {
            Some(temporal) => temporal.truth_value_at(moment),
            None => self.truth_value,
        }
    }

    /// Whether this relation states the same fact.
    pub(crate) fn same_fact(
        &self,
        predicate: &str,
        roles: &BTreeMap<String, EntityId>,
        context: Option<&Context>,
    ) -> bool {
        self.predicate == predicate && &self.roles == roles && self.context.as_ref() == context
    }
}

impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Relation {}

impl std::hash::Hash for Relation {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles = self
            .roles
            .iter()
            .map(|(role, entity)| format!("{role}={entity}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{}({roles}) type={} truth={}",
            self.predicate, self.relation_type, self.truth_value
        )
    }
}

/// Builder for a relation assertion.
///
/// # Example
/// ```rust,ignore
/// let eats = ontology.add_relation(
///     RelationBuilder::new("EATS")
///         .role("subject", dex)
///         .role("object", food)
///         .truth(TruthValue::TRUE),
/// )?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelationBuilder {
    pub(crate) predicate: String,
    pub(crate) roles: BTreeMap<String, EntityId>,
    pub(crate) relation_type: RelationType,
    pub(crate) context: Option<Context>,
    pub(crate) truth: TruthValue,
}

impl RelationBuilder {
    /// Starts a relation under the named predicate.
    pub fn new(predicate: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            ..Self::default()
        }
    }

    /// Binds a role to an entity. Rebinding a role replaces the entity.
    #[must_use]
    pub fn role(mut self, role: &str, entity: EntityId) -> Self {
        self.roles.insert(normalize_role(role), entity);
        self
    }

    /// Set the relation type (default: GENERAL).
    #[must_use]
    pub fn relation_type(mut self, relation_type: RelationType) -> Self {
        self.relation_type = relation_type;
        self
    }

    /// Set what governs the relation's validity.
    #[must_use]
    pub fn context(mut self, context: impl Into<Context>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the stored truth value (default: UNKNOWN).
    #[must_use]
    pub fn truth(mut self, truth: TruthValue) -> Self {
        self.truth = truth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entity(name: &str) -> EntityId {
        EntityId::derive::<&str>(name, "NOUN", &[])
    }

    #[test]
    fn test_relation_type_parse() {
        assert_eq!("permanent".parse::<RelationType>().unwrap(), RelationType::Permanent);
        assert_eq!("".parse::<RelationType>().unwrap(), RelationType::General);
        assert_eq!(
            "habitual".parse::<RelationType>().unwrap(),
            RelationType::Custom("HABITUAL".to_string())
        );
        assert_eq!(RelationType::Custom("HABITUAL".to_string()).to_string(), "HABITUAL");
    }

    #[test]
    fn test_callback_equality_is_identity() {
        let a = TruthCallback::new(|| TruthState::True);
        let b = TruthCallback::new(|| TruthState::True);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.call(), TruthState::True);
    }

    #[test]
    fn test_context_relations() {
        let a = RelationId::new();
        let b = RelationId::new();
        assert_eq!(Context::Relation(a).relations(), vec![a]);
        assert!(Context::Literal(true).relations().is_empty());

        let expr = RelationContext::relation(a) & (RelationContext::relation(b) | RelationContext::relation(a));
        assert_eq!(Context::from(expr).relations(), vec![a, b]);
    }

    #[test]
    fn test_builder_normalizes_roles() {
        let dex = entity("DEX");
        let builder = RelationBuilder::new("EATS").role(" Subject ", dex);
        assert_eq!(builder.roles.get("subject"), Some(&dex));
        assert_eq!(builder.truth, TruthValue::UNKNOWN);
    }

    #[test]
    fn test_expiry_and_activity() {
        let now = Utc::now();
        let mut relation = Relation::new(
            "IS_IN_A".to_string(),
            BTreeMap::new(),
            RelationType::Temporary,
            None,
            TruthValue::TRUE,
        );
        relation.expires_at = Some(now + Duration::seconds(5));

        assert!(relation.is_active_at(now));
        assert!(!relation.is_active_at(now + Duration::seconds(5)));

        relation.active = false;
        assert!(!relation.is_active_at(now));
    }

    #[test]
    fn test_same_fact() {
        let mut roles = BTreeMap::new();
        roles.insert("subject".to_string(), entity("A"));
        let relation = Relation::new(
            "REL".to_string(),
            roles.clone(),
            RelationType::General,
            Some(Context::Literal(true)),
            TruthValue::UNKNOWN,
        );

        assert!(relation.same_fact("REL", &roles, Some(&Context::Literal(true))));
        assert!(!relation.same_fact("REL", &roles, None));
        assert!(!relation.same_fact("OTHER", &roles, Some(&Context::Literal(true))));
    }
}
