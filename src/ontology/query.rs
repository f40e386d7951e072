//! Filtered scans over relations and entities.
//!
//! Every filter is optional and filters combine conjunctively. Results are
//! fully materialized, in registration order.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use chrono::{DateTime, Utc};
use regex::Regex;

use super::Ontology;
use crate::entity::{normalize_name, Entity, EntityId};
use crate::error::{LogosError, LogosResult, ValidationError};
use crate::relation::{Relation, RelationType};
use crate::truth::TruthState;

const REGEX_CACHE_MAX: usize = 256;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

fn cached_regex(pattern: &str) -> LogosResult<Regex> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache
            .read()
            .map_err(|_| LogosError::internal("regex cache lock poisoned"))?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(pattern).map_err(|e| {
        LogosError::Validation(ValidationError::InvalidPattern {
            reason: format!("invalid regex '{pattern}': {e}"),
        })
    })?;

    let mut guard = cache
        .write()
        .map_err(|_| LogosError::internal("regex cache lock poisoned"))?;
    if guard.len() >= REGEX_CACHE_MAX {
        guard.clear();
    }
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}

/// Filters for [`Ontology::query_relations`].
///
/// # Example
/// ```rust,ignore
/// let hits = ontology.query_relations(
///     &RelationQuery::new()
///         .predicate("EATS")
///         .entity(dex)
///         .truth(TruthState::True),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelationQuery {
    relation_type: Option<RelationType>,
    predicate: Option<String>,
    entities: Vec<EntityId>,
    moment: Option<DateTime<Utc>>,
    truth: Option<TruthState>,
}

impl RelationQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn relation_type(mut self, relation_type: RelationType) -> Self {
        self.relation_type = Some(relation_type);
        self
    }

    #[must_use]
    pub fn predicate(mut self, predicate: &str) -> Self {
        self.predicate = Some(normalize_name(predicate));
        self
    }

    /// Requires the relation to be attached to `entity`, directly or by
    /// propagation. Repeatable.
    #[must_use]
    pub fn entity(mut self, entity: EntityId) -> Self {
        self.entities.push(entity);
        self
    }

    /// Requires the relation to be active at `moment` and evaluates truth
    /// filters at that moment instead of now.
    #[must_use]
    pub fn at(mut self, moment: DateTime<Utc>) -> Self {
        self.moment = Some(moment);
        self
    }

    #[must_use]
    pub fn truth(mut self, truth: TruthState) -> Self {
        self.truth = Some(truth);
        self
    }
}

/// Filters for [`Ontology::query_entities`].
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    name: Option<String>,
    name_pattern: Option<String>,
    word_type: Option<String>,
    descendant_of: Option<EntityId>,
    predicate: Option<String>,
}

impl EntityQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical name or alias.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(normalize_name(name));
        self
    }

    /// Regular expression matched against the canonical name and aliases.
    #[must_use]
    pub fn name_pattern(mut self, pattern: &str) -> Self {
        self.name_pattern = Some(pattern.to_string());
        self
    }

    #[must_use]
    pub fn word_type(mut self, word_type: &str) -> Self {
        self.word_type = Some(normalize_name(word_type));
        self
    }

    #[must_use]
    pub fn descendant_of(mut self, ancestor: EntityId) -> Self {
        self.descendant_of = Some(ancestor);
        self
    }

    /// Requires an attached relation under `predicate`.
    #[must_use]
    pub fn with_predicate(mut self, predicate: &str) -> Self {
        self.predicate = Some(normalize_name(predicate));
        self
    }
}

impl Ontology {
    /// Every relation matching all filters of `query`.
    #[must_use]
    pub fn query_relations(&self, query: &RelationQuery) -> Vec<&Relation> {
        let attached: Vec<&Entity> = query
            .entities
            .iter()
            .filter_map(|id| self.entities.get(id))
            .collect();
        if attached.len() < query.entities.len() {
            return Vec::new();
        }
        let moment = query.moment.unwrap_or_else(Utc::now);

        self.relations()
            .filter(|r| query.relation_type.as_ref().map_or(true, |t| &r.relation_type == t))
            .filter(|r| query.predicate.as_ref().map_or(true, |p| &r.predicate == p))
            .filter(|r| attached.iter().all(|e| e.relation_ids().contains(&r.id)))
            .filter(|r| query.moment.map_or(true, |m| r.is_active_at(m)))
            .filter(|r| {
                query
                    .truth
                    .map_or(true, |t| self.truth_at(r.id, moment).evaluate() == t)
            })
            .collect()
    }

    /// Every entity matching all filters of `query`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPattern` for a malformed name pattern.
    pub fn query_entities(&self, query: &EntityQuery) -> LogosResult<Vec<&Entity>> {
        let pattern = query.name_pattern.as_deref().map(cached_regex).transpose()?;

        Ok(self
            .entities()
            .filter(|e| query.name.as_ref().map_or(true, |n| e.matches_name(n)))
            .filter(|e| {
                pattern.as_ref().map_or(true, |re| {
                    re.is_match(&e.name) || e.aliases.iter().any(|a| re.is_match(a))
                })
            })
            .filter(|e| query.word_type.as_ref().map_or(true, |w| &e.word_type == w))
            .filter(|e| {
                query
                    .descendant_of
                    .map_or(true, |ancestor| self.is_descendant_of(e.id, ancestor))
            })
            .filter(|e| {
                query.predicate.as_ref().map_or(true, |p| {
                    e.relation_ids()
                        .iter()
                        .filter_map(|id| self.relations.get(id))
                        .any(|r| &r.predicate == p)
                })
            })
            .collect())
    }
}
