//! Persisted form of an ontology.
//!
//! An [`OntologySnapshot`] is a plain serde document: entities, predicates,
//! relations, quantified relations and implications, each keyed by its id.
//! Truth values are stored as a numeric state code plus certainty and
//! modality. Contexts are stored as tagged records with operators by name.
//! Callback contexts cannot be persisted; they are logged and dropped.
//!
//! Restoring validates every reference before anything is built, so a
//! document naming a missing entity, predicate or relation is rejected as a
//! whole.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OntologyConfig;
use crate::entity::{normalize_name, Entity, EntityId};
use crate::error::{LogosError, LogosResult, MissingReference, ValidationError};
use crate::implication::{Implication, ImplicationId};
use crate::ontology::Ontology;
use crate::predicate::Predicate;
use crate::quantifier::{QuantifiedId, QuantifiedRelation, Quantifier, RelationTemplate};
use crate::relation::{
    Context, Relation, RelationContext, RelationId, RelationType, TemporalTruth,
};
use crate::time::TimeInterval;
use crate::truth::{Modality, TruthState, TruthValue};

/// Current document version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A truth value as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthRecord {
    /// [`TruthState::code`].
    pub state: u8,

    /// Probability of TRUE, for SUPERPOSITION.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<f64>,

    #[serde(default)]
    pub modality: Modality,
}

impl From<&TruthValue> for TruthRecord {
    fn from(tv: &TruthValue) -> Self {
        Self {
            state: tv.evaluate().code(),
            certainty: tv.probability(),
            modality: tv.modality(),
        }
    }
}

impl TryFrom<&TruthRecord> for TruthValue {
    type Error = LogosError;

    fn try_from(record: &TruthRecord) -> LogosResult<Self> {
        let state = TruthState::from_code(record.state).ok_or_else(|| {
            LogosError::serialization(format!("unknown truth state code {}", record.state))
        })?;
        Ok(Self::new(state, record.modality, record.certainty)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub name: String,
    pub word_type: String,
    #[serde(default)]
    pub parents: Vec<EntityId>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A boolean expression as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpressionRecord {
    Relation { id: RelationId },
    Operator {
        operator: String,
        operands: Vec<ExpressionRecord>,
    },
}

/// A relation context as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextRecord {
    Relation { id: RelationId },
    Literal { value: bool },
    Expression { tree: ExpressionRecord },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub interval: TimeInterval,
    pub truth: TruthRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalRecord {
    #[serde(default)]
    pub intervals: Vec<IntervalRecord>,
    pub default_truth: TruthRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub id: RelationId,
    pub predicate: String,
    pub roles: BTreeMap<String, EntityId>,
    #[serde(default)]
    pub relation_type: RelationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextRecord>,
    pub truth: TruthRecord,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalRecord>,
}

const fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantifiedRecord {
    pub id: QuantifiedId,
    /// [`Quantifier::code`].
    pub quantifier: u8,
    pub variables: Vec<String>,
    pub template: RelationTemplate,
    pub truth: TruthRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplicationRecord {
    pub id: ImplicationId,
    pub antecedent: RelationId,
    pub consequent: RelationId,
    pub truth: TruthRecord,
}

/// The persisted form of an [`Ontology`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologySnapshot {
    pub version: u32,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub relations: Vec<RelationRecord>,
    #[serde(default)]
    pub quantified_relations: Vec<QuantifiedRecord>,
    #[serde(default)]
    pub implications: Vec<ImplicationRecord>,
}

impl OntologySnapshot {
    /// Encodes the snapshot as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Serialization` if encoding fails.
    pub fn to_json(&self) -> LogosResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LogosError::serialization(format!("failed to encode snapshot: {e}")))
    }

    /// Decodes a snapshot from JSON.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Serialization` for malformed input.
    pub fn from_json(json: &str) -> LogosResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| LogosError::serialization(format!("failed to decode snapshot: {e}")))
    }

    /// Content hash of the encoded snapshot, as lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Serialization` if encoding fails.
    pub fn fingerprint(&self) -> LogosResult<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| LogosError::serialization(format!("failed to encode snapshot: {e}")))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Writes the snapshot as JSON to `path`.
    ///
    /// The document is written to a temporary file next to `path`, synced
    /// and then renamed over it, so a crash never leaves a partial file.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Serialization` on encoding or I/O failure.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> LogosResult<()> {
        let path = path.as_ref();
        let io_err = |e: std::io::Error| {
            LogosError::serialization(format!("failed to write {}: {e}", path.display()))
        };
        let temp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4()));

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        let written = serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| LogosError::serialization(format!("failed to encode snapshot: {e}")))
            .and_then(|()| writer.flush().map_err(io_err))
            .and_then(|()| writer.get_ref().sync_all().map_err(io_err));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        drop(writer);

        fs::rename(&temp_path, path).map_err(io_err)
    }

    /// Reads a snapshot written by [`OntologySnapshot::save_to_path`].
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Serialization` on I/O failure or malformed input.
    pub fn load_from_path(path: impl AsRef<Path>) -> LogosResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            LogosError::serialization(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            LogosError::serialization(format!("failed to decode {}: {e}", path.display()))
        })
    }
}

fn expression_record(expr: &RelationContext) -> Option<ExpressionRecord> {
    match expr {
        RelationContext::Relation(id) => Some(ExpressionRecord::Relation { id: *id }),
        RelationContext::Callback(_) => None,
        RelationContext::Node { op, operands } => Some(ExpressionRecord::Operator {
            operator: op.as_str().to_string(),
            operands: operands
                .iter()
                .map(expression_record)
                .collect::<Option<Vec<_>>>()?,
        }),
    }
}

fn restore_expression(record: &ExpressionRecord) -> Result<RelationContext, ValidationError> {
    match record {
        ExpressionRecord::Relation { id } => Ok(RelationContext::relation(*id)),
        ExpressionRecord::Operator { operator, operands } => {
            let operands = operands
                .iter()
                .map(restore_expression)
                .collect::<Result<Vec<_>, _>>()?;
            RelationContext::from_operator(operator, operands)
        }
    }
}

fn context_record(relation: &Relation) -> Option<ContextRecord> {
    match relation.context.as_ref()? {
        Context::Relation(id) => Some(ContextRecord::Relation { id: *id }),
        Context::Literal(value) => Some(ContextRecord::Literal { value: *value }),
        Context::Callback(_) => {
            warn!(relation = %relation.id, "callback context cannot be persisted; stored without context");
            None
        }
        Context::Expression(expr) => {
            let tree = expression_record(expr);
            if tree.is_none() {
                warn!(relation = %relation.id, "expression with a callback leaf cannot be persisted; stored without context");
            }
            tree.map(|tree| ContextRecord::Expression { tree })
        }
    }
}

fn restore_context(record: &ContextRecord) -> Result<Context, ValidationError> {
    Ok(match record {
        ContextRecord::Relation { id } => Context::Relation(*id),
        ContextRecord::Literal { value } => Context::Literal(*value),
        ContextRecord::Expression { tree } => Context::Expression(restore_expression(tree)?),
    })
}

fn relation_record(relation: &Relation) -> RelationRecord {
    RelationRecord {
        id: relation.id,
        predicate: relation.predicate.clone(),
        roles: relation.roles.clone(),
        relation_type: relation.relation_type.clone(),
        context: context_record(relation),
        truth: relation.truth_value().into(),
        active: relation.active,
        expires_at: relation.expires_at,
        temporal: relation.temporal.as_ref().map(|t| TemporalRecord {
            intervals: t
                .intervals()
                .iter()
                .map(|it| IntervalRecord {
                    interval: it.interval,
                    truth: (&it.truth).into(),
                })
                .collect(),
            default_truth: (&t.default_truth).into(),
        }),
    }
}

impl Ontology {
    /// Captures the ontology as a persistable document.
    #[must_use]
    pub fn snapshot(&self) -> OntologySnapshot {
        OntologySnapshot {
            version: SNAPSHOT_VERSION,
            entities: self
                .entities()
                .map(|e| EntityRecord {
                    id: e.id,
                    name: e.name.clone(),
                    word_type: e.word_type.clone(),
                    parents: e.parents.clone(),
                    aliases: e.aliases.clone(),
                    description: e.description.clone(),
                })
                .collect(),
            predicates: self.predicates().cloned().collect(),
            relations: self.relations().map(relation_record).collect(),
            quantified_relations: self
                .quantified_relations()
                .map(|q| QuantifiedRecord {
                    id: q.id,
                    quantifier: q.quantifier.code(),
                    variables: q.variables.clone(),
                    template: q.template.clone(),
                    truth: (&q.truth_value).into(),
                })
                .collect(),
            implications: self
                .implications()
                .map(|i| ImplicationRecord {
                    id: i.id,
                    antecedent: i.antecedent,
                    consequent: i.consequent,
                    truth: (&i.truth).into(),
                })
                .collect(),
        }
    }

    /// Rebuilds an ontology from a snapshot with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`Ontology::from_snapshot_with_config`].
    pub fn from_snapshot(snapshot: &OntologySnapshot) -> LogosResult<Self> {
        Self::from_snapshot_with_config(snapshot, OntologyConfig::default())
    }

    /// Rebuilds an ontology from a snapshot.
    ///
    /// Ids and truth values are restored exactly. Entity relation lists,
    /// propagation and dependents are rebuilt.
    ///
    /// # Errors
    ///
    /// - `MissingReference` for any reference to an absent entity,
    ///   predicate or relation
    /// - `ValidationError` for duplicate ids, unknown operators, overlapping
    ///   or inverted intervals, roles the predicate does not declare,
    ///   invalid truth values or a context cycle
    /// - `LogosError::Serialization` for an unsupported version or an
    ///   unknown state or quantifier code
    pub fn from_snapshot_with_config(
        snapshot: &OntologySnapshot,
        config: OntologyConfig,
    ) -> LogosResult<Self> {
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(LogosError::serialization(format!(
                "snapshot version {} is newer than supported version {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }

        let entity_ids = unique_ids("entity", snapshot.entities.iter().map(|e| e.id))?;
        let predicate_names = unique_ids(
            "predicate",
            snapshot.predicates.iter().map(|p| p.name.clone()),
        )?;
        let relation_ids = unique_ids("relation", snapshot.relations.iter().map(|r| r.id))?;
        let declared: HashMap<&str, &Predicate> = snapshot
            .predicates
            .iter()
            .map(|p| (p.name.as_str(), p))
            .collect();

        let entity_exists = |id: &EntityId| -> LogosResult<()> {
            if entity_ids.contains(id) {
                Ok(())
            } else {
                Err(MissingReference::Entity(*id).into())
            }
        };
        let predicate_exists = |name: &String| -> LogosResult<()> {
            if predicate_names.contains(name) {
                Ok(())
            } else {
                Err(MissingReference::Predicate(name.clone()).into())
            }
        };
        let relation_exists = |id: &RelationId| -> LogosResult<()> {
            if relation_ids.contains(id) {
                Ok(())
            } else {
                Err(MissingReference::Relation(*id).into())
            }
        };

        // Validate everything before building anything.
        for record in &snapshot.entities {
            record.parents.iter().try_for_each(entity_exists)?;
        }
        for predicate in &snapshot.predicates {
            predicate.inverses.iter().try_for_each(predicate_exists)?;
            predicate.inverse_of.iter().try_for_each(predicate_exists)?;
        }

        let mut relations = Vec::with_capacity(snapshot.relations.len());
        for record in &snapshot.relations {
            predicate_exists(&record.predicate)?;
            if let Some(predicate) = declared.get(record.predicate.as_str()) {
                check_roles(predicate, record.roles.keys())?;
            }
            record.roles.values().try_for_each(entity_exists)?;
            let context = record.context.as_ref().map(restore_context).transpose()?;
            if let Some(context) = &context {
                context.relations().iter().try_for_each(relation_exists)?;
            }

            let mut relation = Relation::new(
                record.predicate.clone(),
                record.roles.clone(),
                record.relation_type.clone(),
                context,
                TruthValue::try_from(&record.truth)?,
            );
            relation.id = record.id;
            relation.active = record.active;
            relation.expires_at = record.expires_at;
            if let Some(temporal) = &record.temporal {
                let mut truth = TemporalTruth::new(TruthValue::try_from(&temporal.default_truth)?);
                for interval in &temporal.intervals {
                    truth.add_interval(interval.interval, TruthValue::try_from(&interval.truth)?)?;
                }
                relation.temporal = Some(truth);
            }
            relations.push(relation);
        }

        let mut quantified = Vec::with_capacity(snapshot.quantified_relations.len());
        for record in &snapshot.quantified_relations {
            let quantifier = Quantifier::from_code(record.quantifier).ok_or_else(|| {
                LogosError::serialization(format!("unknown quantifier code {}", record.quantifier))
            })?;
            predicate_exists(&record.template.predicate)?;
            if let Some(predicate) = declared.get(record.template.predicate.as_str()) {
                check_roles(predicate, record.template.roles.keys())?;
            }
            record.template.entities().try_for_each(|id| entity_exists(&id))?;
            let mut statement = QuantifiedRelation::new(
                quantifier,
                record.variables.as_slice(),
                record.template.clone(),
                TruthValue::try_from(&record.truth)?,
            )?;
            statement.id = record.id;
            quantified.push(statement);
        }

        let mut implications = Vec::with_capacity(snapshot.implications.len());
        for record in &snapshot.implications {
            relation_exists(&record.antecedent)?;
            relation_exists(&record.consequent)?;
            let mut implication = Implication::new(
                record.antecedent,
                record.consequent,
                TruthValue::try_from(&record.truth)?,
            );
            implication.id = record.id;
            implications.push(implication);
        }

        // Build.
        let mut ontology = Self::with_config(config)?;
        for record in &snapshot.entities {
            let mut entity = Entity::new(
                record.id,
                &record.name,
                &record.word_type,
                record.parents.clone(),
                record.description.clone(),
            );
            for alias in &record.aliases {
                let alias = normalize_name(alias);
                if entity.add_alias(&alias) {
                    ontology.aliases.entry(alias).or_default().push(record.id);
                }
            }
            ontology.names.entry(entity.name.clone()).or_default().push(record.id);
            ontology.entities.insert(record.id, entity);
            ontology.entity_order.push(record.id);
        }
        for predicate in &snapshot.predicates {
            ontology.predicates.insert(predicate.name.clone(), predicate.clone());
        }

        for relation in &relations {
            ontology.relation_order.push(relation.id);
        }
        for relation in relations {
            let id = relation.id;
            for participant in relation.participants() {
                if let Some(entity) = ontology.entities.get_mut(&participant) {
                    entity.attach(id);
                }
            }
            ontology.relations.insert(id, relation);
        }
        let contexts: Vec<(RelationId, Context)> = ontology
            .relations()
            .filter_map(|r| r.context.clone().map(|c| (r.id, c)))
            .collect();
        for (id, context) in &contexts {
            ontology.link_dependents(*id, context);
        }
        if let Some(relation) = ontology.find_context_cycle() {
            return Err(ValidationError::ContextCycle { relation }.into());
        }
        ontology.repropagate_all();

        for statement in quantified {
            ontology.quantified_order.push(statement.id);
            ontology.quantified.insert(statement.id, statement);
        }
        for implication in implications {
            ontology.implication_order.push(implication.id);
            ontology.implications.insert(implication.id, implication);
        }

        info!(
            entities = ontology.entity_count(),
            relations = ontology.relation_count(),
            "ontology restored from snapshot"
        );
        Ok(ontology)
    }

    /// Writes a snapshot of the ontology to `path`.
    ///
    /// # Errors
    ///
    /// See [`OntologySnapshot::save_to_path`].
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> LogosResult<()> {
        self.snapshot().save_to_path(path)
    }

    /// Loads an ontology from a snapshot file.
    ///
    /// # Errors
    ///
    /// See [`OntologySnapshot::load_from_path`] and
    /// [`Ontology::from_snapshot`].
    pub fn load_from_path(path: impl AsRef<Path>) -> LogosResult<Self> {
        Self::from_snapshot(&OntologySnapshot::load_from_path(path)?)
    }
}

fn check_roles<'a>(
    predicate: &Predicate,
    mut roles: impl Iterator<Item = &'a String>,
) -> LogosResult<()> {
    match roles.find(|role| !predicate.accepts_role(role)) {
        Some(role) => Err(ValidationError::UndeclaredRole {
            predicate: predicate.name.clone(),
            role: role.clone(),
        }
        .into()),
        None => Ok(()),
    }
}

fn unique_ids<T>(kind: &'static str, ids: impl Iterator<Item = T>) -> LogosResult<HashSet<T>>
where
    T: std::hash::Hash + Eq + ToString,
{
    let mut seen = HashSet::new();
    for id in ids {
        if seen.contains(&id) {
            return Err(ValidationError::DuplicateIdentifier {
                kind,
                key: id.to_string(),
            }
            .into());
        }
        seen.insert(id);
    }
    Ok(seen)
}
