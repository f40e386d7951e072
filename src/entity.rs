//! Entities and their identity.
//!
//! An entity is a named, typed node in a multi-inheritance hierarchy. Its
//! identity is derived from its canonical name, word type and the names of
//! its parents, so the same declaration always produces the same id and a
//! repeated declaration is detected as a duplicate.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::relation::RelationId;

/// Namespace for name-derived entity ids.
const ENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_676f_735f_656e_7469_7479_5f6e_7330);

/// Normalizes a name to its canonical form (trimmed, upper-case).
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Stable entity identifier.
///
/// # Examples
///
/// ```
/// use logos_ontology::EntityId;
///
/// let a = EntityId::derive("fido", "noun", &["DOG"]);
/// let b = EntityId::derive("FIDO", "NOUN", &["dog"]);
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Derives the id for an identity key of name, word type and parent names.
    #[must_use]
    pub fn derive<S: AsRef<str>>(name: &str, word_type: &str, parent_names: &[S]) -> Self {
        let mut key = normalize_name(name);
        key.push('\u{1f}');
        key.push_str(&normalize_name(word_type));
        for parent in parent_names {
            key.push('\u{1f}');
            key.push_str(&normalize_name(parent.as_ref()));
        }
        Self(Uuid::new_v5(&ENTITY_NAMESPACE, key.as_bytes()))
    }

    /// Creates an entity ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A named node in the entity hierarchy.
///
/// Parents and attached relations are stored as ids; the [`Ontology`]
/// owns the objects they point to.
///
/// [`Ontology`]: crate::Ontology
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,

    /// Canonical, upper-cased name.
    pub name: String,

    /// Category tag such as NOUN or PROPER_NOUN.
    pub word_type: String,

    /// Direct parents, in declaration order.
    pub parents: Vec<EntityId>,

    /// Alternate names (canonical form).
    pub aliases: Vec<String>,

    pub description: Option<String>,

    /// Relations attached directly or by propagation, in attachment order.
    pub(crate) relations: Vec<RelationId>,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        name: &str,
        word_type: &str,
        parents: Vec<EntityId>,
        description: Option<String>,
    ) -> Self {
        Self {
            id,
            name: normalize_name(name),
            word_type: normalize_name(word_type),
            parents,
            aliases: Vec::new(),
            description,
            relations: Vec::new(),
        }
    }

    /// Returns true if `query` names this entity, canonically or by alias.
    #[must_use]
    pub fn matches_name(&self, query: &str) -> bool {
        let query = normalize_name(query);
        self.name == query || self.aliases.contains(&query)
    }

    /// Records an alias. Returns false if it was already known.
    pub(crate) fn add_alias(&mut self, alias: &str) -> bool {
        let alias = normalize_name(alias);
        if alias == self.name || self.aliases.contains(&alias) {
            return false;
        }
        self.aliases.push(alias);
        true
    }

    /// Every relation reference attached to this entity, active or not.
    #[must_use]
    pub fn relation_ids(&self) -> &[RelationId] {
        &self.relations
    }

    /// Attaches a relation unless it is already attached.
    pub(crate) fn attach(&mut self, relation: RelationId) -> bool {
        if self.relations.contains(&relation) {
            return false;
        }
        self.relations.push(relation);
        true
    }

    pub(crate) fn detach(&mut self, relation: RelationId) {
        self.relations.retain(|r| *r != relation);
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl std::hash::Hash for Entity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.word_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_is_derived() {
        let a = EntityId::derive("Dog", "Noun", &["MAMMAL", "SPECIES"]);
        let b = EntityId::derive("DOG", "NOUN", &["mammal", "species"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_entity_id_distinguishes_homonyms() {
        let noun = EntityId::derive::<&str>("FIDO", "NOUN", &[]);
        let proper = EntityId::derive::<&str>("FIDO", "PROPER_NOUN", &[]);
        let with_parent = EntityId::derive("FIDO", "NOUN", &["DOG"]);
        assert_ne!(noun, proper);
        assert_ne!(noun, with_parent);
    }

    #[test]
    fn test_parent_order_matters() {
        let a = EntityId::derive("CAT", "NOUN", &["MAMMAL", "SPECIES"]);
        let b = EntityId::derive("CAT", "NOUN", &["SPECIES", "MAMMAL"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_entity_normalizes_names() {
        let id = EntityId::derive::<&str>("light", "noun", &[]);
        let entity = Entity::new(id, " light ", "noun", Vec::new(), None);
        assert_eq!(entity.name, "LIGHT");
        assert_eq!(entity.word_type, "NOUN");
    }

    #[test]
    fn test_matches_name_with_aliases() {
        let id = EntityId::derive::<&str>("DOG", "NOUN", &[]);
        let mut entity = Entity::new(id, "DOG", "NOUN", Vec::new(), None);
        assert!(entity.add_alias("hound"));
        assert!(!entity.add_alias("HOUND"));
        assert!(!entity.add_alias("dog"));

        assert!(entity.matches_name("dog"));
        assert!(entity.matches_name("Hound"));
        assert!(!entity.matches_name("cat"));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let id = EntityId::derive::<&str>("DOG", "NOUN", &[]);
        let mut entity = Entity::new(id, "DOG", "NOUN", Vec::new(), None);
        let relation = RelationId::new();
        assert!(entity.attach(relation));
        assert!(!entity.attach(relation));
        assert_eq!(entity.relation_ids(), &[relation]);

        entity.detach(relation);
        assert!(entity.relation_ids().is_empty());
    }
}
