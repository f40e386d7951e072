//! Predicates: named relation types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::normalize_name;
use crate::error::ValidationError;

/// A relation type such as IS, HAS or TAKES_TO.
///
/// A predicate may declare the role names its relations use. An inverse
/// predicate records the predicate it inverts and how the original's roles
/// map onto its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// Upper-cased name; the key in the predicate table.
    pub name: String,

    /// Declared role names. Empty means any role name is accepted.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Names of predicates registered as inverses of this one.
    #[serde(default)]
    pub inverses: Vec<String>,

    /// The predicate this one inverts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse_of: Option<String>,

    /// Original role name to inverse role name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub role_mapping: BTreeMap<String, String>,
}

impl Predicate {
    /// Creates a predicate.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyName` if the name or a role is blank.
    pub fn new<S: AsRef<str>>(name: &str, roles: &[S]) -> Result<Self, ValidationError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(ValidationError::EmptyName { field: "predicate name" });
        }
        let mut declared = Vec::with_capacity(roles.len());
        for role in roles {
            let role = normalize_role(role.as_ref());
            if role.is_empty() {
                return Err(ValidationError::EmptyName { field: "role name" });
            }
            if !declared.contains(&role) {
                declared.push(role);
            }
        }
        Ok(Self {
            name,
            roles: declared,
            inverses: Vec::new(),
            inverse_of: None,
            role_mapping: BTreeMap::new(),
        })
    }

    /// Returns true if relations of this predicate may use `role`.
    #[must_use]
    pub fn accepts_role(&self, role: &str) -> bool {
        self.roles.is_empty() || self.roles.iter().any(|r| r == role)
    }

    pub fn is_inverse(&self) -> bool {
        self.inverse_of.is_some()
    }

    /// Maps an original role name to this inverse predicate's role name.
    ///
    /// Roles without an explicit mapping keep their name.
    #[must_use]
    pub fn map_role<'a>(&'a self, role: &'a str) -> &'a str {
        self.role_mapping.get(role).map_or(role, String::as_str)
    }
}

/// Role names are case-insensitive and stored lower-case.
#[must_use]
pub fn normalize_role(role: &str) -> String {
    role.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_normalizes() {
        let p = Predicate::new("takes_to", &["Actor", "item", " destination "]).unwrap();
        assert_eq!(p.name, "TAKES_TO");
        assert_eq!(p.roles, vec!["actor", "item", "destination"]);
        assert!(!p.is_inverse());
    }

    #[test]
    fn test_predicate_rejects_blank() {
        assert!(Predicate::new::<&str>("  ", &[]).is_err());
        assert!(Predicate::new("HAS", &["owner", ""]).is_err());
    }

    #[test]
    fn test_accepts_role() {
        let open = Predicate::new::<&str>("IS", &[]).unwrap();
        assert!(open.accepts_role("anything"));

        let closed = Predicate::new("HAS", &["owner", "part"]).unwrap();
        assert!(closed.accepts_role("owner"));
        assert!(!closed.accepts_role("subject"));
    }

    #[test]
    fn test_map_role() {
        let mut inverse = Predicate::new("PART_OF", &["part", "whole"]).unwrap();
        inverse.role_mapping.insert("owner".to_string(), "whole".to_string());
        assert_eq!(inverse.map_role("owner"), "whole");
        assert_eq!(inverse.map_role("part"), "part");
    }
}
