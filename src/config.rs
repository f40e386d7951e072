//! Ontology configuration.

use serde::{Deserialize, Serialize};

use crate::error::{LogosError, LogosResult};

/// Behavioural switches for an [`Ontology`](crate::Ontology).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OntologyConfig {
    /// Attach existing relations to a newly added entity when one of its
    /// ancestors participates in them.
    pub inherit_on_insert: bool,

    /// Initialise the cached truth of a contextual relation from its context
    /// when the relation is created.
    pub sync_context_on_insert: bool,

    /// Name prefix for background expiry timer threads.
    pub expiry_thread_prefix: String,
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            inherit_on_insert: true,
            sync_context_on_insert: true,
            expiry_thread_prefix: "logos-expiry".to_string(),
        }
    }
}

impl OntologyConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Config` if the thread prefix is blank.
    pub fn validate(&self) -> LogosResult<()> {
        if self.expiry_thread_prefix.trim().is_empty() {
            return Err(LogosError::Config {
                message: "expiry_thread_prefix cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Load configuration from a TOML string. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Config` if the TOML cannot be parsed or the
    /// result fails validation.
    pub fn from_toml(toml_str: &str) -> LogosResult<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| LogosError::Config {
            message: format!("Failed to parse TOML: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Config` if serialization fails.
    pub fn to_toml(&self) -> LogosResult<String> {
        toml::to_string_pretty(self).map_err(|e| LogosError::Config {
            message: format!("Failed to serialize to TOML: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OntologyConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.inherit_on_insert);
        assert!(config.sync_context_on_insert);
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let config = OntologyConfig {
            expiry_thread_prefix: "  ".to_string(),
            ..OntologyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = OntologyConfig {
            inherit_on_insert: false,
            ..OntologyConfig::default()
        };
        let toml_str = config.to_toml().unwrap();
        let loaded = OntologyConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = OntologyConfig::from_toml("inherit_on_insert = false\n").unwrap();
        assert!(!config.inherit_on_insert);
        assert_eq!(config.expiry_thread_prefix, "logos-expiry");
    }

    #[test]
    fn test_invalid_toml() {
        let err = OntologyConfig::from_toml("inherit_on_insert = 3").unwrap_err();
        assert!(matches!(err, LogosError::Config { .. }));
    }
}
