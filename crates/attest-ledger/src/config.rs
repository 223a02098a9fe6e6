//! Ledger configuration

use crate::LedgerError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Payload validation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Reject unknown top-level fields on `claim` and `outcome` payloads
    #[serde(default)]
    pub reject_unknown_fields: bool,

    /// Check the attached confidence's structural invariants
    #[serde(default = "default_true")]
    pub validate_confidence: bool,

    /// Re-evaluate derived confidence formulas before accepting
    #[serde(default)]
    pub verify_derivations: bool,

    /// Require a non-empty provenance source
    #[serde(default = "default_true")]
    pub require_provenance_source: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            reject_unknown_fields: false,
            validate_confidence: true,
            verify_derivations: false,
            require_provenance_source: true,
        }
    }
}

impl ValidationConfig {
    /// Every check enabled
    pub fn strict() -> Self {
        Self {
            reject_unknown_fields: true,
            validate_confidence: true,
            verify_derivations: true,
            require_provenance_source: true,
        }
    }

    /// Required fields and types only
    pub fn permissive() -> Self {
        Self {
            reject_unknown_fields: false,
            validate_confidence: false,
            verify_derivations: false,
            require_provenance_source: false,
        }
    }
}

/// Configuration for the evidence ledger
///
/// # Examples
///
/// ```
/// use attest_ledger::LedgerConfig;
///
/// let config = LedgerConfig::from_toml_str("default_chain_depth = 4").unwrap();
/// assert_eq!(config.default_chain_depth, 4);
/// assert!(config.enforce_committed_relations);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Payload validation rules
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Reject drafts whose relations point at uncommitted entries
    /// Default: true
    #[serde(default = "default_true")]
    pub enforce_committed_relations: bool,

    /// Depth walked by `EvidenceLedger::get_chain_default`
    /// Default: 8
    #[serde(default = "default_chain_depth")]
    pub default_chain_depth: usize,
}

fn default_chain_depth() -> usize {
    8
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            validation: ValidationConfig::default(),
            enforce_committed_relations: true,
            default_chain_depth: default_chain_depth(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    ledger: LedgerConfig,
}

impl LedgerConfig {
    /// Strict validation
    pub fn strict() -> Self {
        Self {
            validation: ValidationConfig::strict(),
            ..Self::default()
        }
    }

    /// Permissive validation, relations unchecked
    pub fn lenient() -> Self {
        Self {
            validation: ValidationConfig::permissive(),
            enforce_committed_relations: false,
            ..Self::default()
        }
    }

    /// Parse a bare `LedgerConfig` TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self, LedgerError> {
        toml::from_str(toml_str).map_err(|e| LedgerError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load the `[ledger]` section of a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("Failed to read config file: {}", e)))?;
        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| LedgerError::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(file.ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.enforce_committed_relations);
        assert_eq!(config.default_chain_depth, 8);
        assert!(!config.validation.reject_unknown_fields);
    }

    #[test]
    fn test_presets() {
        assert!(LedgerConfig::strict().validation.reject_unknown_fields);
        assert!(!LedgerConfig::lenient().enforce_committed_relations);
    }

    #[test]
    fn test_parse_nested_validation() {
        let config = LedgerConfig::from_toml_str(
            r#"
            enforce_committed_relations = false

            [validation]
            reject_unknown_fields = true
            "#,
        )
        .unwrap();
        assert!(!config.enforce_committed_relations);
        assert!(config.validation.reject_unknown_fields);
        assert!(config.validation.validate_confidence);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = LedgerConfig::from_toml_str("default_chain_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}
