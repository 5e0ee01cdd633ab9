//! Graph configuration.

use serde::{Deserialize, Serialize};

use crate::storage::BackendConfig;
use crate::{Error, Result};

/// Options for opening a [`VersionGraph`](crate::VersionGraph).
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: BackendConfig,
    /// Install a unique constraint on `prov:active_key` when the backend
    /// supports one.
    pub unique_backstop: bool,
    /// Store a `prov:Event` node for every provenance event. When off,
    /// events are still returned to the caller but not persisted.
    pub record_provenance: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            unique_backstop: true,
            record_provenance: true,
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(GraphConfig::from_json("{}").unwrap(), GraphConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = GraphConfig::from_json(
            r#"{"backend": {"type": "memory"}, "record_provenance": false}"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);
        assert!(config.unique_backstop);
        assert!(!config.record_provenance);
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let err = GraphConfig::from_json(r#"{"backend": {"type": "rocks"}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
