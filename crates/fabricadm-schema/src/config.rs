use crate::schema::{validate, SchemaViolation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read fabric configuration '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse fabric configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("fabric configuration does not match schema: {}", format_violations(.0))]
    Schema(Vec<SchemaViolation>),
    #[error("fabric configuration schema failed to compile: {0}")]
    InvalidSchema(String),
    #[error(
        "default_overlay_mtu ({overlay}) must not exceed default_underlay_mtu ({underlay})"
    )]
    MtuMismatch { underlay: u32, overlay: u32 },
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// How underlay addresses are handed out to compute nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnderlayAssignment {
    Manual,
    Automatic,
}

impl fmt::Display for UnderlayAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Automatic => write!(f, "automatic"),
        }
    }
}

/// The operator-authored fabric configuration.
///
/// Only ever built from a document that passed [`validate`]; immutable after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FabricConfig {
    pub sdc_underlay_tag: String,
    pub sdc_underlay_assignment: UnderlayAssignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdc_underlay_pool: Option<String>,
    pub sdc_nat_pool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_underlay_mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_overlay_mtu: Option<u32>,
}

impl FabricConfig {
    /// Schema-validate a parsed document and convert it into a `FabricConfig`.
    pub fn from_document(doc: &Value) -> Result<Self, ConfigError> {
        validate(doc)?;
        let config: Self = serde_json::from_value(doc.clone())?;
        config.check_mtus()?;
        Ok(config)
    }

    /// The JSON value persisted into application metadata.
    pub fn to_value(&self) -> Result<Value, ConfigError> {
        Ok(serde_json::to_value(self)?)
    }

    fn check_mtus(&self) -> Result<(), ConfigError> {
        if let (Some(underlay), Some(overlay)) =
            (self.default_underlay_mtu, self.default_overlay_mtu)
        {
            if overlay > underlay {
                return Err(ConfigError::MtuMismatch { underlay, overlay });
            }
        }
        Ok(())
    }
}

pub fn parse_config_str(input: &str) -> Result<Value, ConfigError> {
    Ok(serde_json::from_str(input)?)
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Value, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_manual_document() {
        let doc = parse_config_str(
            r#"{
                "sdc_underlay_tag": "sdc_underlay",
                "sdc_underlay_assignment": "manual",
                "sdc_nat_pool": "nat-pool"
            }"#,
        )
        .unwrap();
        let config = FabricConfig::from_document(&doc).unwrap();
        assert_eq!(config.sdc_underlay_assignment, UnderlayAssignment::Manual);
        assert_eq!(config.sdc_underlay_pool, None);
        assert_eq!(config.sdc_nat_pool, "nat-pool");
    }

    #[test]
    fn serialized_value_matches_document() {
        let doc = json!({
            "sdc_underlay_tag": "sdc_underlay",
            "sdc_underlay_assignment": "automatic",
            "sdc_underlay_pool": "underlay-pool",
            "sdc_nat_pool": "nat-pool"
        });
        let config = FabricConfig::from_document(&doc).unwrap();
        assert_eq!(config.to_value().unwrap(), doc);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_config_str("{ \"sdc_underlay_tag\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = read_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fabrics.json");
        fs::write(
            &path,
            r#"{"sdc_underlay_tag":"t","sdc_underlay_assignment":"manual","sdc_nat_pool":"p"}"#,
        )
        .unwrap();
        let doc = read_config_file(&path).unwrap();
        assert_eq!(doc["sdc_underlay_tag"], "t");
    }

    #[test]
    fn overlay_mtu_above_underlay_rejected() {
        let doc = json!({
            "sdc_underlay_tag": "sdc_underlay",
            "sdc_underlay_assignment": "manual",
            "sdc_nat_pool": "nat-pool",
            "default_underlay_mtu": 1500,
            "default_overlay_mtu": 9000
        });
        let err = FabricConfig::from_document(&doc).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MtuMismatch {
                underlay: 1500,
                overlay: 9000
            }
        ));
    }

    #[test]
    fn schema_error_lists_violations() {
        let doc = json!({ "sdc_underlay_assignment": "manual" });
        let err = FabricConfig::from_document(&doc).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("sdc_underlay_tag"), "{msg}");
        assert!(msg.contains("sdc_nat_pool"), "{msg}");
    }

    #[test]
    fn assignment_display() {
        assert_eq!(UnderlayAssignment::Manual.to_string(), "manual");
        assert_eq!(UnderlayAssignment::Automatic.to_string(), "automatic");
    }
}
