use crate::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Application metadata key under which the fabric configuration is stored.
pub const FABRIC_CFG_KEY: &str = "fabric_cfg";

pub const MIN_MTU: u32 = 576;
pub const MAX_MTU: u32 = 9000;

/// A single schema violation, located by JSON pointer into the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON pointer of the offending value; empty for the document root.
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// The fixed JSON schema (draft 2020-12) for the fabric configuration document.
pub fn fabric_cfg_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["sdc_underlay_tag", "sdc_underlay_assignment", "sdc_nat_pool"],
        "properties": {
            "sdc_underlay_tag": { "type": "string", "minLength": 1 },
            "sdc_underlay_assignment": { "type": "string", "enum": ["manual", "automatic"] },
            "sdc_underlay_pool": { "type": "string", "minLength": 1 },
            "sdc_nat_pool": { "type": "string", "minLength": 1 },
            "default_underlay_mtu": {
                "type": "integer",
                "minimum": MIN_MTU,
                "maximum": MAX_MTU
            },
            "default_overlay_mtu": {
                "type": "integer",
                "minimum": MIN_MTU,
                "maximum": MAX_MTU
            }
        },
        "if": {
            "properties": { "sdc_underlay_assignment": { "const": "automatic" } },
            "required": ["sdc_underlay_assignment"]
        },
        "then": { "required": ["sdc_underlay_pool"] }
    })
}

/// The application metadata schema: an object whose `fabric_cfg` property is
/// described by [`fabric_cfg_schema`].
pub fn metadata_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            FABRIC_CFG_KEY: fabric_cfg_schema()
        }
    })
}

/// Validate a fabric configuration document against the fixed schema.
///
/// Every violation is collected; the error lists all of them, not just the
/// first one found.
pub fn validate(doc: &Value) -> Result<(), ConfigError> {
    let schema = fabric_cfg_schema();
    let validator = jsonschema::draft202012::options()
        .build(&schema)
        .map_err(|e| ConfigError::InvalidSchema(e.to_string()))?;

    let violations: Vec<SchemaViolation> = validator
        .iter_errors(doc)
        .map(|e| SchemaViolation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Schema(violations))
    }
}
