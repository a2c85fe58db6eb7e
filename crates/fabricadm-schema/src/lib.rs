//! Fabric configuration document, schema, and validation for fabricadm.
//!
//! This crate defines the schema layer: the operator-authored `FabricConfig`
//! document, the fixed fabric-configuration JSON schema and the application
//! metadata schema that embeds it, the schema validator, and JSON file loading.

pub mod config;
pub mod schema;

pub use config::{
    parse_config_str, read_config_file, ConfigError, FabricConfig, UnderlayAssignment,
};
pub use schema::{
    fabric_cfg_schema, metadata_schema, validate, SchemaViolation, FABRIC_CFG_KEY, MAX_MTU,
    MIN_MTU,
};
