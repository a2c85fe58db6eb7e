use crate::CoreError;
use fabricadm_remote::{Application, ApplicationStore};
use fabricadm_schema::{fabric_cfg_schema, metadata_schema, FabricConfig, FABRIC_CFG_KEY};
use serde::Serialize;
use serde_json::Map;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Operator hint emitted when a stored configuration is left in place.
pub const RECONFIGURE_NOTICE: &str =
    "fabric configuration already exists; re-run with --reconfigure to replace it";

/// Result of [`ConfigPersistence::persist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistOutcome {
    /// No configuration was stored; it has been written.
    Created,
    /// A different configuration was stored and has been replaced.
    Replaced,
    /// Overwriting was allowed but the stored configuration already equals
    /// the new one.
    Unchanged,
    /// A configuration is stored and overwriting was not allowed.
    Kept,
}

impl PersistOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Created | Self::Replaced)
    }

    /// Notice for the operator, if this outcome needs one.
    pub fn notice(self) -> Option<&'static str> {
        match self {
            Self::Kept => Some(RECONFIGURE_NOTICE),
            _ => None,
        }
    }
}

impl fmt::Display for PersistOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Replaced => write!(f, "replaced"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Kept => write!(f, "kept"),
        }
    }
}

/// Writes the fabric configuration into the application metadata.
pub struct ConfigPersistence {
    applications: Arc<dyn ApplicationStore>,
}

impl ConfigPersistence {
    pub fn new(applications: Arc<dyn ApplicationStore>) -> Self {
        Self { applications }
    }

    /// Store `config` under `fabric_cfg`, replacing the value whole.
    ///
    /// Any stored configuration is left alone unless `allow_overwrite` is
    /// set; an identical one is never rewritten.
    pub fn persist(
        &self,
        app: &Application,
        config: &FabricConfig,
        allow_overwrite: bool,
    ) -> Result<PersistOutcome, CoreError> {
        let desired = config.to_value()?;
        let outcome = match app.metadata.get(FABRIC_CFG_KEY) {
            Some(_) if !allow_overwrite => PersistOutcome::Kept,
            Some(current) if *current == desired => PersistOutcome::Unchanged,
            Some(_) => PersistOutcome::Replaced,
            None => PersistOutcome::Created,
        };

        match outcome {
            PersistOutcome::Unchanged => {
                debug!("stored fabric configuration is up to date");
            }
            PersistOutcome::Kept => {
                info!("{RECONFIGURE_NOTICE}");
            }
            PersistOutcome::Created | PersistOutcome::Replaced => {
                let mut patch = Map::new();
                patch.insert(FABRIC_CFG_KEY.to_owned(), desired);
                self.applications
                    .update_metadata(&app.uuid, &patch)
                    .map_err(|e| CoreError::client("sapi", e))?;
                info!("fabric configuration {outcome}");
            }
        }
        Ok(outcome)
    }
}

/// Installs the fixed metadata schema on the application.
pub struct SchemaInitializer {
    applications: Arc<dyn ApplicationStore>,
}

impl SchemaInitializer {
    pub fn new(applications: Arc<dyn ApplicationStore>) -> Self {
        Self { applications }
    }

    /// Replace the whole metadata schema unless its `fabric_cfg` sub-schema
    /// already equals the fixed one. Returns whether an update was issued.
    pub fn ensure_schema(&self, app: &Application) -> Result<bool, CoreError> {
        let current = app
            .metadata_schema
            .get("properties")
            .and_then(|p| p.get(FABRIC_CFG_KEY));
        if current == Some(&fabric_cfg_schema()) {
            debug!("metadata schema already current");
            return Ok(false);
        }
        info!("updating application metadata schema");
        self.applications
            .update_metadata_schema(&app.uuid, &metadata_schema())
            .map_err(|e| CoreError::client("sapi", e))?;
        Ok(true)
    }
}
