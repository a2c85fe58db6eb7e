//! Fabric provisioning pipeline for fabricadm.
//!
//! This crate ties the schema layer and the control-plane collaborators into
//! `FabricsPipeline`: an ordered, fail-fast sequence of idempotent stages that
//! provisions the overlay-control and NAT services, installs the metadata
//! schema, validates the operator's fabric configuration against live network
//! state, persists it into the application metadata, and propagates the change
//! to the services that consume it. Every failure is classified at its point
//! of origin into the [`CoreError`] taxonomy.

pub mod backend;
pub mod classify;
pub mod config;
pub mod dependent;
pub mod infra;
pub mod persist;
pub mod pipeline;
pub mod propagate;
pub mod provision;

pub use backend::{select_backend, Collaborators};
pub use classify::{classify_lookup, is_user_error};
pub use config::{ToolConfig, ToolConfigError};
pub use dependent::DependentServiceDetector;
pub use infra::InfrastructureChecker;
pub use persist::{ConfigPersistence, PersistOutcome, SchemaInitializer};
pub use pipeline::{
    FabricsPipeline, NoopObserver, PipelineContext, PipelineOptions, PipelineReport,
    ServiceReport, Stage, StageObserver,
};
pub use propagate::{FixedDelay, PropagationCoordinator, ReadinessWait};
pub use provision::{latest_image, Datacenter, ProvisionOutcome, ServiceProvisioner, ServiceTemplate};

use fabricadm_remote::RemoteError;
use fabricadm_schema::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The operator's input is wrong and can be corrected by them.
    #[error("validation error: {0}")]
    Validation(String),
    /// A control-plane collaborator failed.
    #[error("client error ({service}): {source}")]
    Client {
        service: String,
        #[source]
        source: RemoteError,
    },
    /// The deployment does not meet the tool's prerequisites.
    #[error("internal error: {0}")]
    Internal(String),
    /// A required image is not available from the update registry.
    #[error("update error: {0}")]
    Update(String),
}

impl CoreError {
    pub fn client(service: &str, source: RemoteError) -> Self {
        Self::Client {
            service: service.to_owned(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Validation(err.to_string())
    }
}
