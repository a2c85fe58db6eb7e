//! Control-plane collaborators for fabric provisioning.
//!
//! This crate defines the collaborator contracts the provisioning pipeline
//! depends on (application store, service registry, package catalog, image
//! registry and store, network API, image import, startup script, remote
//! commands, node identity), the wire records they exchange, blocking HTTP
//! clients for the real control-plane APIs, process-backed collaborators, and
//! an in-memory `MockDatacenter` implementing every contract.

pub mod config;
pub mod http;
pub mod imgapi;
pub mod mock;
pub mod napi;
pub mod papi;
pub mod process;
pub mod sapi;
pub mod types;

pub use config::RemoteConfig;
pub use mock::MockDatacenter;
pub use types::{
    Application, ApplicationDefaults, Image, ImageFilter, Instance, InstanceFilter,
    InstancePayload, Network, NetworkPool, NicTag, Package, PackageFilter, Service,
    ServiceFilter, ServicePayload,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Error code the control-plane APIs use for missing resources.
pub const CODE_NOT_FOUND: &str = "ResourceNotFound";
/// Error code the control-plane APIs use for rejected request parameters.
pub const CODE_INVALID_PARAMETERS: &str = "InvalidParameters";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{service} request failed (HTTP {status}): {error}")]
    Api {
        service: String,
        status: u16,
        error: ApiError,
    },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ambiguous result: {0}")]
    Ambiguous(String),
    #[error("command '{command}' failed on service '{service}': {message}")]
    Command {
        service: String,
        command: String,
        message: String,
    },
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("remote config error: {0}")]
    Config(String),
}

impl RemoteError {
    pub fn api(service: &str, status: u16, error: ApiError) -> Self {
        Self::Api {
            service: service.to_owned(),
            status,
            error,
        }
    }

    /// True when the response says the requested resource does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { status, error, .. } => *status == 404 || error.code == CODE_NOT_FOUND,
            _ => false,
        }
    }

    /// Field names cited by an invalid-parameters response, or `None` for any
    /// other kind of failure.
    pub fn invalid_parameter_fields(&self) -> Option<Vec<&str>> {
        match self {
            Self::Api { error, .. } if error.code == CODE_INVALID_PARAMETERS => {
                Some(error.errors.iter().map(|e| e.field.as_str()).collect())
            }
            _ => None,
        }
    }
}

/// Decoded error body returned by the control-plane APIs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: CODE_NOT_FOUND.to_owned(),
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn invalid_parameters(message: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            code: CODE_INVALID_PARAMETERS.to_owned(),
            message: message.into(),
            errors: fields
                .iter()
                .map(|f| FieldError {
                    field: (*f).to_owned(),
                    code: "Invalid".to_owned(),
                    message: format!("invalid {f}"),
                })
                .collect(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code.is_empty(), self.message.is_empty()) {
            (false, false) => write!(f, "{}: {}", self.code, self.message)?,
            (false, true) => write!(f, "{}", self.code)?,
            (true, false) => write!(f, "{}", self.message)?,
            (true, true) => write!(f, "unknown error")?,
        }
        if !self.errors.is_empty() {
            let fields: Vec<&str> = self.errors.iter().map(|e| e.field.as_str()).collect();
            write!(f, " (fields: {})", fields.join(", "))?;
        }
        Ok(())
    }
}

/// A per-field entry of an invalid-parameters error body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Identity of the compute node the tool runs against.
pub trait NodeResolver: Send + Sync {
    fn current_node_id(&self) -> Result<String, RemoteError>;
}

/// The shared per-datacenter application record.
pub trait ApplicationStore: Send + Sync {
    /// Return the application named by `defaults`, creating it if absent.
    fn ensure_singleton(&self, defaults: &ApplicationDefaults)
        -> Result<Application, RemoteError>;

    /// Set the given top-level metadata keys, replacing each key's value whole.
    fn update_metadata(
        &self,
        app_uuid: &str,
        patch: &Map<String, Value>,
    ) -> Result<Application, RemoteError>;

    /// Replace the application metadata schema.
    fn update_metadata_schema(
        &self,
        app_uuid: &str,
        schema: &Value,
    ) -> Result<Application, RemoteError>;
}

pub trait ServiceRegistry: Send + Sync {
    fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<Service>, RemoteError>;

    fn create_service(
        &self,
        name: &str,
        app_uuid: &str,
        payload: &ServicePayload,
    ) -> Result<Service, RemoteError>;

    /// Set the given top-level metadata keys on a service.
    fn update_service(
        &self,
        service_uuid: &str,
        metadata: &Map<String, Value>,
    ) -> Result<Service, RemoteError>;

    fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<Instance>, RemoteError>;

    fn create_instance(
        &self,
        service_uuid: &str,
        payload: &InstancePayload,
    ) -> Result<Instance, RemoteError>;
}

pub trait PackageCatalog: Send + Sync {
    fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>, RemoteError>;
}

/// The remote update-image registry.
pub trait ImageRegistry: Send + Sync {
    /// List images matching `filter`. Response order is not relied upon.
    fn list_images(&self, filter: &ImageFilter) -> Result<Vec<Image>, RemoteError>;
}

/// The datacenter-local image store.
pub trait ImageStore: Send + Sync {
    /// Fetch a local image; a missing image is an error for which
    /// [`RemoteError::is_not_found`] holds.
    fn get_image(&self, uuid: &str) -> Result<Image, RemoteError>;
}

/// Download images from the update registry into the local store, returning
/// once every image is usable.
pub trait ImageImporter: Send + Sync {
    fn import(&self, images: &[Image]) -> Result<(), RemoteError>;
}

pub trait NetworkApi: Send + Sync {
    fn get_nic_tag(&self, name: &str) -> Result<NicTag, RemoteError>;

    fn get_network_pool(&self, id: &str) -> Result<NetworkPool, RemoteError>;

    fn get_network(&self, uuid: &str) -> Result<Network, RemoteError>;
}

/// Source of the shared startup script installed on core services.
pub trait ScriptResolver: Send + Sync {
    fn user_script(&self) -> Result<String, RemoteError>;
}

/// Run a command inside the zone of a named core service.
pub trait CommandRunner: Send + Sync {
    fn run(&self, service: &str, command: &str) -> Result<(), RemoteError>;
}
