use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The per-datacenter application record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub owner_uuid: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub metadata_schema: Map<String, Value>,
}

/// Attributes used when the application has to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDefaults {
    pub name: String,
    pub owner_uuid: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub uuid: String,
    pub name: String,
    pub application_uuid: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: String,
    pub service_uuid: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Instance {
    pub fn alias(&self) -> Option<&str> {
        self.params.get("alias").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub max_physical_memory: Option<u64>,
    #[serde(default)]
    pub quota: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
}

impl Image {
    pub fn is_active(&self) -> bool {
        matches!(self.state.as_deref(), None | Some("active"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicTag {
    pub name: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub mtu: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPool {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub nic_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub nic_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFilter {
    pub name: String,
    pub application_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFilter {
    pub service_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFilter {
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFilter {
    pub name: String,
}

/// Body of a service creation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePayload {
    pub params: Map<String, Value>,
    pub metadata: Map<String, Value>,
}

/// Body of an instance creation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstancePayload {
    pub params: Map<String, Value>,
}
