use crate::propagate::{DEFAULT_RELOAD_COMMAND, DEFAULT_SETTLE};
use crate::provision::Datacenter;
use crate::CoreError;
use fabricadm_remote::imgapi::ImportPolling;
use fabricadm_remote::RemoteConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the tool configuration file.
pub const CONFIG_ENV: &str = "FABRICADM_CONFIG";

pub const DEFAULT_USER_SCRIPT: &str = "/usbkey/default/user-script.common";
pub const DEFAULT_LOGIN_COMMAND: &str = "sdc-login -l {service} {command}";

#[derive(Debug, Error)]
pub enum ToolConfigError {
    #[error("failed to read tool configuration '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid tool configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("tool configuration is missing {0}")]
    Missing(String),
    #[error("invalid tool configuration: {0}")]
    Invalid(String),
}

impl From<ToolConfigError> for CoreError {
    fn from(err: ToolConfigError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Tool configuration, read from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// `http` for the real control plane, `mock` for an in-memory datacenter.
    #[serde(default = "default_backend")]
    pub backend: String,
    pub datacenter_name: String,
    pub dns_domain: String,
    pub admin_uuid: String,
    #[serde(default = "default_user_script")]
    pub user_script: PathBuf,
    #[serde(default)]
    pub endpoints: Option<RemoteConfig>,
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub propagation: PropagationSettings,
    #[serde(default)]
    pub imports: ImportSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSettings {
    /// Fixed node identity; resolved with `sysinfo` when unset.
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropagationSettings {
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_reload_command")]
    pub command: String,
    /// Template with `{service}` and `{command}` placeholders.
    #[serde(default = "default_login_command")]
    pub login_command: String,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
            command: default_reload_command(),
            login_command: default_login_command(),
        }
    }
}

impl PropagationSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportSettings {
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_import_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            timeout_secs: default_import_timeout_secs(),
        }
    }
}

impl ImportSettings {
    pub fn polling(&self) -> ImportPolling {
        ImportPolling {
            interval: Duration::from_secs(self.poll_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn default_backend() -> String {
    "http".to_owned()
}

fn default_user_script() -> PathBuf {
    PathBuf::from(DEFAULT_USER_SCRIPT)
}

fn default_settle_secs() -> u64 {
    DEFAULT_SETTLE.as_secs()
}

fn default_reload_command() -> String {
    DEFAULT_RELOAD_COMMAND.to_owned()
}

fn default_login_command() -> String {
    DEFAULT_LOGIN_COMMAND.to_owned()
}

fn default_poll_secs() -> u64 {
    2
}

fn default_import_timeout_secs() -> u64 {
    600
}

impl ToolConfig {
    pub fn parse(input: &str) -> Result<Self, ToolConfigError> {
        let config: Self = toml::from_str(input)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ToolConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ToolConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// `explicit`, else `$FABRICADM_CONFIG`, else
    /// `~/.config/fabricadm/config.toml`.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ToolConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let home = std::env::var_os("HOME")
            .ok_or_else(|| ToolConfigError::Missing(format!("HOME (or set {CONFIG_ENV})")))?;
        Ok(PathBuf::from(home).join(".config/fabricadm/config.toml"))
    }

    fn check(&self) -> Result<(), ToolConfigError> {
        for (key, value) in [
            ("datacenter_name", &self.datacenter_name),
            ("dns_domain", &self.dns_domain),
            ("admin_uuid", &self.admin_uuid),
        ] {
            if value.trim().is_empty() {
                return Err(ToolConfigError::Missing(key.to_owned()));
            }
        }
        match self.backend.as_str() {
            "http" if self.endpoints.is_none() => {
                Err(ToolConfigError::Missing("[endpoints]".to_owned()))
            }
            "http" | "mock" => Ok(()),
            other => Err(ToolConfigError::Invalid(format!(
                "unknown backend '{other}' (expected 'http' or 'mock')"
            ))),
        }
    }

    pub fn datacenter(&self) -> Datacenter {
        Datacenter {
            name: self.datacenter_name.clone(),
            dns_domain: self.dns_domain.clone(),
            admin_uuid: self.admin_uuid.clone(),
        }
    }

    /// Normalized endpoint URLs.
    pub fn endpoints(&self) -> Result<RemoteConfig, ToolConfigError> {
        self.endpoints
            .clone()
            .map(RemoteConfig::normalized)
            .ok_or_else(|| ToolConfigError::Missing("[endpoints]".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTTP: &str = r#"
datacenter_name = "us-east-1"
dns_domain = "example.com"
admin_uuid = "930896af-bf8c-48d4-885c-6573a94b1853"

[endpoints]
sapi = "http://sapi.us-east-1.example.com/"
napi = "http://napi.us-east-1.example.com"
papi = "http://papi.us-east-1.example.com"
imgapi = "http://imgapi.us-east-1.example.com"
updates = "https://updates.example.com/"
"#;

    #[test]
    fn http_config_with_defaults() {
        let cfg = ToolConfig::parse(HTTP).unwrap();
        assert_eq!(cfg.backend, "http");
        assert_eq!(cfg.user_script, PathBuf::from(DEFAULT_USER_SCRIPT));
        assert_eq!(cfg.propagation.settle(), DEFAULT_SETTLE);
        assert_eq!(cfg.propagation.command, DEFAULT_RELOAD_COMMAND);
        assert_eq!(cfg.propagation.login_command, DEFAULT_LOGIN_COMMAND);
        assert_eq!(cfg.imports.polling(), ImportPolling::default());
        assert!(cfg.node.uuid.is_none());

        let endpoints = cfg.endpoints().unwrap();
        assert_eq!(endpoints.sapi, "http://sapi.us-east-1.example.com");
        assert_eq!(endpoints.updates, "https://updates.example.com");
        assert_eq!(endpoints.timeout_secs, 30);
    }

    #[test]
    fn datacenter_from_config() {
        let dc = ToolConfig::parse(HTTP).unwrap().datacenter();
        assert_eq!(dc.service_domain("nat"), "nat.us-east-1.example.com");
    }

    #[test]
    fn mock_backend_needs_no_endpoints() {
        let cfg = ToolConfig::parse(
            r#"
backend = "mock"
datacenter_name = "coal"
dns_domain = "example.com"
admin_uuid = "admin"

[propagation]
settle_secs = 0

[node]
uuid = "node-1"
"#,
        )
        .unwrap();
        assert_eq!(cfg.backend, "mock");
        assert_eq!(cfg.propagation.settle(), Duration::ZERO);
        assert_eq!(cfg.node.uuid.as_deref(), Some("node-1"));
    }

    #[test]
    fn http_backend_requires_endpoints() {
        let err = ToolConfig::parse(
            "datacenter_name = \"coal\"\ndns_domain = \"example.com\"\nadmin_uuid = \"a\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ToolConfigError::Missing(ref k) if k == "[endpoints]"));
    }

    #[test]
    fn missing_required_key() {
        let err = ToolConfig::parse("backend = \"mock\"\ndns_domain = \"x\"\nadmin_uuid = \"a\"\n")
            .unwrap_err();
        assert!(matches!(err, ToolConfigError::Parse(_)));
    }

    #[test]
    fn blank_required_key() {
        let err = ToolConfig::parse(
            "backend = \"mock\"\ndatacenter_name = \" \"\ndns_domain = \"x\"\nadmin_uuid = \"a\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ToolConfigError::Missing(ref k) if k == "datacenter_name"));
    }

    #[test]
    fn unknown_backend_rejected() {
        let err = ToolConfig::parse(
            "backend = \"grpc\"\ndatacenter_name = \"c\"\ndns_domain = \"x\"\nadmin_uuid = \"a\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown backend 'grpc'"));
    }

    #[test]
    fn unknown_key_rejected() {
        let input = format!("{HTTP}\n[extra]\nfoo = 1\n");
        assert!(matches!(
            ToolConfig::parse(&input),
            Err(ToolConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, HTTP).unwrap();
        assert_eq!(ToolConfig::load(&path).unwrap().datacenter_name, "us-east-1");
        assert!(matches!(
            ToolConfig::load(&dir.path().join("missing.toml")),
            Err(ToolConfigError::Io { .. })
        ));
    }

    #[test]
    fn explicit_path_wins() {
        let p = ToolConfig::resolve_path(Some(Path::new("/etc/fabricadm.toml"))).unwrap();
        assert_eq!(p, PathBuf::from("/etc/fabricadm.toml"));
    }

    #[test]
    fn errors_become_internal() {
        let err: CoreError = ToolConfigError::Missing("admin_uuid".to_owned()).into();
        assert!(matches!(err, CoreError::Internal(_)));
    }
}
