use crate::config::{ToolConfig, ToolConfigError};
use fabricadm_remote::imgapi::{ImgapiClient, UpdatesClient};
use fabricadm_remote::napi::NapiClient;
use fabricadm_remote::papi::PapiClient;
use fabricadm_remote::process::{
    FileScriptResolver, LoginCommandRunner, StaticNodeResolver, SysinfoResolver,
};
use fabricadm_remote::sapi::SapiClient;
use fabricadm_remote::{
    ApplicationStore, CommandRunner, ImageImporter, ImageRegistry, ImageStore, MockDatacenter,
    NetworkApi, NodeResolver, PackageCatalog, ScriptResolver, ServiceRegistry,
};
use std::sync::Arc;

/// Every collaborator the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub node: Arc<dyn NodeResolver>,
    pub applications: Arc<dyn ApplicationStore>,
    pub services: Arc<dyn ServiceRegistry>,
    pub packages: Arc<dyn PackageCatalog>,
    pub image_registry: Arc<dyn ImageRegistry>,
    pub image_store: Arc<dyn ImageStore>,
    pub importer: Arc<dyn ImageImporter>,
    pub network: Arc<dyn NetworkApi>,
    pub scripts: Arc<dyn ScriptResolver>,
    pub commands: Arc<dyn CommandRunner>,
}

impl Collaborators {
    /// Wire every collaborator to one in-memory datacenter.
    pub fn from_mock(dc: &Arc<MockDatacenter>) -> Self {
        Self {
            node: dc.clone(),
            applications: dc.clone(),
            services: dc.clone(),
            packages: dc.clone(),
            image_registry: dc.clone(),
            image_store: dc.clone(),
            importer: dc.clone(),
            network: dc.clone(),
            scripts: dc.clone(),
            commands: dc.clone(),
        }
    }

    /// The real control plane: HTTP clients plus headnode processes.
    pub fn from_http(config: &ToolConfig) -> Result<Self, ToolConfigError> {
        let endpoints = config.endpoints()?;
        let sapi = Arc::new(SapiClient::new(&endpoints));
        let imgapi = Arc::new(ImgapiClient::new(&endpoints, config.imports.polling()));
        let node: Arc<dyn NodeResolver> = match &config.node.uuid {
            Some(uuid) => Arc::new(StaticNodeResolver(uuid.clone())),
            None => Arc::new(SysinfoResolver::default()),
        };
        let commands = LoginCommandRunner::new(&config.propagation.login_command)
            .map_err(|e| ToolConfigError::Invalid(e.to_string()))?;
        Ok(Self {
            node,
            applications: sapi.clone(),
            services: sapi,
            packages: Arc::new(PapiClient::new(&endpoints)),
            image_registry: Arc::new(UpdatesClient::new(&endpoints)),
            image_store: imgapi.clone(),
            importer: imgapi,
            network: Arc::new(NapiClient::new(&endpoints)),
            scripts: Arc::new(FileScriptResolver::new(&config.user_script)),
            commands: Arc::new(commands),
        })
    }
}

/// Build the collaborators named by `config.backend`.
pub fn select_backend(config: &ToolConfig) -> Result<Collaborators, ToolConfigError> {
    match config.backend.as_str() {
        "http" => Collaborators::from_http(config),
        "mock" => {
            let dc = Arc::new(MockDatacenter::seeded());
            if let Some(uuid) = &config.node.uuid {
                dc.set_node_id(uuid);
            }
            Ok(Collaborators::from_mock(&dc))
        }
        other => Err(ToolConfigError::Invalid(format!("unknown backend '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: &str, extra: &str) -> ToolConfig {
        ToolConfig::parse(&format!(
            "backend = \"{backend}\"\ndatacenter_name = \"coal\"\ndns_domain = \"example.com\"\n\
             admin_uuid = \"admin\"\n{extra}"
        ))
        .unwrap()
    }

    #[test]
    fn select_mock_backend() {
        let c = select_backend(&config("mock", "[node]\nuuid = \"node-7\"\n")).unwrap();
        assert_eq!(c.node.current_node_id().unwrap(), "node-7");
    }

    #[test]
    fn select_http_backend() {
        let c = select_backend(&config(
            "http",
            "[node]\nuuid = \"node-1\"\n[endpoints]\nsapi = \"http://127.0.0.1:1\"\n\
             napi = \"http://127.0.0.1:1\"\npapi = \"http://127.0.0.1:1\"\n\
             imgapi = \"http://127.0.0.1:1\"\nupdates = \"http://127.0.0.1:1\"\n",
        ))
        .unwrap();
        assert_eq!(c.node.current_node_id().unwrap(), "node-1");
    }

    #[test]
    fn bad_login_template_rejected() {
        let cfg = config(
            "http",
            "[propagation]\nlogin_command = \"sdc-login {service}\"\n[endpoints]\n\
             sapi = \"x\"\nnapi = \"x\"\npapi = \"x\"\nimgapi = \"x\"\nupdates = \"x\"\n",
        );
        assert!(matches!(
            select_backend(&cfg),
            Err(ToolConfigError::Invalid(_))
        ));
    }
}
