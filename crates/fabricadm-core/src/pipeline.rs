use crate::backend::Collaborators;
use crate::config::ToolConfig;
use crate::dependent::DependentServiceDetector;
use crate::infra::InfrastructureChecker;
use crate::persist::{ConfigPersistence, PersistOutcome, SchemaInitializer};
use crate::propagate::{FixedDelay, PropagationCoordinator};
use crate::provision::{Datacenter, ProvisionOutcome, ServiceProvisioner, ServiceTemplate};
use crate::CoreError;
use fabricadm_remote::{Application, NodeResolver};
use fabricadm_schema::{read_config_file, FabricConfig, FABRIC_CFG_KEY};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ResolveNode,
    ProvisionPrimary,
    ProvisionNat,
    EnsureSchema,
    LoadConfig,
    ValidateSchema,
    CheckTag,
    CheckAssignment,
    CheckNatPool,
    PersistConfig,
    DetectDependent,
    Propagate,
}

impl Stage {
    pub const ALL: [Self; 12] = [
        Self::ResolveNode,
        Self::ProvisionPrimary,
        Self::ProvisionNat,
        Self::EnsureSchema,
        Self::LoadConfig,
        Self::ValidateSchema,
        Self::CheckTag,
        Self::CheckAssignment,
        Self::CheckNatPool,
        Self::PersistConfig,
        Self::DetectDependent,
        Self::Propagate,
    ];

    /// Human-readable progress label.
    pub fn description(self) -> &'static str {
        match self {
            Self::ResolveNode => "resolving headnode",
            Self::ProvisionPrimary => "provisioning portolan service",
            Self::ProvisionNat => "provisioning nat service",
            Self::EnsureSchema => "updating metadata schema",
            Self::LoadConfig => "reading fabric configuration",
            Self::ValidateSchema => "validating fabric configuration",
            Self::CheckTag => "checking underlay nic tag",
            Self::CheckAssignment => "checking underlay assignment",
            Self::CheckNatPool => "checking NAT pool",
            Self::PersistConfig => "storing fabric configuration",
            Self::DetectDependent => "detecting docker service",
            Self::Propagate => "restarting config agents",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolveNode => "resolve-node",
            Self::ProvisionPrimary => "provision-primary",
            Self::ProvisionNat => "provision-nat",
            Self::EnsureSchema => "ensure-schema",
            Self::LoadConfig => "load-config",
            Self::ValidateSchema => "validate-schema",
            Self::CheckTag => "check-tag",
            Self::CheckAssignment => "check-assignment",
            Self::CheckNatPool => "check-nat-pool",
            Self::PersistConfig => "persist-config",
            Self::DetectDependent => "detect-dependent",
            Self::Propagate => "propagate",
        };
        f.write_str(name)
    }
}

/// Progress callbacks, one triple per stage.
pub trait StageObserver {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_finished(&self, _stage: Stage) {}
    fn stage_failed(&self, _stage: Stage, _err: &CoreError) {}
}

pub struct NoopObserver;

impl StageObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub config_path: PathBuf,
    /// Replace a stored configuration that differs from the new one.
    pub allow_overwrite: bool,
}

/// State accumulated stage by stage during one run.
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub node_id: Option<String>,
    pub application: Option<Application>,
    pub primary: Option<ProvisionOutcome>,
    pub nat: Option<ProvisionOutcome>,
    pub schema_updated: bool,
    pub document: Option<Value>,
    pub config: Option<FabricConfig>,
    pub persisted: Option<PersistOutcome>,
    pub dependent_present: bool,
    pub restarted: Vec<String>,
}

fn required<'a, T>(value: &'a Option<T>, what: &str) -> Result<&'a T, CoreError> {
    value
        .as_ref()
        .ok_or_else(|| CoreError::Internal(format!("pipeline stage ran before {what} was resolved")))
}

impl PipelineContext {
    fn node_id(&self) -> Result<&str, CoreError> {
        required(&self.node_id, "the node").map(String::as_str)
    }

    fn application(&self) -> Result<&Application, CoreError> {
        required(&self.application, "the application")
    }

    fn document(&self) -> Result<&Value, CoreError> {
        required(&self.document, "the configuration document")
    }

    fn config(&self) -> Result<&FabricConfig, CoreError> {
        required(&self.config, "the configuration")
    }

    fn changed(&self) -> bool {
        self.persisted.is_some_and(PersistOutcome::changed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub name: String,
    pub service_uuid: String,
    pub service_created: bool,
    pub instance_uuid: String,
    pub instance_created: bool,
    pub image_uuid: String,
    pub image_version: String,
    pub image_imported: bool,
}

impl ServiceReport {
    fn from_outcome(outcome: &ProvisionOutcome) -> Self {
        Self {
            name: outcome.service.name.clone(),
            service_uuid: outcome.service.uuid.clone(),
            service_created: outcome.service_created,
            instance_uuid: outcome.instance.uuid.clone(),
            instance_created: outcome.instance_created,
            image_uuid: outcome.image.uuid.clone(),
            image_version: outcome.image.version.clone(),
            image_imported: outcome.image_imported,
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub node_id: String,
    pub services: Vec<ServiceReport>,
    pub schema_updated: bool,
    pub config: PersistOutcome,
    pub config_changed: bool,
    pub dependent_present: bool,
    pub restarted: Vec<String>,
    pub notices: Vec<String>,
}

/// Ordered, fail-fast fabric setup.
///
/// Each stage is idempotent, so a run that failed part way is resumed by
/// running again. Nothing is rolled back.
pub struct FabricsPipeline {
    node: Arc<dyn NodeResolver>,
    provisioner: ServiceProvisioner,
    schema: SchemaInitializer,
    infra: InfrastructureChecker,
    persistence: ConfigPersistence,
    detector: DependentServiceDetector,
    propagation: PropagationCoordinator,
}

impl FabricsPipeline {
    pub fn new(
        collaborators: &Collaborators,
        datacenter: Datacenter,
        propagation: PropagationCoordinator,
    ) -> Self {
        Self {
            node: Arc::clone(&collaborators.node),
            provisioner: ServiceProvisioner::new(collaborators, datacenter),
            schema: SchemaInitializer::new(Arc::clone(&collaborators.applications)),
            infra: InfrastructureChecker::new(Arc::clone(&collaborators.network)),
            persistence: ConfigPersistence::new(Arc::clone(&collaborators.applications)),
            detector: DependentServiceDetector::new(Arc::clone(&collaborators.services)),
            propagation,
        }
    }

    /// Pipeline with propagation configured from the tool configuration.
    pub fn from_config(collaborators: &Collaborators, config: &ToolConfig) -> Self {
        let propagation = PropagationCoordinator::new(
            Arc::clone(&collaborators.commands),
            Arc::new(FixedDelay(config.propagation.settle())),
        )
        .with_command(&config.propagation.command);
        Self::new(collaborators, config.datacenter(), propagation)
    }

    pub fn run(
        &self,
        options: &PipelineOptions,
        observer: &dyn StageObserver,
    ) -> Result<PipelineReport, CoreError> {
        let mut ctx = PipelineContext::default();
        for stage in Stage::ALL {
            observer.stage_started(stage);
            match self.run_stage(stage, &mut ctx, options) {
                Ok(()) => observer.stage_finished(stage),
                Err(e) => {
                    warn!("stage {stage} failed: {e}");
                    observer.stage_failed(stage, &e);
                    return Err(e);
                }
            }
        }
        Self::report(&ctx)
    }

    fn run_stage(
        &self,
        stage: Stage,
        ctx: &mut PipelineContext,
        options: &PipelineOptions,
    ) -> Result<(), CoreError> {
        match stage {
            Stage::ResolveNode => {
                let node_id = self
                    .node
                    .current_node_id()
                    .map_err(|e| CoreError::client("sysinfo", e))?;
                info!("headnode is {node_id}");
                ctx.node_id = Some(node_id);
            }
            Stage::ProvisionPrimary => {
                let outcome = self
                    .provisioner
                    .ensure(&ServiceTemplate::portolan(), ctx.node_id()?)?;
                ctx.application = Some(outcome.application.clone());
                ctx.primary = Some(outcome);
            }
            Stage::ProvisionNat => {
                let outcome = self
                    .provisioner
                    .ensure(&ServiceTemplate::nat(), ctx.node_id()?)?;
                ctx.application = Some(outcome.application.clone());
                ctx.nat = Some(outcome);
            }
            Stage::EnsureSchema => {
                ctx.schema_updated = self.schema.ensure_schema(ctx.application()?)?;
            }
            Stage::LoadConfig => {
                let path = &options.config_path;
                info!("reading fabric configuration from {}", path.display());
                ctx.document = Some(read_config_file(path)?);
            }
            Stage::ValidateSchema => {
                ctx.config = Some(FabricConfig::from_document(ctx.document()?)?);
            }
            Stage::CheckTag => {
                self.infra.check_tag(ctx.config()?)?;
            }
            Stage::CheckAssignment => {
                self.infra.check_assignment(ctx.config()?)?;
            }
            Stage::CheckNatPool => {
                self.infra.check_nat_pool(ctx.config()?)?;
            }
            Stage::PersistConfig => {
                let outcome = self.persistence.persist(
                    ctx.application()?,
                    ctx.config()?,
                    options.allow_overwrite,
                )?;
                ctx.persisted = Some(outcome);
            }
            Stage::DetectDependent => {
                ctx.dependent_present = self.detector.detect(ctx.application()?)?;
            }
            Stage::Propagate => {
                ctx.restarted = self
                    .propagation
                    .propagate(ctx.changed(), ctx.dependent_present)?;
            }
        }
        Ok(())
    }

    fn report(ctx: &PipelineContext) -> Result<PipelineReport, CoreError> {
        let config = *required(&ctx.persisted, "the persisted configuration")?;
        let services = [&ctx.primary, &ctx.nat]
            .into_iter()
            .flatten()
            .map(ServiceReport::from_outcome)
            .collect();
        Ok(PipelineReport {
            node_id: ctx.node_id()?.to_owned(),
            services,
            schema_updated: ctx.schema_updated,
            config,
            config_changed: config.changed(),
            dependent_present: ctx.dependent_present,
            restarted: ctx.restarted.clone(),
            notices: config.notice().map(str::to_owned).into_iter().collect(),
        })
    }

    /// Load, schema-validate and cross-check a configuration file without
    /// touching the control plane's state.
    pub fn validate(
        &self,
        path: &Path,
        observer: &dyn StageObserver,
    ) -> Result<FabricConfig, CoreError> {
        let options = PipelineOptions {
            config_path: path.to_path_buf(),
            allow_overwrite: false,
        };
        let mut ctx = PipelineContext::default();
        for stage in [
            Stage::LoadConfig,
            Stage::ValidateSchema,
            Stage::CheckTag,
            Stage::CheckAssignment,
            Stage::CheckNatPool,
        ] {
            observer.stage_started(stage);
            if let Err(e) = self.run_stage(stage, &mut ctx, &options) {
                observer.stage_failed(stage, &e);
                return Err(e);
            }
            observer.stage_finished(stage);
        }
        ctx.config
            .ok_or_else(|| CoreError::Internal("validation produced no configuration".to_owned()))
    }

    /// The stored `fabric_cfg` value, if any.
    pub fn current_config(&self) -> Result<Option<Value>, CoreError> {
        let app = self.provisioner.ensure_application()?;
        Ok(app.metadata.get(FABRIC_CFG_KEY).cloned())
    }
}
