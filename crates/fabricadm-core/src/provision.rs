use crate::backend::Collaborators;
use crate::CoreError;
use chrono::{DateTime, FixedOffset};
use fabricadm_remote::{
    Application, ApplicationDefaults, ApplicationStore, Image, ImageFilter, ImageImporter,
    ImageRegistry, ImageStore, Instance, InstanceFilter, InstancePayload, Package,
    PackageCatalog, PackageFilter, ScriptResolver, Service, ServiceFilter, ServicePayload,
    ServiceRegistry,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the per-datacenter application owning the core services.
pub const APPLICATION_NAME: &str = "sdc";

/// Identity of the datacenter the services are provisioned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datacenter {
    pub name: String,
    pub dns_domain: String,
    pub admin_uuid: String,
}

impl Datacenter {
    /// Service-discovery domain: `<service>.<datacenter>.<dns-domain>`.
    pub fn service_domain(&self, service: &str) -> String {
        format!("{service}.{}.{}", self.name, self.dns_domain)
    }

    pub fn application_defaults(&self) -> ApplicationDefaults {
        let mut metadata = Map::new();
        metadata.insert("datacenter_name".to_owned(), json!(self.name));
        metadata.insert("dns_domain".to_owned(), json!(self.dns_domain));
        ApplicationDefaults {
            name: APPLICATION_NAME.to_owned(),
            owner_uuid: self.admin_uuid.clone(),
            params: Map::new(),
            metadata,
        }
    }
}

/// What a provisioned core service is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTemplate {
    pub name: &'static str,
    pub package: &'static str,
    pub image: &'static str,
}

impl ServiceTemplate {
    /// The overlay-control service.
    pub const fn portolan() -> Self {
        Self {
            name: "portolan",
            package: "sdc_768",
            image: "portolan",
        }
    }

    /// The fabric NAT gateway service.
    pub const fn nat() -> Self {
        Self {
            name: "nat",
            package: "sdc_128",
            image: "nat",
        }
    }

    /// Alias of the single instance: `<name>0`.
    pub fn instance_alias(&self) -> String {
        format!("{}0", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionOutcome {
    pub application: Application,
    pub package: Package,
    pub image: Image,
    pub image_imported: bool,
    pub service: Service,
    pub service_created: bool,
    pub instance: Instance,
    pub instance_created: bool,
}

impl ProvisionOutcome {
    pub fn created(&self) -> bool {
        self.service_created || self.instance_created
    }
}

/// Pick the newest image by `published_at`.
///
/// Images without a parsable RFC 3339 timestamp sort before all timestamped
/// ones and keep their relative order, so with no timestamps at all the last
/// listed image wins.
pub fn latest_image(mut images: Vec<Image>) -> Option<Image> {
    images.sort_by_key(|image| {
        image
            .published_at
            .as_deref()
            .and_then(|t| DateTime::<FixedOffset>::parse_from_rfc3339(t).ok())
    });
    images.pop()
}

/// Ensures a templated core service and its single instance exist.
///
/// Every step checks before it acts, so running `ensure` against an already
/// provisioned datacenter changes nothing.
pub struct ServiceProvisioner {
    applications: Arc<dyn ApplicationStore>,
    services: Arc<dyn ServiceRegistry>,
    packages: Arc<dyn PackageCatalog>,
    image_registry: Arc<dyn ImageRegistry>,
    image_store: Arc<dyn ImageStore>,
    importer: Arc<dyn ImageImporter>,
    scripts: Arc<dyn ScriptResolver>,
    datacenter: Datacenter,
}

impl ServiceProvisioner {
    pub fn new(collaborators: &Collaborators, datacenter: Datacenter) -> Self {
        Self {
            applications: Arc::clone(&collaborators.applications),
            services: Arc::clone(&collaborators.services),
            packages: Arc::clone(&collaborators.packages),
            image_registry: Arc::clone(&collaborators.image_registry),
            image_store: Arc::clone(&collaborators.image_store),
            importer: Arc::clone(&collaborators.importer),
            scripts: Arc::clone(&collaborators.scripts),
            datacenter,
        }
    }

    /// Resolve the shared application record, creating it if absent.
    pub fn ensure_application(&self) -> Result<Application, CoreError> {
        self.applications
            .ensure_singleton(&self.datacenter.application_defaults())
            .map_err(|e| CoreError::client("sapi", e))
    }

    pub fn ensure(
        &self,
        template: &ServiceTemplate,
        node_id: &str,
    ) -> Result<ProvisionOutcome, CoreError> {
        let name = template.name;
        let application = self.ensure_application()?;
        let package = self.resolve_package(template)?;

        let existing = self.find_service(template, &application)?;
        let existing_instance = match &existing {
            Some(service) => self.find_instance(template, service)?,
            None => None,
        };
        debug!(
            "{name}: service {}, instance {}",
            if existing.is_some() { "present" } else { "absent" },
            if existing_instance.is_some() { "present" } else { "absent" }
        );

        let image = self.resolve_image(template)?;
        let image_imported = self.ensure_local_image(&image)?;
        let script = self
            .scripts
            .user_script()
            .map_err(|e| CoreError::Internal(format!("cannot resolve user-script: {e}")))?;

        let (service, service_created) = match existing {
            Some(service) => {
                info!("{name} service already exists ({})", service.uuid);
                (service, false)
            }
            None => {
                info!("creating {name} service");
                let payload = self.service_payload(template, &package, &image, script);
                let service = self
                    .services
                    .create_service(name, &application.uuid, &payload)
                    .map_err(|e| CoreError::client("sapi", e))?;
                info!("created {name} service ({})", service.uuid);
                (service, true)
            }
        };

        let (instance, instance_created) = match existing_instance {
            Some(instance) => {
                info!("{name} instance already exists ({})", instance.uuid);
                (instance, false)
            }
            None => {
                let alias = template.instance_alias();
                info!("creating {name} instance {alias} on {node_id}");
                let mut params = Map::new();
                params.insert("alias".to_owned(), json!(alias));
                params.insert("server_uuid".to_owned(), json!(node_id));
                let instance = self
                    .services
                    .create_instance(&service.uuid, &InstancePayload { params })
                    .map_err(|e| CoreError::client("sapi", e))?;
                info!("created {name} instance ({})", instance.uuid);
                (instance, true)
            }
        };

        Ok(ProvisionOutcome {
            application,
            package,
            image,
            image_imported,
            service,
            service_created,
            instance,
            instance_created,
        })
    }

    fn resolve_package(&self, template: &ServiceTemplate) -> Result<Package, CoreError> {
        let mut packages = self
            .packages
            .list_packages(&PackageFilter {
                name: template.package.to_owned(),
                active: true,
            })
            .map_err(|e| CoreError::client("papi", e))?;
        match packages.len() {
            1 => Ok(packages.remove(0)),
            0 => Err(CoreError::Internal(format!(
                "no active package named '{}' for the {} service",
                template.package, template.name
            ))),
            n => Err(CoreError::Internal(format!(
                "{n} active packages named '{}' for the {} service, expected exactly one",
                template.package, template.name
            ))),
        }
    }

    fn find_service(
        &self,
        template: &ServiceTemplate,
        application: &Application,
    ) -> Result<Option<Service>, CoreError> {
        let mut services = self
            .services
            .list_services(&ServiceFilter {
                name: template.name.to_owned(),
                application_uuid: application.uuid.clone(),
            })
            .map_err(|e| CoreError::client("sapi", e))?;
        match services.len() {
            0 => Ok(None),
            1 => Ok(services.pop()),
            n => Err(CoreError::Internal(format!(
                "{n} services named '{}', expected at most one",
                template.name
            ))),
        }
    }

    fn find_instance(
        &self,
        template: &ServiceTemplate,
        service: &Service,
    ) -> Result<Option<Instance>, CoreError> {
        let mut instances = self
            .services
            .list_instances(&InstanceFilter {
                service_uuid: service.uuid.clone(),
            })
            .map_err(|e| CoreError::client("sapi", e))?;
        match instances.len() {
            0 => Ok(None),
            1 => Ok(instances.pop()),
            n => Err(CoreError::Internal(format!(
                "{n} instances of the {} service, expected at most one",
                template.name
            ))),
        }
    }

    fn resolve_image(&self, template: &ServiceTemplate) -> Result<Image, CoreError> {
        let images = self
            .image_registry
            .list_images(&ImageFilter {
                name: template.image.to_owned(),
            })
            .map_err(|e| CoreError::client("updates", e))?;
        let image = latest_image(images).ok_or_else(|| {
            CoreError::Update(format!(
                "no '{}' image available in the update registry",
                template.image
            ))
        })?;
        debug!(
            "latest {} image: {} ({})",
            template.image, image.uuid, image.version
        );
        Ok(image)
    }

    /// Import the image unless the local store already has it. Returns
    /// whether an import ran.
    fn ensure_local_image(&self, image: &Image) -> Result<bool, CoreError> {
        match self.image_store.get_image(&image.uuid) {
            Ok(_) => {
                debug!("image {} already present locally", image.uuid);
                Ok(false)
            }
            Err(e) if e.is_not_found() => {
                info!("importing image {} ({}@{})", image.uuid, image.name, image.version);
                self.importer
                    .import(std::slice::from_ref(image))
                    .map_err(|e| CoreError::client("imgapi", e))?;
                Ok(true)
            }
            Err(e) => Err(CoreError::client("imgapi", e)),
        }
    }

    fn service_payload(
        &self,
        template: &ServiceTemplate,
        package: &Package,
        image: &Image,
        script: String,
    ) -> ServicePayload {
        let name = template.name;
        let mut params = Map::new();
        params.insert("image_uuid".to_owned(), json!(image.uuid));
        params.insert("billing_id".to_owned(), json!(package.uuid));
        params.insert("owner_uuid".to_owned(), json!(self.datacenter.admin_uuid));
        params.insert("archive_on_delete".to_owned(), Value::Bool(true));
        params.insert("maintain_resolvers".to_owned(), Value::Bool(true));
        params.insert("networks".to_owned(), json!(["admin"]));
        params.insert(
            "tags".to_owned(),
            json!({ "smartdc_role": name, "smartdc_type": "core" }),
        );
        if let Some(memory) = package.max_physical_memory {
            params.insert("max_physical_memory".to_owned(), json!(memory));
        }
        if let Some(quota) = package.quota {
            params.insert("quota".to_owned(), json!(quota));
        }

        let mut metadata = Map::new();
        metadata.insert("SERVICE_NAME".to_owned(), json!(name));
        metadata.insert(
            "SERVICE_DOMAIN".to_owned(),
            json!(self.datacenter.service_domain(name)),
        );
        metadata.insert("user-script".to_owned(), Value::String(script));

        ServicePayload { params, metadata }
    }
}
