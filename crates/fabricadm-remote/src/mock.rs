use crate::{
    ApiError, Application, ApplicationDefaults, ApplicationStore, CommandRunner, Image,
    ImageFilter, ImageImporter, ImageRegistry, ImageStore, Instance, InstanceFilter,
    InstancePayload, Network, NetworkApi, NetworkPool, NicTag, NodeResolver, Package,
    PackageCatalog, PackageFilter, RemoteError, ScriptResolver, Service, ServiceFilter,
    ServicePayload, ServiceRegistry,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const MOCK_NODE_UUID: &str = "564d0d2c-1bde-4e4b-a5a3-2b4d1e1f0a01";
pub const MOCK_ADMIN_UUID: &str = "930896af-bf8c-48d4-885c-6573a94b1853";

/// A mutating call observed by the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateApplication(String),
    UpdateMetadata(Vec<String>),
    UpdateMetadataSchema,
    CreateService(String),
    UpdateService { service: String, keys: Vec<String> },
    CreateInstance { service: String, alias: String },
    ImportImage(String),
    RunCommand { service: String, command: String },
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    node_id: String,
    user_script: String,
    app: Option<Application>,
    services: Vec<Service>,
    instances: Vec<Instance>,
    packages: Vec<Package>,
    remote_images: Vec<Image>,
    local_images: BTreeMap<String, Image>,
    nic_tags: BTreeMap<String, NicTag>,
    pools: Vec<NetworkPool>,
    networks: BTreeMap<String, Network>,
    failures: HashMap<String, (u16, ApiError)>,
    failing_commands: BTreeSet<String>,
    calls: Vec<MockCall>,
}

impl MockState {
    fn next_uuid(&mut self) -> String {
        self.next_id += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.next_id)
    }

    fn injected(&self, op: &str, service: &str) -> Result<(), RemoteError> {
        match self.failures.get(op) {
            Some((status, error)) => Err(RemoteError::api(service, *status, error.clone())),
            None => Ok(()),
        }
    }

    fn app_mut(&mut self, app_uuid: &str) -> Result<&mut Application, RemoteError> {
        match self.app.as_mut() {
            Some(app) if app.uuid == app_uuid => Ok(app),
            _ => Err(not_found("sapi", &format!("application {app_uuid}"))),
        }
    }
}

fn not_found(service: &str, what: &str) -> RemoteError {
    RemoteError::api(service, 404, ApiError::not_found(format!("{what} not found")))
}

/// In-memory control plane implementing every collaborator contract.
///
/// Mutating calls are recorded as [`MockCall`]s; failures can be injected per
/// operation name (the trait method name, e.g. `"get_nic_tag"`) and per service
/// for remote commands.
pub struct MockDatacenter {
    state: Mutex<MockState>,
}

impl Default for MockDatacenter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDatacenter {
    /// An empty datacenter: no application, packages, images or networks.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                node_id: MOCK_NODE_UUID.to_owned(),
                user_script: "#!/usr/bin/bash\n# mock user-script\n".to_owned(),
                ..MockState::default()
            }),
        }
    }

    /// A fresh datacenter with everything the fabrics services need: packages
    /// `sdc_768`/`sdc_128`, `portolan` and `nat` images in the update registry,
    /// nic tags `sdc_underlay`/`external`, pools `underlay-pool` (tagged
    /// `sdc_underlay`) and `nat-pool` (tagged `external`).
    pub fn seeded() -> Self {
        let dc = Self::new();
        dc.add_package("sdc_768", true);
        dc.add_package("sdc_128", true);
        // Newest first: selection must not trust response order.
        dc.add_remote_image("portolan", "20240601T000000Z", Some("2024-06-01T00:00:00Z"));
        dc.add_remote_image("portolan", "20240101T000000Z", Some("2024-01-01T00:00:00Z"));
        dc.add_remote_image("nat", "20240301T000000Z", Some("2024-03-01T00:00:00Z"));
        dc.add_nic_tag("sdc_underlay", Some(9000));
        dc.add_nic_tag("external", Some(1500));
        let underlay = dc.add_network("underlay-net", "sdc_underlay");
        dc.add_pool("underlay-pool", &[underlay.as_str()]);
        let nat = dc.add_network("nat-net", "external");
        dc.add_pool("nat-pool", &[nat.as_str()]);
        dc
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_package(&self, name: &str, active: bool) -> String {
        let mut st = self.lock();
        let uuid = st.next_uuid();
        st.packages.push(Package {
            uuid: uuid.clone(),
            name: name.to_owned(),
            active,
            max_physical_memory: name.strip_prefix("sdc_").and_then(|m| m.parse().ok()),
            quota: Some(25600),
        });
        uuid
    }

    pub fn add_remote_image(&self, name: &str, version: &str, published_at: Option<&str>) -> String {
        let mut st = self.lock();
        let uuid = st.next_uuid();
        st.remote_images.push(Image {
            uuid: uuid.clone(),
            name: name.to_owned(),
            version: version.to_owned(),
            state: Some("active".to_owned()),
            published_at: published_at.map(str::to_owned),
        });
        uuid
    }

    /// Copy every update-registry image into the local store.
    pub fn import_all_remote_images(&self) {
        let mut st = self.lock();
        let images = st.remote_images.clone();
        for image in images {
            st.local_images.insert(image.uuid.clone(), image);
        }
    }

    pub fn add_nic_tag(&self, name: &str, mtu: Option<u32>) {
        let mut st = self.lock();
        let uuid = st.next_uuid();
        st.nic_tags.insert(
            name.to_owned(),
            NicTag {
                name: name.to_owned(),
                uuid: Some(uuid),
                mtu,
            },
        );
    }

    pub fn add_network(&self, name: &str, nic_tag: &str) -> String {
        let mut st = self.lock();
        let uuid = st.next_uuid();
        st.networks.insert(
            uuid.clone(),
            Network {
                uuid: uuid.clone(),
                name: name.to_owned(),
                nic_tag: nic_tag.to_owned(),
            },
        );
        uuid
    }

    /// Add a network pool; it can be looked up by uuid or by name.
    pub fn add_pool(&self, name: &str, networks: &[&str]) -> String {
        let mut st = self.lock();
        let uuid = st.next_uuid();
        let nic_tag = networks
            .first()
            .and_then(|n| st.networks.get(*n))
            .map(|n| n.nic_tag.clone());
        st.pools.push(NetworkPool {
            uuid: uuid.clone(),
            name: name.to_owned(),
            networks: networks.iter().map(|n| (*n).to_owned()).collect(),
            nic_tag,
        });
        uuid
    }

    /// Register a service (creating the `sdc` application when missing).
    pub fn add_service(&self, name: &str, metadata: Map<String, Value>) -> Service {
        let mut st = self.lock();
        if st.app.is_none() {
            let uuid = st.next_uuid();
            st.app = Some(Application {
                uuid,
                name: "sdc".to_owned(),
                owner_uuid: MOCK_ADMIN_UUID.to_owned(),
                params: Map::new(),
                metadata: Map::new(),
                metadata_schema: Map::new(),
            });
        }
        let app_uuid = st.app.as_ref().map(|a| a.uuid.clone()).unwrap_or_default();
        let uuid = st.next_uuid();
        let svc = Service {
            uuid,
            name: name.to_owned(),
            application_uuid: app_uuid,
            params: Map::new(),
            metadata,
        };
        st.services.push(svc.clone());
        svc
    }

    /// Register an extra instance of an existing service.
    pub fn add_instance(&self, service_uuid: &str, alias: &str) -> Instance {
        let mut st = self.lock();
        let uuid = st.next_uuid();
        let mut params = Map::new();
        params.insert("alias".to_owned(), Value::String(alias.to_owned()));
        let inst = Instance {
            uuid,
            service_uuid: service_uuid.to_owned(),
            params,
            metadata: Map::new(),
        };
        st.instances.push(inst.clone());
        inst
    }

    /// Inject a failure for every subsequent call of `op`.
    pub fn fail(&self, op: &str, status: u16, error: ApiError) {
        self.lock().failures.insert(op.to_owned(), (status, error));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Make remote commands against `service` fail.
    pub fn fail_commands_on(&self, service: &str) {
        self.lock().failing_commands.insert(service.to_owned());
    }

    pub fn set_node_id(&self, node_id: &str) {
        self.lock().node_id = node_id.to_owned();
    }

    pub fn application(&self) -> Option<Application> {
        self.lock().app.clone()
    }

    pub fn services(&self) -> Vec<Service> {
        self.lock().services.clone()
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.lock().services.iter().find(|s| s.name == name).cloned()
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.lock().instances.clone()
    }

    pub fn has_local_image(&self, uuid: &str) -> bool {
        self.lock().local_images.contains_key(uuid)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// `(service, command)` pairs attempted through [`CommandRunner::run`].
    pub fn commands(&self) -> Vec<(String, String)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::RunCommand { service, command } => {
                    Some((service.clone(), command.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

impl NodeResolver for MockDatacenter {
    fn current_node_id(&self) -> Result<String, RemoteError> {
        let st = self.lock();
        st.injected("current_node_id", "sysinfo")?;
        Ok(st.node_id.clone())
    }
}

impl ApplicationStore for MockDatacenter {
    fn ensure_singleton(
        &self,
        defaults: &ApplicationDefaults,
    ) -> Result<Application, RemoteError> {
        let mut st = self.lock();
        st.injected("ensure_singleton", "sapi")?;
        if let Some(app) = st.app.as_ref().filter(|a| a.name == defaults.name) {
            return Ok(app.clone());
        }
        let uuid = st.next_uuid();
        let app = Application {
            uuid,
            name: defaults.name.clone(),
            owner_uuid: defaults.owner_uuid.clone(),
            params: defaults.params.clone(),
            metadata: defaults.metadata.clone(),
            metadata_schema: Map::new(),
        };
        st.app = Some(app.clone());
        st.calls.push(MockCall::CreateApplication(defaults.name.clone()));
        Ok(app)
    }

    fn update_metadata(
        &self,
        app_uuid: &str,
        patch: &Map<String, Value>,
    ) -> Result<Application, RemoteError> {
        let mut st = self.lock();
        st.injected("update_metadata", "sapi")?;
        let app = st.app_mut(app_uuid)?;
        for (k, v) in patch {
            app.metadata.insert(k.clone(), v.clone());
        }
        let app = app.clone();
        st.calls
            .push(MockCall::UpdateMetadata(patch.keys().cloned().collect()));
        Ok(app)
    }

    fn update_metadata_schema(
        &self,
        app_uuid: &str,
        schema: &Value,
    ) -> Result<Application, RemoteError> {
        let mut st = self.lock();
        st.injected("update_metadata_schema", "sapi")?;
        let Value::Object(schema) = schema else {
            return Err(RemoteError::api(
                "sapi",
                422,
                ApiError::invalid_parameters("metadata_schema must be an object", &["metadata_schema"]),
            ));
        };
        let app = st.app_mut(app_uuid)?;
        app.metadata_schema = schema.clone();
        let app = app.clone();
        st.calls.push(MockCall::UpdateMetadataSchema);
        Ok(app)
    }
}

impl ServiceRegistry for MockDatacenter {
    fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<Service>, RemoteError> {
        let st = self.lock();
        st.injected("list_services", "sapi")?;
        Ok(st
            .services
            .iter()
            .filter(|s| s.name == filter.name && s.application_uuid == filter.application_uuid)
            .cloned()
            .collect())
    }

    fn create_service(
        &self,
        name: &str,
        app_uuid: &str,
        payload: &ServicePayload,
    ) -> Result<Service, RemoteError> {
        let mut st = self.lock();
        st.injected("create_service", "sapi")?;
        st.app_mut(app_uuid)?;
        let uuid = st.next_uuid();
        let svc = Service {
            uuid,
            name: name.to_owned(),
            application_uuid: app_uuid.to_owned(),
            params: payload.params.clone(),
            metadata: payload.metadata.clone(),
        };
        st.services.push(svc.clone());
        st.calls.push(MockCall::CreateService(name.to_owned()));
        Ok(svc)
    }

    fn update_service(
        &self,
        service_uuid: &str,
        metadata: &Map<String, Value>,
    ) -> Result<Service, RemoteError> {
        let mut st = self.lock();
        st.injected("update_service", "sapi")?;
        let Some(svc) = st.services.iter_mut().find(|s| s.uuid == service_uuid) else {
            return Err(not_found("sapi", &format!("service {service_uuid}")));
        };
        for (k, v) in metadata {
            svc.metadata.insert(k.clone(), v.clone());
        }
        let svc = svc.clone();
        st.calls.push(MockCall::UpdateService {
            service: svc.name.clone(),
            keys: metadata.keys().cloned().collect(),
        });
        Ok(svc)
    }

    fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<Instance>, RemoteError> {
        let st = self.lock();
        st.injected("list_instances", "sapi")?;
        Ok(st
            .instances
            .iter()
            .filter(|i| i.service_uuid == filter.service_uuid)
            .cloned()
            .collect())
    }

    fn create_instance(
        &self,
        service_uuid: &str,
        payload: &InstancePayload,
    ) -> Result<Instance, RemoteError> {
        let mut st = self.lock();
        st.injected("create_instance", "sapi")?;
        let Some(service) = st
            .services
            .iter()
            .find(|s| s.uuid == service_uuid)
            .map(|s| s.name.clone())
        else {
            return Err(not_found("sapi", &format!("service {service_uuid}")));
        };
        let uuid = st.next_uuid();
        let inst = Instance {
            uuid,
            service_uuid: service_uuid.to_owned(),
            params: payload.params.clone(),
            metadata: Map::new(),
        };
        st.instances.push(inst.clone());
        st.calls.push(MockCall::CreateInstance {
            service,
            alias: inst.alias().unwrap_or_default().to_owned(),
        });
        Ok(inst)
    }
}

impl PackageCatalog for MockDatacenter {
    fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>, RemoteError> {
        let st = self.lock();
        st.injected("list_packages", "papi")?;
        Ok(st
            .packages
            .iter()
            .filter(|p| p.name == filter.name && (!filter.active || p.active))
            .cloned()
            .collect())
    }
}

impl ImageRegistry for MockDatacenter {
    fn list_images(&self, filter: &ImageFilter) -> Result<Vec<Image>, RemoteError> {
        let st = self.lock();
        st.injected("list_images", "updates")?;
        Ok(st
            .remote_images
            .iter()
            .filter(|i| i.name == filter.name)
            .cloned()
            .collect())
    }
}

impl ImageStore for MockDatacenter {
    fn get_image(&self, uuid: &str) -> Result<Image, RemoteError> {
        let st = self.lock();
        st.injected("get_image", "imgapi")?;
        st.local_images
            .get(uuid)
            .cloned()
            .ok_or_else(|| not_found("imgapi", &format!("image {uuid}")))
    }
}

impl ImageImporter for MockDatacenter {
    fn import(&self, images: &[Image]) -> Result<(), RemoteError> {
        let mut st = self.lock();
        st.injected("import", "imgapi")?;
        for image in images {
            st.local_images.insert(image.uuid.clone(), image.clone());
            st.calls.push(MockCall::ImportImage(image.uuid.clone()));
        }
        Ok(())
    }
}

impl NetworkApi for MockDatacenter {
    fn get_nic_tag(&self, name: &str) -> Result<NicTag, RemoteError> {
        let st = self.lock();
        st.injected("get_nic_tag", "napi")?;
        st.nic_tags
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("napi", &format!("nic tag {name}")))
    }

    fn get_network_pool(&self, id: &str) -> Result<NetworkPool, RemoteError> {
        let st = self.lock();
        st.injected("get_network_pool", "napi")?;
        st.pools
            .iter()
            .find(|p| p.uuid == id || p.name == id)
            .cloned()
            .ok_or_else(|| not_found("napi", &format!("network pool {id}")))
    }

    fn get_network(&self, uuid: &str) -> Result<Network, RemoteError> {
        let st = self.lock();
        st.injected("get_network", "napi")?;
        st.networks
            .get(uuid)
            .cloned()
            .ok_or_else(|| not_found("napi", &format!("network {uuid}")))
    }
}

impl ScriptResolver for MockDatacenter {
    fn user_script(&self) -> Result<String, RemoteError> {
        let st = self.lock();
        st.injected("user_script", "usbkey")?;
        Ok(st.user_script.clone())
    }
}

impl CommandRunner for MockDatacenter {
    fn run(&self, service: &str, command: &str) -> Result<(), RemoteError> {
        let mut st = self.lock();
        st.calls.push(MockCall::RunCommand {
            service: service.to_owned(),
            command: command.to_owned(),
        });
        if st.failing_commands.contains(service) {
            return Err(RemoteError::Command {
                service: service.to_owned(),
                command: command.to_owned(),
                message: "exit status: 1".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ApplicationDefaults {
        ApplicationDefaults {
            name: "sdc".to_owned(),
            owner_uuid: MOCK_ADMIN_UUID.to_owned(),
            params: Map::new(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn ensure_singleton_creates_once() {
        let dc = MockDatacenter::new();
        let a1 = dc.ensure_singleton(&defaults()).unwrap();
        let a2 = dc.ensure_singleton(&defaults()).unwrap();
        assert_eq!(a1.uuid, a2.uuid);
        assert_eq!(dc.calls(), vec![MockCall::CreateApplication("sdc".to_owned())]);
    }

    #[test]
    fn metadata_update_replaces_key() {
        let dc = MockDatacenter::new();
        let app = dc.ensure_singleton(&defaults()).unwrap();
        let mut patch = Map::new();
        patch.insert("fabric_cfg".to_owned(), serde_json::json!({"a": 1, "b": 2}));
        dc.update_metadata(&app.uuid, &patch).unwrap();
        patch.insert("fabric_cfg".to_owned(), serde_json::json!({"a": 3}));
        let app = dc.update_metadata(&app.uuid, &patch).unwrap();
        assert_eq!(app.metadata["fabric_cfg"], serde_json::json!({"a": 3}));
    }

    #[test]
    fn seeded_pools_resolve_by_name() {
        let dc = MockDatacenter::seeded();
        let pool = dc.get_network_pool("underlay-pool").unwrap();
        let net = dc.get_network(&pool.networks[0]).unwrap();
        assert_eq!(net.nic_tag, "sdc_underlay");
        assert_eq!(pool.nic_tag.as_deref(), Some("sdc_underlay"));
    }

    #[test]
    fn missing_lookups_are_not_found() {
        let dc = MockDatacenter::seeded();
        assert!(dc.get_nic_tag("nope").unwrap_err().is_not_found());
        assert!(dc.get_network_pool("nope").unwrap_err().is_not_found());
        assert!(dc.get_image("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn injected_failure_is_returned() {
        let dc = MockDatacenter::seeded();
        dc.fail("get_nic_tag", 500, ApiError::default());
        let err = dc.get_nic_tag("sdc_underlay").unwrap_err();
        assert!(matches!(err, RemoteError::Api { status: 500, .. }));
        dc.clear_failures();
        assert!(dc.get_nic_tag("sdc_underlay").is_ok());
    }

    #[test]
    fn import_makes_images_local() {
        let dc = MockDatacenter::seeded();
        let images = dc
            .list_images(&ImageFilter {
                name: "nat".to_owned(),
            })
            .unwrap();
        assert!(!dc.has_local_image(&images[0].uuid));
        dc.import(&images).unwrap();
        assert!(dc.has_local_image(&images[0].uuid));
    }

    #[test]
    fn commands_are_recorded_even_when_failing() {
        let dc = MockDatacenter::new();
        dc.fail_commands_on("vmapi");
        dc.run("napi", "svcadm restart config-agent").unwrap();
        assert!(dc.run("vmapi", "svcadm restart config-agent").is_err());
        assert_eq!(dc.commands().len(), 2);
    }

    #[test]
    fn inactive_packages_filtered() {
        let dc = MockDatacenter::new();
        dc.add_package("sdc_768", false);
        let filter = PackageFilter {
            name: "sdc_768".to_owned(),
            active: true,
        };
        assert!(dc.list_packages(&filter).unwrap().is_empty());
    }
}
