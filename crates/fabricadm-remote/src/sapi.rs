use crate::http::{encode_segment, JsonClient};
use crate::{
    Application, ApplicationDefaults, ApplicationStore, Instance, InstanceFilter,
    InstancePayload, RemoteConfig, RemoteError, Service, ServiceFilter, ServicePayload,
    ServiceRegistry,
};
use serde_json::{json, Map, Value};

/// Services API client: the application store and the service registry.
pub struct SapiClient {
    client: JsonClient,
}

impl SapiClient {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            client: JsonClient::new("sapi", &config.sapi, config.timeout()),
        }
    }

    fn update_application(&self, app_uuid: &str, body: &Value) -> Result<Application, RemoteError> {
        self.client
            .put(&format!("/applications/{}", encode_segment(app_uuid)), body)
    }
}

impl ApplicationStore for SapiClient {
    fn ensure_singleton(
        &self,
        defaults: &ApplicationDefaults,
    ) -> Result<Application, RemoteError> {
        let mut apps: Vec<Application> = self
            .client
            .get("/applications", &[("name", defaults.name.as_str())])?;
        match apps.len() {
            0 => {
                tracing::info!("creating application '{}'", defaults.name);
                self.client.post("/applications", &[], defaults)
            }
            1 => Ok(apps.remove(0)),
            n => Err(RemoteError::Ambiguous(format!(
                "{n} applications named '{}'",
                defaults.name
            ))),
        }
    }

    fn update_metadata(
        &self,
        app_uuid: &str,
        patch: &Map<String, Value>,
    ) -> Result<Application, RemoteError> {
        self.update_application(app_uuid, &json!({ "action": "update", "metadata": patch }))
    }

    fn update_metadata_schema(
        &self,
        app_uuid: &str,
        schema: &Value,
    ) -> Result<Application, RemoteError> {
        // "update" merges top-level schema keys; the fixed schema only has
        // `type` and `properties`, so `properties` is replaced whole.
        self.update_application(
            app_uuid,
            &json!({ "action": "update", "metadata_schema": schema }),
        )
    }
}

impl ServiceRegistry for SapiClient {
    fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<Service>, RemoteError> {
        self.client.get(
            "/services",
            &[
                ("name", filter.name.as_str()),
                ("application_uuid", filter.application_uuid.as_str()),
            ],
        )
    }

    fn create_service(
        &self,
        name: &str,
        app_uuid: &str,
        payload: &ServicePayload,
    ) -> Result<Service, RemoteError> {
        let body = json!({
            "name": name,
            "application_uuid": app_uuid,
            "params": payload.params,
            "metadata": payload.metadata,
        });
        self.client.post("/services", &[], &body)
    }

    fn update_service(
        &self,
        service_uuid: &str,
        metadata: &Map<String, Value>,
    ) -> Result<Service, RemoteError> {
        self.client.put(
            &format!("/services/{}", encode_segment(service_uuid)),
            &json!({ "action": "update", "metadata": metadata }),
        )
    }

    fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<Instance>, RemoteError> {
        self.client
            .get("/instances", &[("service_uuid", filter.service_uuid.as_str())])
    }

    fn create_instance(
        &self,
        service_uuid: &str,
        payload: &InstancePayload,
    ) -> Result<Instance, RemoteError> {
        let body = json!({
            "service_uuid": service_uuid,
            "params": payload.params,
        });
        self.client.post("/instances", &[], &body)
    }
}
