use crate::CoreError;
use fabricadm_remote::{Application, ServiceFilter, ServiceRegistry};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub const DOCKER_SERVICE: &str = "docker";
pub const USE_FABRICS_FLAG: &str = "USE_FABRICS";

/// Finds an optional service that must be told fabrics are enabled.
pub struct DependentServiceDetector {
    services: Arc<dyn ServiceRegistry>,
    service: String,
    flag: String,
}

impl DependentServiceDetector {
    pub fn new(services: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            services,
            service: DOCKER_SERVICE.to_owned(),
            flag: USE_FABRICS_FLAG.to_owned(),
        }
    }

    /// Returns whether the service exists, setting its flag first if unset.
    pub fn detect(&self, app: &Application) -> Result<bool, CoreError> {
        let mut found = self
            .services
            .list_services(&ServiceFilter {
                name: self.service.clone(),
                application_uuid: app.uuid.clone(),
            })
            .map_err(|e| CoreError::client("sapi", e))?;
        let service = match found.len() {
            0 => {
                debug!("no {} service", self.service);
                return Ok(false);
            }
            1 => found.remove(0),
            n => {
                return Err(CoreError::Internal(format!(
                    "{n} services named '{}', expected at most one",
                    self.service
                )))
            }
        };

        if service.metadata.get(&self.flag) == Some(&Value::Bool(true)) {
            debug!("{} already has {} set", self.service, self.flag);
        } else {
            info!("setting {}=true on the {} service", self.flag, self.service);
            let mut patch = Map::new();
            patch.insert(self.flag.clone(), Value::Bool(true));
            self.services
                .update_service(&service.uuid, &patch)
                .map_err(|e| CoreError::client("sapi", e))?;
        }
        Ok(true)
    }
}
