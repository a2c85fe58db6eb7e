use crate::http::JsonClient;
use crate::{Package, PackageCatalog, PackageFilter, RemoteConfig, RemoteError};

/// Packages API client.
pub struct PapiClient {
    client: JsonClient,
}

impl PapiClient {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            client: JsonClient::new("papi", &config.papi, config.timeout()),
        }
    }
}

impl PackageCatalog for PapiClient {
    fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>, RemoteError> {
        let active = if filter.active { "true" } else { "false" };
        self.client.get(
            "/packages",
            &[("name", filter.name.as_str()), ("active", active)],
        )
    }
}
