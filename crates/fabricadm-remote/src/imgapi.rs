use crate::http::{encode_segment, JsonClient};
use crate::{
    Image, ImageFilter, ImageImporter, ImageRegistry, ImageStore, RemoteConfig, RemoteError,
};
use serde_json::Value;
use std::time::{Duration, Instant};

/// How long an import may take before it is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportPolling {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ImportPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Local image API client: image lookups and remote imports.
pub struct ImgapiClient {
    client: JsonClient,
    source: String,
    polling: ImportPolling,
}

impl ImgapiClient {
    pub fn new(config: &RemoteConfig, polling: ImportPolling) -> Self {
        Self {
            client: JsonClient::new("imgapi", &config.imgapi, config.timeout()),
            source: config.updates.clone(),
            polling,
        }
    }

    fn deadline(&self) -> Result<Instant, RemoteError> {
        Instant::now().checked_add(self.polling.timeout).ok_or_else(|| {
            RemoteError::Config(format!(
                "image import timeout of {}s is out of range",
                self.polling.timeout.as_secs()
            ))
        })
    }

    fn wait_active(&self, image: &Image) -> Result<(), RemoteError> {
        let deadline = self.deadline()?;
        loop {
            match self.get_image(&image.uuid) {
                Ok(local) if local.is_active() => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(RemoteError::Timeout(format!(
                    "image {} ({}@{}) not active after {}s",
                    image.uuid,
                    image.name,
                    image.version,
                    self.polling.timeout.as_secs()
                )));
            }
            std::thread::sleep(self.polling.interval);
        }
    }
}

impl ImageStore for ImgapiClient {
    fn get_image(&self, uuid: &str) -> Result<Image, RemoteError> {
        self.client
            .get(&format!("/images/{}", encode_segment(uuid)), &[])
    }
}

impl ImageImporter for ImgapiClient {
    fn import(&self, images: &[Image]) -> Result<(), RemoteError> {
        for image in images {
            tracing::info!(
                "importing image {} ({}@{}) from {}",
                image.uuid,
                image.name,
                image.version,
                self.source
            );
            let _job: Value = self.client.post(
                &format!("/images/{}", encode_segment(&image.uuid)),
                &[("action", "import-remote"), ("source", self.source.as_str())],
                &Value::Null,
            )?;
            self.wait_active(image)?;
        }
        Ok(())
    }
}

/// Client for the remote update-image registry.
pub struct UpdatesClient {
    client: JsonClient,
}

impl UpdatesClient {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            client: JsonClient::new("updates", &config.updates, config.timeout()),
        }
    }
}

impl ImageRegistry for UpdatesClient {
    fn list_images(&self, filter: &ImageFilter) -> Result<Vec<Image>, RemoteError> {
        self.client
            .get("/images", &[("name", filter.name.as_str())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig {
            sapi: "http://127.0.0.1:1".to_owned(),
            napi: "http://127.0.0.1:1".to_owned(),
            papi: "http://127.0.0.1:1".to_owned(),
            imgapi: "http://127.0.0.1:1".to_owned(),
            updates: "http://127.0.0.1:1".to_owned(),
            timeout_secs: 1,
        }
    }

    #[test]
    fn deadline_within_timeout() {
        let client = ImgapiClient::new(&config(), ImportPolling::default());
        let deadline = client.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_secs(600));
    }

    #[test]
    fn oversized_timeout_is_config_error() {
        let polling = ImportPolling {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(u64::MAX),
        };
        let client = ImgapiClient::new(&config(), polling);
        assert!(matches!(client.deadline(), Err(RemoteError::Config(_))));
    }
}
