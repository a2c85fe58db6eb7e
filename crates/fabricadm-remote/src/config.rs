use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Control-plane endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub sapi: String,
    pub napi: String,
    pub papi: String,
    pub imgapi: String,
    /// The remote update-image registry.
    pub updates: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl RemoteConfig {
    /// Strip trailing slashes so paths can be appended directly.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for url in [
            &mut self.sapi,
            &mut self.napi,
            &mut self.papi,
            &mut self.imgapi,
            &mut self.updates,
        ] {
            let trimmed = url.trim_end_matches('/').len();
            url.truncate(trimmed);
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_defaults_to_thirty_seconds() {
        let cfg: RemoteConfig = serde_json::from_str(
            r#"{"sapi":"http://sapi","napi":"http://napi","papi":"http://papi",
                "imgapi":"http://imgapi","updates":"https://updates"}"#,
        )
        .unwrap();
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn normalized_strips_trailing_slashes() {
        let cfg = RemoteConfig {
            sapi: "http://sapi/".to_owned(),
            napi: "http://napi//".to_owned(),
            papi: "http://papi".to_owned(),
            imgapi: "http://imgapi/".to_owned(),
            updates: "https://updates/".to_owned(),
            timeout_secs: 5,
        }
        .normalized();
        assert_eq!(cfg.sapi, "http://sapi");
        assert_eq!(cfg.napi, "http://napi");
        assert_eq!(cfg.imgapi, "http://imgapi");
        assert_eq!(cfg.updates, "https://updates");
    }
}
