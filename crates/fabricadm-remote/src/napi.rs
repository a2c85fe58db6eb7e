use crate::http::{encode_segment, JsonClient};
use crate::{Network, NetworkApi, NetworkPool, NicTag, RemoteConfig, RemoteError};

/// Networking API client.
pub struct NapiClient {
    client: JsonClient,
}

impl NapiClient {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            client: JsonClient::new("napi", &config.napi, config.timeout()),
        }
    }
}

impl NetworkApi for NapiClient {
    fn get_nic_tag(&self, name: &str) -> Result<NicTag, RemoteError> {
        self.client
            .get(&format!("/nic_tags/{}", encode_segment(name)), &[])
    }

    fn get_network_pool(&self, id: &str) -> Result<NetworkPool, RemoteError> {
        self.client
            .get(&format!("/network_pools/{}", encode_segment(id)), &[])
    }

    fn get_network(&self, uuid: &str) -> Result<Network, RemoteError> {
        self.client
            .get(&format!("/networks/{}", encode_segment(uuid)), &[])
    }
}
