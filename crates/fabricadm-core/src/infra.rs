use crate::classify::classify_lookup;
use crate::CoreError;
use fabricadm_remote::{NetworkApi, NetworkPool, NicTag};
use fabricadm_schema::{FabricConfig, UnderlayAssignment};
use std::sync::Arc;
use tracing::{debug, info};

/// Cross-checks a schema-valid configuration against live network state.
pub struct InfrastructureChecker {
    network: Arc<dyn NetworkApi>,
}

impl InfrastructureChecker {
    pub fn new(network: Arc<dyn NetworkApi>) -> Self {
        Self { network }
    }

    /// The underlay nic tag must exist.
    pub fn check_tag(&self, config: &FabricConfig) -> Result<NicTag, CoreError> {
        let tag = &config.sdc_underlay_tag;
        debug!("checking underlay nic tag '{tag}'");
        let found = self.network.get_nic_tag(tag).map_err(|e| {
            classify_lookup(e, "napi", "name", || {
                format!("sdc_underlay_tag: nic tag \"{tag}\" does not exist or is invalid")
            })
        })?;
        info!("underlay nic tag '{tag}' exists");
        Ok(found)
    }

    /// Manual assignment forbids an underlay pool; automatic assignment
    /// requires one whose networks carry the underlay tag.
    ///
    /// Returns the underlay pool for automatic assignment.
    pub fn check_assignment(&self, config: &FabricConfig) -> Result<Option<NetworkPool>, CoreError> {
        match config.sdc_underlay_assignment {
            UnderlayAssignment::Manual => {
                if let Some(pool) = &config.sdc_underlay_pool {
                    return Err(CoreError::Validation(format!(
                        "sdc_underlay_pool (\"{pool}\") must not be set when \
                         sdc_underlay_assignment is \"manual\""
                    )));
                }
                debug!("manual underlay assignment, no pool to check");
                Ok(None)
            }
            UnderlayAssignment::Automatic => {
                let Some(pool_id) = config.sdc_underlay_pool.as_deref() else {
                    return Err(CoreError::Validation(
                        "sdc_underlay_pool is required when sdc_underlay_assignment is \
                         \"automatic\""
                            .to_owned(),
                    ));
                };
                let pool = self.lookup_pool("sdc_underlay_pool", pool_id)?;
                self.check_pool_tag(&pool, pool_id, &config.sdc_underlay_tag)?;
                info!("underlay pool '{pool_id}' matches nic tag '{}'", config.sdc_underlay_tag);
                Ok(Some(pool))
            }
        }
    }

    /// The NAT egress pool must exist.
    pub fn check_nat_pool(&self, config: &FabricConfig) -> Result<NetworkPool, CoreError> {
        let pool = self.lookup_pool("sdc_nat_pool", &config.sdc_nat_pool)?;
        info!("NAT pool '{}' exists", config.sdc_nat_pool);
        Ok(pool)
    }

    /// Run the three checks in order, stopping at the first failure.
    pub fn check_all(&self, config: &FabricConfig) -> Result<(), CoreError> {
        self.check_tag(config)?;
        self.check_assignment(config)?;
        self.check_nat_pool(config)?;
        Ok(())
    }

    fn lookup_pool(&self, field: &str, id: &str) -> Result<NetworkPool, CoreError> {
        debug!("checking {field} '{id}'");
        self.network.get_network_pool(id).map_err(|e| {
            classify_lookup(e, "napi", "uuid", || {
                format!("{field}: network pool \"{id}\" does not exist or is invalid")
            })
        })
    }

    /// The first network of the pool decides the pool's nic tag.
    fn check_pool_tag(
        &self,
        pool: &NetworkPool,
        pool_id: &str,
        expected: &str,
    ) -> Result<(), CoreError> {
        let Some(first) = pool.networks.first() else {
            return Err(CoreError::Validation(format!(
                "sdc_underlay_pool: network pool \"{pool_id}\" contains no networks"
            )));
        };
        let network = self
            .network
            .get_network(first)
            .map_err(|e| CoreError::client("napi", e))?;
        if network.nic_tag != expected {
            return Err(CoreError::Validation(format!(
                "sdc_underlay_pool: network pool \"{pool_id}\" has nic tag \"{}\", \
                 but sdc_underlay_tag is \"{expected}\"",
                network.nic_tag
            )));
        }
        Ok(())
    }
}
