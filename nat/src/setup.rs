// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Process-wide NAT configuration, applied once at startup

use chain::Context;
use dplane::api::{Ipv4Range, NatPluginParams};
use dplane::{DataplaneError, Gateway};
#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Failure to set NAT up. The firewall cannot run without it.
#[derive(Debug, thiserror::Error)]
pub enum NatSetupError {
    #[error("failed to enable the NAT44 plugin: {0}")]
    Plugin(#[source] DataplaneError),
    #[error("failed to add NAT address range {range}: {source}")]
    AddressRange {
        range: Ipv4Range,
        #[source]
        source: DataplaneError,
    },
}

/// The NAT44 plugin parameters and the pool of public addresses
#[derive(Debug, Clone)]
pub struct NatSetup {
    gateway: Gateway,
    params: NatPluginParams,
    pool: Vec<Ipv4Range>,
}

impl NatSetup {
    #[must_use]
    pub fn new(gateway: Gateway, params: NatPluginParams, pool: Vec<Ipv4Range>) -> Self {
        Self {
            gateway,
            params,
            pool,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &[Ipv4Range] {
        &self.pool
    }

    /// Enable the plugin, then add every range of the pool in the outside VRF.
    ///
    /// # Errors
    ///
    /// Stops at the first failure.
    pub async fn apply(&self, ctx: &Context) -> Result<(), NatSetupError> {
        self.gateway
            .nat_plugin(ctx, &self.params, true)
            .await
            .map_err(NatSetupError::Plugin)?;
        info!(
            "Enabled NAT44 plugin (inside VRF {}, outside VRF {}, sessions {})",
            self.params.inside_vrf, self.params.outside_vrf, self.params.sessions
        );
        for range in &self.pool {
            self.gateway
                .add_nat_addresses(ctx, *range, self.params.outside_vrf)
                .await
                .map_err(|source| NatSetupError::AddressRange {
                    range: *range,
                    source,
                })?;
            info!("Added NAT address range {range}");
        }
        Ok(())
    }

    /// Remove the ranges of the pool. Failures are logged and skipped.
    pub async fn teardown(&self, ctx: &Context) {
        for range in &self.pool {
            match self
                .gateway
                .remove_nat_addresses(ctx, *range, self.params.outside_vrf)
                .await
            {
                Ok(()) => info!("Removed NAT address range {range}"),
                Err(e) => warn!("Could not remove NAT address range {range}: {e}"),
            }
        }
    }
}
