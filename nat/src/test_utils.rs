// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Chains used to exercise the NAT elements

use chain::{Chain, Connection, Context, MetadataServer, NetworkService, Request, Side};
use dplane::Gateway;
use dplane::api::NatPluginParams;
use dplane::sim::{SimDataplane, SimInterface};
use std::sync::Arc;

pub(crate) fn request(id: &str) -> Request {
    Request::new(Connection::new(id, "firewall"))
}

/// A simulated dataplane with the NAT44 plugin enabled, and a chain to test an element in
pub(crate) struct Setup {
    pub(crate) sim: Arc<SimDataplane>,
    chain: Chain,
}

impl Setup {
    #[allow(clippy::unwrap_used)]
    pub(crate) async fn new() -> Self {
        let sim = Arc::new(SimDataplane::new());
        Gateway::new(sim.clone())
            .nat_plugin(&Context::background(), &NatPluginParams::default(), true)
            .await
            .unwrap();
        sim.clear_calls();
        Self {
            sim,
            chain: Chain::new("empty", Side::Server),
        }
    }

    pub(crate) fn gateway(&self) -> Gateway {
        Gateway::new(self.sim.clone())
    }

    /// Metadata, then the element, then interface provisioning
    pub(crate) fn with_element(self, side: Side, element: Arc<dyn NetworkService>) -> Self {
        let chain = Chain::new("nat-test", side)
            .add_stage(MetadataServer::new())
            .add_shared_stage(element)
            .add_stage(SimInterface::new(self.sim.clone()));
        Self { chain, ..self }
    }

    /// Metadata, then the element
    pub(crate) fn without_interfaces(self, side: Side, element: Arc<dyn NetworkService>) -> Self {
        let chain = Chain::new("nat-test", side)
            .add_stage(MetadataServer::new())
            .add_shared_stage(element);
        Self { chain, ..self }
    }

    pub(crate) fn chain(&self) -> &Chain {
        &self.chain
    }
}
