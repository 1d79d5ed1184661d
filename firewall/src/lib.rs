// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

//! The firewall endpoint: a server chain applying ACL rules and NAT to the connections it
//! serves, joined to a client chain towards the next hop of the service.
//!
//! ```text
//! server: metadata -> inspect -> acl -> nat -> interface -> connect
//!                                                              |
//! client:                                      nat-client -> interface
//! ```

use acl::AclServer;
use chain::connect::Connect;
use chain::sample::Inspect;
use chain::{
    Chain, ChainBuildError, ChainError, Connection, Context, MetadataServer, NetworkService,
    Request, Side,
};
use config::FirewallConfig;
use dplane::{DataplaneApi, Gateway};
use nat::{NatClient, NatServer, NatSetup, NatSetupError};
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, info, warn};

use tracectl::{LevelFilter, trace_target};
trace_target!("firewall", LevelFilter::INFO);

/// Names of the stages of the server chain
pub mod stages {
    pub const METADATA: &str = "metadata";
    pub const INSPECT: &str = "inspect";
    pub const ACL: &str = "acl";
    pub const NAT: &str = "nat";
    pub const INTERFACE: &str = "interface";
    pub const CONNECT: &str = "connect";
    pub const NAT_CLIENT: &str = "nat-client";
}

/// The elements attaching the connections of each chain to a dataplane interface. They
/// record the interface index in the connection metadata on request and release the interface
/// on close.
#[derive(Clone)]
pub struct Interfaces {
    pub server: Arc<dyn NetworkService>,
    pub client: Arc<dyn NetworkService>,
}

impl Interfaces {
    /// One element serving both chains
    #[must_use]
    pub fn shared(element: Arc<dyn NetworkService>) -> Self {
        Self {
            server: element.clone(),
            client: element,
        }
    }
}

/// A firewall endpoint
#[derive(Debug)]
pub struct Endpoint {
    config: FirewallConfig,
    server: Chain,
    client: Arc<Chain>,
    nat: NatSetup,
}

impl Endpoint {
    /// Assemble the chains of an endpoint configuring the dataplane behind `api`. Nothing is
    /// configured until [`start`](Self::start) is called.
    pub fn new(
        config: FirewallConfig,
        api: Arc<dyn DataplaneApi>,
        interfaces: Interfaces,
    ) -> Result<Self, ChainBuildError> {
        let gateway = Gateway::new(api);

        let mut client = Chain::new(&format!("{}-client", config.name), Side::Client);
        client
            .add_stage_with_name(stages::NAT_CLIENT, NatClient::new(gateway.clone()))?
            .add_shared_stage_with_name(stages::INTERFACE, interfaces.client)?;
        let client = Arc::new(client);

        let mut server = Chain::new(&config.name, Side::Server);
        server
            .add_stage_with_name(stages::METADATA, MetadataServer::new())?
            .add_stage_with_name(stages::INSPECT, Inspect::new(&config.name))?
            .add_stage_with_name(
                stages::ACL,
                AclServer::new(gateway.clone(), config.acl_rules.clone()),
            )?
            .add_stage_with_name(stages::NAT, NatServer::new(gateway.clone()))?
            .add_shared_stage_with_name(stages::INTERFACE, interfaces.server)?
            .add_stage_with_name(stages::CONNECT, Connect::new(client.clone()))?;

        let nat = NatSetup::new(gateway, config.nat_params, config.nat_pool.clone());
        debug!("Server chain: {server:?}");
        debug!("Client chain: {client:?}");
        Ok(Self {
            config,
            server,
            client,
            nat,
        })
    }

    #[must_use]
    pub fn config(&self) -> &FirewallConfig {
        &self.config
    }

    #[must_use]
    pub fn server(&self) -> &Chain {
        &self.server
    }

    #[must_use]
    pub fn client(&self) -> &Chain {
        &self.client
    }

    #[must_use]
    pub fn acl(&self) -> Option<&AclServer> {
        self.server.get_stage(stages::ACL)
    }

    #[must_use]
    pub fn nat_server(&self) -> Option<&NatServer> {
        self.server.get_stage(stages::NAT)
    }

    #[must_use]
    pub fn nat_client(&self) -> Option<&NatClient> {
        self.client.get_stage(stages::NAT_CLIENT)
    }

    #[must_use]
    pub fn inspect(&self) -> Option<&Inspect> {
        self.server.get_stage(stages::INSPECT)
    }

    fn context(&self) -> Context {
        Context::background().with_timeout(self.config.request_timeout)
    }

    /// Set the NAT up. The endpoint must not serve connections if this fails.
    pub async fn start(&self) -> Result<(), NatSetupError> {
        self.nat.apply(&self.context()).await?;
        info!("Endpoint {} started", self.config.name);
        Ok(())
    }

    /// A connection request for the network service of the endpoint
    #[must_use]
    pub fn new_request(&self, id: &str) -> Request {
        Request::new(Connection::new(id, self.config.service_name.as_str()))
    }

    /// Establish or refresh a connection, within the configured timeout
    pub async fn request(&self, request: Request) -> Result<Connection, ChainError> {
        self.server.request(&self.context(), request).await
    }

    /// Release a connection, within the configured timeout
    pub async fn close(&self, conn: &Connection) -> Result<(), ChainError> {
        self.server.close(&self.context(), conn).await
    }

    /// Undo what [`start`](Self::start) did
    pub async fn shutdown(&self) {
        self.nat.teardown(&self.context()).await;
        info!("Endpoint {} stopped", self.config.name);
    }
}
