// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The ACL chain element

use async_trait::async_trait;
use chain::{
    ChainError, Claim, ConnId, ConnTracker, Connection, Context, InterfaceLocator,
    MetadataLocator, NetworkService, Next, Postponed, Request, Reservation, Side,
    TrackState,
};
use dplane::Gateway;
use dplane::api::{AclIndex, AclRule};
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info, warn};

use crate::rules::{Direction, acl_add_replace, acl_tag};

/// Chain element applying a fixed set of rules to the interface of every connection.
///
/// After the rest of the chain has established a connection, two ACLs are created from the rules
/// (one per [`Direction`]) and applied to the connection interface. They are deleted when the
/// connection is closed. A connection is configured once: later requests for it (refreshes)
/// leave the ACLs untouched. With no rules, the element only forwards.
#[derive(Debug)]
pub struct AclServer {
    gateway: Gateway,
    rules: Arc<[AclRule]>,
    locator: Arc<dyn InterfaceLocator>,
    applied: ConnTracker<Vec<AclIndex>>,
}

impl AclServer {
    /// An element looking interfaces up in the connection metadata
    #[must_use]
    pub fn new(gateway: Gateway, rules: Arc<[AclRule]>) -> Self {
        Self::with_locator(gateway, rules, Arc::new(MetadataLocator))
    }

    #[must_use]
    pub fn with_locator(
        gateway: Gateway,
        rules: Arc<[AclRule]>,
        locator: Arc<dyn InterfaceLocator>,
    ) -> Self {
        Self {
            gateway,
            rules,
            locator,
            applied: ConnTracker::new(),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &[AclRule] {
        &self.rules
    }

    /// Where the configuration of a connection stands
    #[must_use]
    pub fn state(&self, conn: &ConnId) -> TrackState {
        self.applied.state(conn)
    }

    /// The ACLs created for a connection, ingress first
    pub async fn applied(&self, conn: &ConnId) -> Option<Vec<AclIndex>> {
        self.applied.load(conn).await
    }

    /// Create the ACLs and apply them. Every ACL created is pushed to `created`, even if a later
    /// step fails.
    async fn create(
        &self,
        ctx: &Context,
        conn: &Connection,
        side: Side,
        created: &mut Vec<AclIndex>,
    ) -> Result<(), ChainError> {
        let ifindex = self
            .locator
            .lookup(ctx, side)
            .ok_or_else(|| ChainError::InterfaceNotFound {
                conn: conn.id().clone(),
                side,
            })?;
        debug!(conn = %conn.id(), %ifindex, "configuring ACLs");

        let tag = acl_tag(conn.id());
        let ingress = self
            .gateway
            .add_acl(ctx, &acl_add_replace(&self.rules, Direction::Ingress, &tag))
            .await?;
        created.push(ingress);
        let egress = self
            .gateway
            .add_acl(ctx, &acl_add_replace(&self.rules, Direction::Egress, &tag))
            .await?;
        created.push(egress);

        self.gateway
            .set_interface_acls(ctx, ifindex, &[ingress], &[egress])
            .await?;
        info!(conn = %conn.id(), %ifindex, acls = ?created, "applied ACLs");
        Ok(())
    }

    async fn delete_acls(&self, ctx: &Context, conn: &Connection, acls: Vec<AclIndex>) {
        for acl_index in acls {
            if let Err(e) = self.gateway.delete_acl(ctx, acl_index).await {
                error!(conn = %conn.id(), %acl_index, "failed to delete ACL: {e}");
            }
        }
        debug!(conn = %conn.id(), "removed ACLs");
    }

    /// Undo a failed request, with a context that outlives the one of the request. The
    /// reservation is held until the rest of the chain is closed, so that concurrent requests
    /// for the connection only see the outcome.
    async fn compensate(
        &self,
        postponed: &Postponed,
        conn: &Connection,
        next: Next<'_>,
        reservation: Reservation<'_, Vec<AclIndex>>,
        created: Vec<AclIndex>,
        error: ChainError,
    ) -> ChainError {
        warn!(conn = %conn.id(), "failed to configure ACLs: {error}");
        let cleanup = postponed.context();
        if !created.is_empty() {
            self.delete_acls(&cleanup, conn, created).await;
        }
        let closed = next.close(&cleanup, conn).await;
        reservation.abandon();
        match closed {
            Ok(()) => error,
            Err(close) => error.with_close_error(close),
        }
    }
}

#[async_trait]
impl NetworkService for AclServer {
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        let postponed = ctx.postpone();
        let conn = next.request(ctx, request).await?;
        if self.rules.is_empty() {
            return Ok(conn);
        }

        let reservation = match self.applied.claim(conn.id()).await {
            Claim::Applied(acls) => {
                debug!(conn = %conn.id(), ?acls, "ACLs already applied");
                return Ok(conn);
            }
            Claim::Vacant(reservation) => reservation,
        };

        let mut created = Vec::new();
        match self.create(ctx, &conn, next.side(), &mut created).await {
            Ok(()) => {
                reservation.commit(created);
                Ok(conn)
            }
            Err(e) => Err(self
                .compensate(&postponed, &conn, next, reservation, created, e)
                .await),
        }
    }

    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        if let Some(acls) = self.applied.load_and_delete(conn.id()).await {
            self.delete_acls(ctx, conn, acls).await;
        }
        next.close(ctx, conn).await
    }
}

#[allow(clippy::unwrap_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::AclServer;
    use crate::rules::reverse;
    use async_trait::async_trait;
    use chain::{
        Chain, ChainError, ConnId, Connection, Context, MetadataServer, NetworkService, Next,
        Request, Side, TrackState,
    };
    use dplane::api::{AclAction, AclIndex, AclRule, ApiCall, IpProto};
    use dplane::sim::{Call, Fault, SimDataplane, SimInterface};
    use dplane::{DataplaneError, Gateway};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn rules() -> Arc<[AclRule]> {
        let clients = "172.16.0.0/16".parse().unwrap();
        let any = "0.0.0.0/0".parse().unwrap();
        Arc::from(vec![
            AclRule::new(AclAction::Permit, clients, any, IpProto::TCP).with_dst_ports(443, 443),
            AclRule::new(AclAction::Deny, any, any, IpProto::ANY),
        ])
    }

    struct Setup {
        sim: Arc<SimDataplane>,
        acl: Arc<AclServer>,
        chain: Chain,
    }

    fn setup_with(side: Side, rules: Arc<[AclRule]>, interfaces: bool) -> Setup {
        let sim = Arc::new(SimDataplane::new());
        let acl = Arc::new(AclServer::new(Gateway::new(sim.clone()), rules));
        let mut chain = Chain::new("acl-test", side)
            .add_stage(MetadataServer::new())
            .add_shared_stage(acl.clone());
        if interfaces {
            chain = chain.add_stage(SimInterface::new(sim.clone()));
        }
        Setup { sim, acl, chain }
    }

    fn setup() -> Setup {
        setup_with(Side::Server, rules(), true)
    }

    fn request(id: &str) -> Request {
        Request::new(Connection::new(id, "firewall"))
    }

    /// Refuses to close
    struct FailClose;

    #[async_trait]
    impl NetworkService for FailClose {
        async fn request(
            &self,
            ctx: &Context,
            request: Request,
            next: Next<'_>,
        ) -> Result<Connection, ChainError> {
            next.request(ctx, request).await
        }
        async fn close(
            &self,
            _ctx: &Context,
            _conn: &Connection,
            _next: Next<'_>,
        ) -> Result<(), ChainError> {
            Err(ChainError::Refused("close refused".to_string()))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn two_rules_on_the_server_side() {
        let Setup { sim, acl, chain } = setup();
        let ctx = Context::background();
        let conn = chain.request(&ctx, request("c1")).await.unwrap();
        let ifindex = sim.interfaces()[0];

        let calls = sim.calls();
        assert_eq!(calls.len(), 3);
        let Call::AclAddReplace(ingress) = &calls[0] else {
            panic!("expected the ingress ACL first, got {:?}", calls[0]);
        };
        let Call::AclAddReplace(egress) = &calls[1] else {
            panic!("expected the egress ACL second, got {:?}", calls[1]);
        };
        assert_eq!(ingress.acl_index, AclIndex::NEW);
        assert_eq!(ingress.count(), 2);
        assert_eq!(ingress.tag, "nsm-acl-from-config-c1");
        assert_eq!(ingress.rules, rules().to_vec());
        assert_eq!(egress.rules[0], reverse(&rules()[0]));
        let Call::AclInterfaceSetAclList(bind) = &calls[2] else {
            panic!("expected the bind last, got {:?}", calls[2]);
        };
        assert_eq!(bind.sw_if_index, ifindex);
        assert_eq!((bind.n_input, bind.count), (1, 2));
        assert_eq!(bind.acls, vec![AclIndex(0), AclIndex(1)]);
        assert_eq!(
            acl.applied(conn.id()).await,
            Some(vec![AclIndex(0), AclIndex(1)])
        );
        assert_eq!(acl.state(conn.id()), TrackState::Applied);
        assert!(logs_contain("applied ACLs"));

        sim.clear_calls();
        chain.close(&ctx, &conn).await.unwrap();
        let deleted: Vec<_> = sim
            .calls()
            .into_iter()
            .map(|call| match call {
                Call::AclDel(del) => del.acl_index,
                other => panic!("unexpected call on close: {other:?}"),
            })
            .collect();
        assert_eq!(deleted, vec![AclIndex(0), AclIndex(1)]);
        assert!(sim.acls().is_empty());
        assert!(sim.interfaces().is_empty());
        assert_eq!(acl.state(conn.id()), TrackState::Unconfigured);
    }

    #[tokio::test]
    async fn client_side_uses_the_client_interface() {
        let Setup { sim, chain, .. } = setup_with(Side::Client, rules(), true);
        chain
            .request(&Context::background(), request("c1"))
            .await
            .unwrap();
        let ifindex = sim.interfaces()[0];
        let list = sim.acl_list(ifindex).unwrap();
        assert_eq!(list.acls.len(), 2);
    }

    #[tokio::test]
    async fn refresh_applies_once() {
        let Setup { sim, chain, .. } = setup();
        let ctx = Context::background();
        let conn = chain.request(&ctx, request("c1")).await.unwrap();
        let conn = chain.request(&ctx, Request::new(conn)).await.unwrap();
        chain.request(&ctx, Request::new(conn)).await.unwrap();
        assert_eq!(sim.count(ApiCall::AclAddReplace), 2);
        assert_eq!(sim.count(ApiCall::AclInterfaceSetAclList), 1);
    }

    #[tokio::test]
    async fn no_rules_no_calls() {
        let Setup { sim, acl, chain } = setup_with(Side::Server, Arc::from(Vec::<AclRule>::new()), true);
        let ctx = Context::background();
        let conn = chain.request(&ctx, request("c1")).await.unwrap();
        chain.close(&ctx, &conn).await.unwrap();
        assert!(sim.calls().is_empty());
        assert!(acl.rules().is_empty());
        assert_eq!(acl.state(conn.id()), TrackState::Unconfigured);
    }

    #[tokio::test]
    async fn next_failure_is_returned_untouched() {
        let sim = Arc::new(SimDataplane::new());
        let acl = AclServer::new(Gateway::new(sim.clone()), rules());
        // no metadata: the interface element refuses the request
        let chain = Chain::new("acl-test", Side::Server)
            .add_stage(acl)
            .add_stage(SimInterface::new(sim.clone()));
        let err = chain
            .request(&Context::background(), request("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Refused(_)));
        assert!(sim.calls().is_empty());
    }

    #[tokio::test]
    async fn compensation_reports_close_failure() {
        let Setup { sim, chain, .. } = setup_with(Side::Server, rules(), false);
        let chain = chain.add_stage(FailClose);
        let err = chain
            .request(&Context::background(), request("c1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            ChainError::InterfaceNotFound {
                side: Side::Server,
                ..
            }
        ));
        // the compensating close went down the chain and failed there
        assert!(matches!(err, ChainError::CloseError { .. }));
        assert!(err.to_string().contains("error closing connection: close refused"));
        assert!(sim.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_interface_is_reported() {
        let Setup { sim, acl, chain } = setup_with(Side::Server, rules(), false);
        let err = chain
            .request(&Context::background(), request("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::InterfaceNotFound { ref conn, .. } if conn.as_str() == "c1"));
        assert!(sim.calls().is_empty());
        assert_eq!(acl.state(&ConnId::new("c1")), TrackState::Unconfigured);
    }

    #[tokio::test]
    async fn failed_bind_deletes_both_acls() {
        let Setup { sim, acl, chain } = setup();
        sim.inject(ApiCall::AclInterfaceSetAclList, 0, Fault::Retval(-1));
        let err = chain
            .request(&Context::background(), request("c1"))
            .await
            .unwrap_err();
        let ChainError::DataplaneCallFailed(source) = &err else {
            panic!("unexpected error {err}");
        };
        let source = source.downcast_ref::<DataplaneError>().unwrap();
        assert_eq!(source.call(), ApiCall::AclInterfaceSetAclList);

        assert_eq!(sim.count(ApiCall::AclDel), 2);
        assert!(sim.acls().is_empty());
        assert!(sim.interfaces().is_empty());
        assert_eq!(acl.state(&ConnId::new("c1")), TrackState::Unconfigured);
    }

    #[tokio::test]
    async fn failed_egress_deletes_ingress() {
        let Setup { sim, chain, .. } = setup();
        sim.inject(ApiCall::AclAddReplace, 1, Fault::Transport);
        assert!(
            chain
                .request(&Context::background(), request("c1"))
                .await
                .is_err()
        );
        assert_eq!(sim.count(ApiCall::AclAddReplace), 2);
        assert_eq!(sim.count(ApiCall::AclInterfaceSetAclList), 0);
        let deleted: Vec<_> = sim
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::AclDel(del) => Some(del.acl_index),
                _ => None,
            })
            .collect();
        assert_eq!(deleted, vec![AclIndex(0)]);
        assert!(sim.acls().is_empty());
    }

    #[tokio::test]
    async fn failed_ingress_deletes_nothing() {
        let Setup { sim, chain, .. } = setup();
        sim.inject(ApiCall::AclAddReplace, 0, Fault::Retval(-6));
        assert!(
            chain
                .request(&Context::background(), request("c1"))
                .await
                .is_err()
        );
        assert_eq!(sim.count(ApiCall::AclAddReplace), 1);
        assert_eq!(sim.count(ApiCall::AclDel), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_survives_the_request_deadline() {
        let Setup { sim, chain, .. } = setup();
        sim.inject(ApiCall::AclInterfaceSetAclList, 0, Fault::Hang);
        let ctx = Context::background().with_timeout(Duration::from_secs(2));
        let err = chain.request(&ctx, request("c1")).await.unwrap_err();
        assert!(err.to_string().contains("interrupted"));
        // the deletes ran although the request context had expired
        assert_eq!(sim.count(ApiCall::AclDel), 2);
        assert!(sim.acls().is_empty());
    }

    #[tokio::test]
    async fn close_deletes_everything_it_can() {
        let Setup { sim, chain, .. } = setup();
        let ctx = Context::background();
        let conn = chain.request(&ctx, request("c1")).await.unwrap();
        sim.inject(ApiCall::AclDel, 0, Fault::Retval(-6));
        chain.close(&ctx, &conn).await.unwrap();
        assert_eq!(sim.count(ApiCall::AclDel), 2);
        assert_eq!(sim.acls().keys().copied().collect::<Vec<_>>(), vec![AclIndex(0)]);
        // the rest of the chain was closed anyway
        assert!(sim.interfaces().is_empty());
        // and the connection is forgotten
        sim.clear_calls();
        chain.close(&ctx, &conn).await.unwrap();
        assert!(sim.calls().is_empty());
    }

    #[tokio::test]
    async fn close_of_unknown_connection_only_forwards() {
        let Setup { sim, chain, .. } = setup();
        chain
            .close(&Context::background(), &Connection::new("nobody", "firewall"))
            .await
            .unwrap();
        assert!(sim.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_configure_once() {
        let Setup { sim, acl, chain } = setup();
        let chain = Arc::new(chain);
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let chain = chain.clone();
            tasks.push(tokio::spawn(async move {
                chain.request(&Context::background(), request("c1")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(sim.count(ApiCall::AclAddReplace), 2);
        assert_eq!(sim.count(ApiCall::AclInterfaceSetAclList), 1);
        assert_eq!(acl.applied(&ConnId::new("c1")).await.unwrap().len(), 2);
        assert_eq!(sim.interfaces().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_see_a_failed_bind_undone() {
        let Setup { sim, acl, chain } = setup();
        sim.inject(ApiCall::AclInterfaceSetAclList, 0, Fault::Retval(-1));
        let chain = Arc::new(chain);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let chain = chain.clone();
            tasks.push(tokio::spawn(async move {
                chain.request(&Context::background(), request("c1")).await
            }));
        }
        let mut succeeded = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert!(succeeded < 8);

        let applied = acl.applied(&ConnId::new("c1")).await;
        if succeeded > 0 {
            // whoever succeeded saw ACLs that are bound to a live interface
            let acls = applied.clone().unwrap();
            assert_eq!(acls.len(), 2);
            assert_eq!(acl.state(&ConnId::new("c1")), TrackState::Applied);
            assert!(
                sim.interfaces()
                    .into_iter()
                    .filter_map(|ifindex| sim.acl_list(ifindex))
                    .any(|list| list.acls == acls)
            );
        } else {
            assert_eq!(applied, None);
            assert_eq!(acl.state(&ConnId::new("c1")), TrackState::Unconfigured);
        }
        // no ACL outlives the failed attempt
        assert_eq!(sim.acls().len(), applied.map_or(0, |acls| acls.len()));
    }

    #[tokio::test]
    async fn connections_are_independent() {
        let Setup { sim, acl, chain } = setup();
        let ctx = Context::background();
        let one = chain.request(&ctx, request("c1")).await.unwrap();
        let two = chain.request(&ctx, request("c2")).await.unwrap();
        assert_eq!(sim.acls().len(), 4);
        chain.close(&ctx, &one).await.unwrap();
        assert_eq!(sim.acls().len(), 2);
        assert_eq!(acl.state(two.id()), TrackState::Applied);
        assert!(
            sim.acls()
                .values()
                .all(|acl| acl.tag == "nsm-acl-from-config-c2")
        );
    }
}
