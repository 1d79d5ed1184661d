// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An in-memory dataplane engine.
//!
//! [`SimDataplane`] answers the API calls of the firewall the way the engine does, keeps the
//! resulting configuration, and remembers every call it received. Faults can be injected per
//! call type to exercise error paths. [`SimInterface`] is the chain element creating one engine
//! interface per connection and side, which the ACL and NAT elements then configure.

use async_trait::async_trait;
use chain::{ChainError, Connection, Context, NetworkService, Next, Request};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, trace, warn};

use crate::api::{
    AclAddReplace, AclAddReplaceReply, AclDel, AclIndex, AclInterfaceSetAclList, AclRule,
    ApiCall, IfIndex, Ipv4Range, Nat44AddDelAddressRange, Nat44EdPluginEnableDisable,
    Nat44InterfaceAddDelFeature, NatConfigFlags, NatPluginParams, Reply, Retval,
};
use crate::transport::{DataplaneApi, TransportError};

/// Generic failure
pub const RV_INVALID_VALUE: i32 = -1;
/// The interface does not exist
pub const RV_INVALID_SW_IF_INDEX: i32 = -2;
/// The object to delete or use does not exist
pub const RV_NO_SUCH_ENTRY: i32 = -6;
/// The object to create already exists
pub const RV_VALUE_EXIST: i32 = -17;
/// The feature is not enabled
pub const RV_UNSUPPORTED: i32 = -30;

/// A call received by the simulated engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AclAddReplace(AclAddReplace),
    AclInterfaceSetAclList(AclInterfaceSetAclList),
    AclDel(AclDel),
    Nat44InterfaceAddDelFeature(Nat44InterfaceAddDelFeature),
    Nat44AddDelAddressRange(Nat44AddDelAddressRange),
    Nat44EdPluginEnableDisable(Nat44EdPluginEnableDisable),
}

impl Call {
    #[must_use]
    pub fn api(&self) -> ApiCall {
        match self {
            Call::AclAddReplace(_) => ApiCall::AclAddReplace,
            Call::AclInterfaceSetAclList(_) => ApiCall::AclInterfaceSetAclList,
            Call::AclDel(_) => ApiCall::AclDel,
            Call::Nat44InterfaceAddDelFeature(_) => ApiCall::Nat44InterfaceAddDelFeature,
            Call::Nat44AddDelAddressRange(_) => ApiCall::Nat44AddDelAddressRange,
            Call::Nat44EdPluginEnableDisable(_) => ApiCall::Nat44EdPluginEnableDisable,
        }
    }
}

/// A failure to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reply with the given error code
    Retval(i32),
    /// Lose the reply
    Transport,
    /// Never reply
    Hang,
}

#[derive(Debug)]
struct Injection {
    call: ApiCall,
    skip: usize,
    fault: Fault,
}

/// An ACL known to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimAcl {
    pub tag: String,
    pub rules: Vec<AclRule>,
}

/// The ACLs applied to an interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimAclList {
    pub n_input: u8,
    pub acls: Vec<AclIndex>,
}

#[derive(Debug)]
struct SimState {
    next_acl: u32,
    next_ifindex: u32,
    interfaces: BTreeSet<IfIndex>,
    acls: BTreeMap<AclIndex, SimAcl>,
    acl_lists: BTreeMap<IfIndex, SimAclList>,
    nat_interfaces: BTreeMap<IfIndex, NatConfigFlags>,
    nat_pool: Vec<(Ipv4Range, u32)>,
    nat_plugin: Option<NatPluginParams>,
    journal: Vec<Call>,
    faults: Vec<Injection>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            next_acl: 0,
            // interface 0 is the engine's own
            next_ifindex: 1,
            interfaces: BTreeSet::new(),
            acls: BTreeMap::new(),
            acl_lists: BTreeMap::new(),
            nat_interfaces: BTreeMap::new(),
            nat_pool: Vec::new(),
            nat_plugin: None,
            journal: Vec::new(),
            faults: Vec::new(),
        }
    }
}

impl SimState {
    fn take_fault(&mut self, call: ApiCall) -> Option<Fault> {
        let position = self.faults.iter().position(|i| i.call == call)?;
        let injection = &mut self.faults[position];
        if injection.skip > 0 {
            injection.skip -= 1;
            return None;
        }
        Some(self.faults.remove(position).fault)
    }

    fn acl_add_replace(&mut self, msg: &AclAddReplace) -> AclAddReplaceReply {
        let acl = SimAcl {
            tag: msg.tag.clone(),
            rules: msg.rules.clone(),
        };
        let acl_index = if msg.acl_index == AclIndex::NEW {
            let index = AclIndex(self.next_acl);
            self.next_acl += 1;
            index
        } else if self.acls.contains_key(&msg.acl_index) {
            msg.acl_index
        } else {
            return AclAddReplaceReply::failed(RV_NO_SUCH_ENTRY);
        };
        self.acls.insert(acl_index, acl);
        AclAddReplaceReply {
            acl_index,
            retval: 0,
        }
    }

    fn acl_interface_set_acl_list(&mut self, msg: &AclInterfaceSetAclList) -> Reply {
        if !self.interfaces.contains(&msg.sw_if_index) {
            return Reply::failed(RV_INVALID_SW_IF_INDEX);
        }
        if usize::from(msg.count) != msg.acls.len() || msg.n_input > msg.count {
            return Reply::failed(RV_INVALID_VALUE);
        }
        if msg.acls.iter().any(|acl| !self.acls.contains_key(acl)) {
            return Reply::failed(RV_NO_SUCH_ENTRY);
        }
        if msg.acls.is_empty() {
            self.acl_lists.remove(&msg.sw_if_index);
        } else {
            self.acl_lists.insert(
                msg.sw_if_index,
                SimAclList {
                    n_input: msg.n_input,
                    acls: msg.acls.clone(),
                },
            );
        }
        Reply::default()
    }

    fn acl_del(&mut self, msg: &AclDel) -> Reply {
        if self.acls.remove(&msg.acl_index).is_none() {
            return Reply::failed(RV_NO_SUCH_ENTRY);
        }
        for list in self.acl_lists.values_mut() {
            if let Some(position) = list.acls.iter().position(|acl| *acl == msg.acl_index) {
                list.acls.remove(position);
                if position < usize::from(list.n_input) {
                    list.n_input -= 1;
                }
            }
        }
        self.acl_lists.retain(|_, list| !list.acls.is_empty());
        Reply::default()
    }

    fn nat44_interface_add_del_feature(&mut self, msg: &Nat44InterfaceAddDelFeature) -> Reply {
        if self.nat_plugin.is_none() {
            return Reply::failed(RV_UNSUPPORTED);
        }
        if !self.interfaces.contains(&msg.sw_if_index) {
            return Reply::failed(RV_INVALID_SW_IF_INDEX);
        }
        let current = self
            .nat_interfaces
            .get(&msg.sw_if_index)
            .copied()
            .unwrap_or(NatConfigFlags::empty());
        if msg.is_add {
            if current.intersects(msg.flags) {
                return Reply::failed(RV_VALUE_EXIST);
            }
            self.nat_interfaces
                .insert(msg.sw_if_index, current | msg.flags);
        } else {
            if !current.contains(msg.flags) {
                return Reply::failed(RV_NO_SUCH_ENTRY);
            }
            let remaining = current - msg.flags;
            if remaining.is_empty() {
                self.nat_interfaces.remove(&msg.sw_if_index);
            } else {
                self.nat_interfaces.insert(msg.sw_if_index, remaining);
            }
        }
        Reply::default()
    }

    fn nat44_add_del_address_range(&mut self, msg: &Nat44AddDelAddressRange) -> Reply {
        if self.nat_plugin.is_none() {
            return Reply::failed(RV_UNSUPPORTED);
        }
        let Ok(range) = Ipv4Range::new(msg.first_ip_address, msg.last_ip_address) else {
            return Reply::failed(RV_INVALID_VALUE);
        };
        if msg.is_add {
            let overlaps = self
                .nat_pool
                .iter()
                .any(|(r, _)| r.first() <= range.last() && range.first() <= r.last());
            if overlaps {
                return Reply::failed(RV_VALUE_EXIST);
            }
            self.nat_pool.push((range, msg.vrf_id));
        } else {
            let before = self.nat_pool.len();
            self.nat_pool.retain(|(r, _)| *r != range);
            if self.nat_pool.len() == before {
                return Reply::failed(RV_NO_SUCH_ENTRY);
            }
        }
        Reply::default()
    }

    fn nat44_ed_plugin_enable_disable(&mut self, msg: &Nat44EdPluginEnableDisable) -> Reply {
        match (msg.enable, self.nat_plugin.is_some()) {
            (true, true) => Reply::failed(RV_VALUE_EXIST),
            (false, false) => Reply::failed(RV_UNSUPPORTED),
            (true, false) => {
                self.nat_plugin = Some(NatPluginParams {
                    inside_vrf: msg.inside_vrf,
                    outside_vrf: msg.outside_vrf,
                    sessions: msg.sessions,
                });
                Reply::default()
            }
            (false, true) => {
                self.nat_plugin = None;
                self.nat_pool.clear();
                self.nat_interfaces.clear();
                Reply::default()
            }
        }
    }
}

trait SimReply: Retval + Sized {
    fn failed(retval: i32) -> Self;
}

impl SimReply for Reply {
    fn failed(retval: i32) -> Self {
        Reply { retval }
    }
}

impl SimReply for AclAddReplaceReply {
    fn failed(retval: i32) -> Self {
        AclAddReplaceReply {
            acl_index: AclIndex::NEW,
            retval,
        }
    }
}

/// The simulated engine
#[derive(Debug, Default)]
pub struct SimDataplane {
    state: Mutex<SimState>,
}

impl SimDataplane {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn exchange<R: SimReply>(
        &self,
        call: Call,
        apply: impl FnOnce(&mut SimState) -> R + Send,
    ) -> Result<R, TransportError> {
        tokio::task::yield_now().await;
        let fault = {
            let mut state = self.state.lock();
            let fault = state.take_fault(call.api());
            trace!(call = %call.api(), ?fault, "simulated engine received call");
            state.journal.push(call);
            match fault {
                None => return Ok(apply(&mut state)),
                Some(fault) => fault,
            }
        };
        match fault {
            Fault::Retval(retval) => Ok(R::failed(retval)),
            Fault::Transport => Err(TransportError::NoReply),
            Fault::Hang => std::future::pending().await,
        }
    }

    /// Make the next call of the given type fail, after `skip` successful ones
    pub fn inject(&self, call: ApiCall, skip: usize, fault: Fault) {
        self.state.lock().faults.push(Injection { call, skip, fault });
    }

    /// Create an interface and return its index
    pub fn create_interface(&self) -> IfIndex {
        let mut state = self.state.lock();
        let ifindex = IfIndex(state.next_ifindex);
        state.next_ifindex += 1;
        state.interfaces.insert(ifindex);
        debug!(%ifindex, "created interface");
        ifindex
    }

    /// Delete an interface, with the configuration attached to it. Returns false if the
    /// interface did not exist.
    pub fn delete_interface(&self, ifindex: IfIndex) -> bool {
        let mut state = self.state.lock();
        state.acl_lists.remove(&ifindex);
        state.nat_interfaces.remove(&ifindex);
        let existed = state.interfaces.remove(&ifindex);
        if existed {
            debug!(%ifindex, "deleted interface");
        }
        existed
    }

    #[must_use]
    pub fn interfaces(&self) -> Vec<IfIndex> {
        self.state.lock().interfaces.iter().copied().collect()
    }

    /// All the calls received, in order, including failed ones
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().journal.clone()
    }

    /// Number of calls of a type received
    #[must_use]
    pub fn count(&self, call: ApiCall) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|c| c.api() == call)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().journal.clear();
    }

    #[must_use]
    pub fn acls(&self) -> BTreeMap<AclIndex, SimAcl> {
        self.state.lock().acls.clone()
    }

    #[must_use]
    pub fn acl_list(&self, ifindex: IfIndex) -> Option<SimAclList> {
        self.state.lock().acl_lists.get(&ifindex).cloned()
    }

    #[must_use]
    pub fn nat_interface(&self, ifindex: IfIndex) -> Option<NatConfigFlags> {
        self.state.lock().nat_interfaces.get(&ifindex).copied()
    }

    #[must_use]
    pub fn nat_pool(&self) -> Vec<(Ipv4Range, u32)> {
        self.state.lock().nat_pool.clone()
    }

    #[must_use]
    pub fn nat_plugin(&self) -> Option<NatPluginParams> {
        self.state.lock().nat_plugin
    }
}

#[async_trait]
impl DataplaneApi for SimDataplane {
    async fn acl_add_replace(
        &self,
        msg: &AclAddReplace,
    ) -> Result<AclAddReplaceReply, TransportError> {
        self.exchange(Call::AclAddReplace(msg.clone()), |s| s.acl_add_replace(msg))
            .await
    }

    async fn acl_interface_set_acl_list(
        &self,
        msg: &AclInterfaceSetAclList,
    ) -> Result<Reply, TransportError> {
        self.exchange(Call::AclInterfaceSetAclList(msg.clone()), |s| {
            s.acl_interface_set_acl_list(msg)
        })
        .await
    }

    async fn acl_del(&self, msg: &AclDel) -> Result<Reply, TransportError> {
        self.exchange(Call::AclDel(*msg), |s| s.acl_del(msg)).await
    }

    async fn nat44_interface_add_del_feature(
        &self,
        msg: &Nat44InterfaceAddDelFeature,
    ) -> Result<Reply, TransportError> {
        self.exchange(Call::Nat44InterfaceAddDelFeature(*msg), |s| {
            s.nat44_interface_add_del_feature(msg)
        })
        .await
    }

    async fn nat44_add_del_address_range(
        &self,
        msg: &Nat44AddDelAddressRange,
    ) -> Result<Reply, TransportError> {
        self.exchange(Call::Nat44AddDelAddressRange(*msg), |s| {
            s.nat44_add_del_address_range(msg)
        })
        .await
    }

    async fn nat44_ed_plugin_enable_disable(
        &self,
        msg: &Nat44EdPluginEnableDisable,
    ) -> Result<Reply, TransportError> {
        self.exchange(Call::Nat44EdPluginEnableDisable(*msg), |s| {
            s.nat44_ed_plugin_enable_disable(msg)
        })
        .await
    }
}

/// Chain element giving each connection an interface of the simulated engine, on the side of
/// the chain it sits in. The interface index is stored in the connection metadata and the
/// interface is deleted once the rest of the chain has closed the connection.
#[derive(Debug)]
pub struct SimInterface {
    dataplane: Arc<SimDataplane>,
}

impl SimInterface {
    #[must_use]
    pub fn new(dataplane: Arc<SimDataplane>) -> Self {
        Self { dataplane }
    }
}

#[async_trait]
impl NetworkService for SimInterface {
    async fn request(
        &self,
        ctx: &Context,
        request: Request,
        next: Next<'_>,
    ) -> Result<Connection, ChainError> {
        let Some(metadata) = ctx.metadata() else {
            return Err(ChainError::Refused(
                "interface provisioning needs connection metadata".to_string(),
            ));
        };
        let side = next.side();
        let (ifindex, created) =
            metadata.load_or_store_ifindex(side, || self.dataplane.create_interface());
        if created {
            debug!(conn = %request.connection().id(), %ifindex, %side, "attached interface");
        }
        match next.request(ctx, request).await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                if created {
                    metadata.delete_ifindex(side);
                    self.dataplane.delete_interface(ifindex);
                }
                Err(e)
            }
        }
    }

    async fn close(
        &self,
        ctx: &Context,
        conn: &Connection,
        next: Next<'_>,
    ) -> Result<(), ChainError> {
        let result = next.close(ctx, conn).await;
        if let Some(ifindex) = ctx
            .metadata()
            .and_then(|metadata| metadata.delete_ifindex(next.side()))
        {
            self.dataplane.delete_interface(ifindex);
            debug!(conn = %conn.id(), %ifindex, "detached interface");
        }
        result
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::{Call, Fault, RV_NO_SUCH_ENTRY, RV_UNSUPPORTED, SimDataplane, SimInterface};
    use crate::api::{
        AclAction, AclAddReplace, AclDel, AclIndex, AclInterfaceSetAclList, AclRule, ApiCall,
        IpProto, Nat44EdPluginEnableDisable, Nat44InterfaceAddDelFeature, NatConfigFlags,
    };
    use crate::transport::{DataplaneApi, TransportError};
    use chain::{Chain, Connection, Context, MetadataServer, Request, Side};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn add(tag: &str) -> AclAddReplace {
        let any = "0.0.0.0/0".parse().unwrap();
        AclAddReplace {
            acl_index: AclIndex::NEW,
            tag: tag.to_string(),
            rules: vec![AclRule::new(AclAction::Permit, any, any, IpProto::TCP)],
        }
    }

    #[tokio::test]
    async fn acls_are_created_bound_and_deleted() {
        let sim = SimDataplane::new();
        let ifindex = sim.create_interface();
        let a = sim.acl_add_replace(&add("a")).await.unwrap();
        let b = sim.acl_add_replace(&add("b")).await.unwrap();
        assert_eq!((a.retval, a.acl_index), (0, AclIndex(0)));
        assert_eq!(b.acl_index, AclIndex(1));

        let bind = AclInterfaceSetAclList {
            sw_if_index: ifindex,
            count: 2,
            n_input: 1,
            acls: vec![a.acl_index, b.acl_index],
        };
        assert_eq!(sim.acl_interface_set_acl_list(&bind).await.unwrap().retval, 0);
        assert_eq!(sim.acl_list(ifindex).unwrap().n_input, 1);

        let del = AclDel {
            acl_index: a.acl_index,
        };
        assert_eq!(sim.acl_del(&del).await.unwrap().retval, 0);
        assert_eq!(sim.acl_del(&del).await.unwrap().retval, RV_NO_SUCH_ENTRY);
        let list = sim.acl_list(ifindex).unwrap();
        assert_eq!((list.n_input, list.acls), (0, vec![b.acl_index]));

        assert_eq!(sim.count(ApiCall::AclDel), 2);
        assert!(matches!(sim.calls()[0], Call::AclAddReplace(_)));
    }

    #[tokio::test]
    async fn nat_needs_the_plugin() {
        let sim = SimDataplane::new();
        let ifindex = sim.create_interface();
        let feature = Nat44InterfaceAddDelFeature {
            is_add: true,
            flags: NatConfigFlags::IS_INSIDE,
            sw_if_index: ifindex,
        };
        let reply = sim.nat44_interface_add_del_feature(&feature).await.unwrap();
        assert_eq!(reply.retval, RV_UNSUPPORTED);

        let enable = Nat44EdPluginEnableDisable {
            inside_vrf: 0,
            outside_vrf: 0,
            sessions: 0,
            enable: true,
        };
        assert_eq!(
            sim.nat44_ed_plugin_enable_disable(&enable)
                .await
                .unwrap()
                .retval,
            0
        );
        let reply = sim.nat44_interface_add_del_feature(&feature).await.unwrap();
        assert_eq!(reply.retval, 0);
        assert_eq!(sim.nat_interface(ifindex), Some(NatConfigFlags::IS_INSIDE));
    }

    #[tokio::test]
    async fn injected_faults() {
        let sim = SimDataplane::new();
        sim.inject(ApiCall::AclAddReplace, 1, Fault::Retval(-99));
        sim.inject(ApiCall::AclDel, 0, Fault::Transport);

        assert_eq!(sim.acl_add_replace(&add("a")).await.unwrap().retval, 0);
        assert_eq!(sim.acl_add_replace(&add("b")).await.unwrap().retval, -99);
        assert_eq!(sim.acl_add_replace(&add("c")).await.unwrap().retval, 0);
        let del = AclDel {
            acl_index: AclIndex(0),
        };
        assert_eq!(sim.acl_del(&del).await, Err(TransportError::NoReply));
        assert_eq!(sim.acls().len(), 2);
        assert_eq!(sim.count(ApiCall::AclAddReplace), 3);
    }

    #[tokio::test]
    async fn interface_element_follows_the_connection() {
        let sim = Arc::new(SimDataplane::new());
        let chain = Chain::new("server", Side::Server)
            .add_stage(MetadataServer::new())
            .add_stage(SimInterface::new(sim.clone()));

        let conn = chain
            .request(&Context::background(), Request::new(Connection::new("c1", "fw")))
            .await
            .unwrap();
        assert_eq!(sim.interfaces().len(), 1);

        // a refresh keeps the interface
        chain
            .request(&Context::background(), Request::new(conn.clone()))
            .await
            .unwrap();
        assert_eq!(sim.interfaces().len(), 1);

        chain.close(&Context::background(), &conn).await.unwrap();
        assert!(sim.interfaces().is_empty());
    }

    #[tokio::test]
    async fn interface_element_needs_metadata() {
        let sim = Arc::new(SimDataplane::new());
        let chain = Chain::new("server", Side::Server).add_stage(SimInterface::new(sim.clone()));
        let result = chain
            .request(&Context::background(), Request::new(Connection::new("c1", "fw")))
            .await;
        assert!(result.is_err());
        assert!(sim.interfaces().is_empty());
    }
}
