// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration calls to the dataplane, bounded by the request context and checked for errors

use chain::{ChainError, Context, ContextError};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, trace, warn};

use crate::api::{
    AclAddReplace, AclDel, AclIndex, AclInterfaceSetAclList, ApiCall, IfIndex,
    Ipv4Range, Nat44AddDelAddressRange, Nat44EdPluginEnableDisable, Nat44InterfaceAddDelFeature,
    NatPluginParams, NatRole, Retval,
};
use crate::transport::{DataplaneApi, TransportError};

/// Failure of a dataplane call
#[derive(Debug, thiserror::Error)]
pub enum DataplaneError {
    #[error("{call}: {source}")]
    Transport {
        call: ApiCall,
        #[source]
        source: TransportError,
    },
    #[error("{call} returned error code {retval}")]
    Retval { call: ApiCall, retval: i32 },
    #[error("{call} interrupted: {source}")]
    Interrupted {
        call: ApiCall,
        #[source]
        source: ContextError,
    },
    #[error("{call}: too many ACLs for one interface ({count})")]
    TooManyAcls { call: ApiCall, count: usize },
}

impl DataplaneError {
    /// The call that failed
    #[must_use]
    pub fn call(&self) -> ApiCall {
        match self {
            Self::Transport { call, .. }
            | Self::Retval { call, .. }
            | Self::Interrupted { call, .. }
            | Self::TooManyAcls { call, .. } => *call,
        }
    }
}

impl From<DataplaneError> for ChainError {
    fn from(value: DataplaneError) -> Self {
        ChainError::DataplaneCallFailed(Box::new(value))
    }
}

/// Issues the configuration calls of the firewall over a shared [`DataplaneApi`]
#[derive(Debug, Clone)]
pub struct Gateway {
    api: Arc<dyn DataplaneApi>,
}

impl Gateway {
    #[must_use]
    pub fn new(api: Arc<dyn DataplaneApi>) -> Self {
        Self { api }
    }

    async fn invoke<R: Retval>(
        ctx: &Context,
        call: ApiCall,
        exchange: impl Future<Output = Result<R, TransportError>>,
    ) -> Result<R, DataplaneError> {
        let start = Instant::now();
        let reply = ctx
            .run(exchange)
            .await
            .map_err(|source| DataplaneError::Interrupted { call, source })?
            .map_err(|source| DataplaneError::Transport { call, source })?;
        debug!(%call, duration = ?start.elapsed(), retval = reply.retval(), "dataplane call");
        match reply.retval() {
            0 => Ok(reply),
            retval => Err(DataplaneError::Retval { call, retval }),
        }
    }

    /// Create an ACL and return its index
    ///
    /// # Errors
    ///
    /// Fails if the call fails or the engine refuses the ACL.
    pub async fn add_acl(
        &self,
        ctx: &Context,
        msg: &AclAddReplace,
    ) -> Result<AclIndex, DataplaneError> {
        let reply =
            Self::invoke(ctx, ApiCall::AclAddReplace, self.api.acl_add_replace(msg)).await?;
        debug!(tag = %msg.tag, acl_index = %reply.acl_index, rules = msg.count(), "added ACL");
        Ok(reply.acl_index)
    }

    /// Apply ACLs to an interface: `ingress` to the traffic entering the dataplane through it,
    /// `egress` to the traffic leaving through it. This replaces the ACLs previously applied.
    ///
    /// # Errors
    ///
    /// Fails if the call fails or the engine refuses the list.
    pub async fn set_interface_acls(
        &self,
        ctx: &Context,
        ifindex: IfIndex,
        ingress: &[AclIndex],
        egress: &[AclIndex],
    ) -> Result<(), DataplaneError> {
        let call = ApiCall::AclInterfaceSetAclList;
        let total = ingress.len() + egress.len();
        let too_many = || DataplaneError::TooManyAcls { call, count: total };
        let msg = AclInterfaceSetAclList {
            sw_if_index: ifindex,
            count: u8::try_from(total).map_err(|_| too_many())?,
            n_input: u8::try_from(ingress.len()).map_err(|_| too_many())?,
            acls: ingress.iter().chain(egress).copied().collect(),
        };
        Self::invoke(ctx, call, self.api.acl_interface_set_acl_list(&msg)).await?;
        debug!(%ifindex, acls = ?msg.acls, n_input = msg.n_input, "applied ACLs to interface");
        Ok(())
    }

    /// Delete an ACL
    ///
    /// # Errors
    ///
    /// Fails if the call fails or the engine does not know the ACL.
    pub async fn delete_acl(&self, ctx: &Context, acl_index: AclIndex) -> Result<(), DataplaneError> {
        let msg = AclDel { acl_index };
        Self::invoke(ctx, ApiCall::AclDel, self.api.acl_del(&msg)).await?;
        debug!(%acl_index, "deleted ACL");
        Ok(())
    }

    async fn nat_feature(
        &self,
        ctx: &Context,
        ifindex: IfIndex,
        role: NatRole,
        is_add: bool,
    ) -> Result<(), DataplaneError> {
        let msg = Nat44InterfaceAddDelFeature {
            is_add,
            flags: role.flags(),
            sw_if_index: ifindex,
        };
        Self::invoke(
            ctx,
            ApiCall::Nat44InterfaceAddDelFeature,
            self.api.nat44_interface_add_del_feature(&msg),
        )
        .await?;
        Ok(())
    }

    /// Enable address translation on an interface, with the given role
    ///
    /// # Errors
    ///
    /// Fails if the call fails or the engine refuses the interface.
    pub async fn enable_nat_interface(
        &self,
        ctx: &Context,
        ifindex: IfIndex,
        role: NatRole,
    ) -> Result<(), DataplaneError> {
        self.nat_feature(ctx, ifindex, role, true).await?;
        debug!(%ifindex, %role, "enabled NAT on interface");
        Ok(())
    }

    /// Disable address translation on an interface. The role must be the one it was enabled with.
    ///
    /// # Errors
    ///
    /// Fails if the call fails or the engine refuses the request.
    pub async fn disable_nat_interface(
        &self,
        ctx: &Context,
        ifindex: IfIndex,
        role: NatRole,
    ) -> Result<(), DataplaneError> {
        self.nat_feature(ctx, ifindex, role, false).await?;
        debug!(%ifindex, %role, "disabled NAT on interface");
        Ok(())
    }

    async fn nat_address_range(
        &self,
        ctx: &Context,
        range: Ipv4Range,
        vrf_id: u32,
        is_add: bool,
    ) -> Result<(), DataplaneError> {
        let msg = Nat44AddDelAddressRange {
            first_ip_address: range.first(),
            last_ip_address: range.last(),
            vrf_id,
            is_add,
        };
        Self::invoke(
            ctx,
            ApiCall::Nat44AddDelAddressRange,
            self.api.nat44_add_del_address_range(&msg),
        )
        .await?;
        Ok(())
    }

    /// Add a range of addresses to the translation pool
    ///
    /// # Errors
    ///
    /// Fails if the call fails or the engine refuses the range.
    pub async fn add_nat_addresses(
        &self,
        ctx: &Context,
        range: Ipv4Range,
        vrf_id: u32,
    ) -> Result<(), DataplaneError> {
        self.nat_address_range(ctx, range, vrf_id, true).await?;
        debug!(%range, vrf_id, "added NAT addresses");
        Ok(())
    }

    /// Remove a range of addresses from the translation pool
    ///
    /// # Errors
    ///
    /// Fails if the call fails or the engine refuses the request.
    pub async fn remove_nat_addresses(
        &self,
        ctx: &Context,
        range: Ipv4Range,
        vrf_id: u32,
    ) -> Result<(), DataplaneError> {
        self.nat_address_range(ctx, range, vrf_id, false).await?;
        debug!(%range, vrf_id, "removed NAT addresses");
        Ok(())
    }

    /// Enable or disable the NAT44 plugin
    ///
    /// # Errors
    ///
    /// Fails if the call fails or the engine refuses the parameters.
    pub async fn nat_plugin(
        &self,
        ctx: &Context,
        params: &NatPluginParams,
        enable: bool,
    ) -> Result<(), DataplaneError> {
        let msg = Nat44EdPluginEnableDisable {
            inside_vrf: params.inside_vrf,
            outside_vrf: params.outside_vrf,
            sessions: params.sessions,
            enable,
        };
        Self::invoke(
            ctx,
            ApiCall::Nat44EdPluginEnableDisable,
            self.api.nat44_ed_plugin_enable_disable(&msg),
        )
        .await?;
        debug!(?params, enable, "set NAT44 plugin");
        Ok(())
    }
}
