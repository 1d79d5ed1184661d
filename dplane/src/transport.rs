// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The connection to the dataplane engine

use async_trait::async_trait;
use std::fmt::Debug;

use crate::api::{
    AclAddReplace, AclAddReplaceReply, AclDel, AclInterfaceSetAclList, Nat44AddDelAddressRange,
    Nat44EdPluginEnableDisable, Nat44InterfaceAddDelFeature, Reply,
};

/// Failure to get a reply from the engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("not connected to the dataplane")]
    Disconnected,
    #[error("no reply from the dataplane")]
    NoReply,
    #[error("transport failure: {0}")]
    Other(String),
}

/// A binary API client of the dataplane engine.
///
/// Implementations only move messages: a reply with a non-zero `retval` is a successful
/// exchange. The [`Gateway`](crate::gateway::Gateway) turns those into errors.
#[async_trait]
pub trait DataplaneApi: Debug + Send + Sync {
    async fn acl_add_replace(
        &self,
        msg: &AclAddReplace,
    ) -> Result<AclAddReplaceReply, TransportError>;

    async fn acl_interface_set_acl_list(
        &self,
        msg: &AclInterfaceSetAclList,
    ) -> Result<Reply, TransportError>;

    async fn acl_del(&self, msg: &AclDel) -> Result<Reply, TransportError>;

    async fn nat44_interface_add_del_feature(
        &self,
        msg: &Nat44InterfaceAddDelFeature,
    ) -> Result<Reply, TransportError>;

    async fn nat44_add_del_address_range(
        &self,
        msg: &Nat44AddDelAddressRange,
    ) -> Result<Reply, TransportError>;

    async fn nat44_ed_plugin_enable_disable(
        &self,
        msg: &Nat44EdPluginEnableDisable,
    ) -> Result<Reply, TransportError>;
}
