// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Messages exchanged with the dataplane engine.
//!
//! Each request type maps to one binary API call of the engine's ACL and NAT44 plugins, and every
//! reply carries a `retval`: zero means success, anything else is an engine error code.

use ipnet::IpNet;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::str::FromStr;

pub use chain::IfIndex;

/// The API calls used by the firewall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ApiCall {
    AclAddReplace,
    AclInterfaceSetAclList,
    AclDel,
    #[strum(serialize = "nat44_interface_add_del_feature")]
    Nat44InterfaceAddDelFeature,
    #[strum(serialize = "nat44_add_del_address_range")]
    Nat44AddDelAddressRange,
    #[strum(serialize = "nat44_ed_plugin_enable_disable")]
    Nat44EdPluginEnableDisable,
}

/// Index of an ACL in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AclIndex(pub u32);

impl AclIndex {
    /// Passed in [`AclAddReplace`] to ask for a new ACL rather than replacing one
    pub const NEW: AclIndex = AclIndex(u32::MAX);
}

impl Display for AclIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to do with packets matching a rule
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString,
)]
#[repr(u8)]
pub enum AclAction {
    #[default]
    #[strum(serialize = "deny")]
    Deny = 0,
    #[strum(serialize = "permit")]
    Permit = 1,
    /// Permit, and let the reply traffic of the session through
    #[strum(to_string = "permit+reflect", serialize = "reflect")]
    PermitReflect = 2,
}

impl AclAction {
    /// The `is_permit` value on the wire
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for AclAction {
    type Error = u8;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Deny),
            1 => Ok(Self::Permit),
            2 => Ok(Self::PermitReflect),
            other => Err(other),
        }
    }
}

/// IP protocol number, 0 meaning any protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IpProto(pub u8);

impl IpProto {
    pub const ANY: IpProto = IpProto(0);
    pub const ICMP: IpProto = IpProto(1);
    pub const TCP: IpProto = IpProto(6);
    pub const UDP: IpProto = IpProto(17);
    pub const ICMPV6: IpProto = IpProto(58);

    const NAMES: [(&'static str, IpProto); 5] = [
        ("any", Self::ANY),
        ("icmp", Self::ICMP),
        ("tcp", Self::TCP),
        ("udp", Self::UDP),
        ("icmpv6", Self::ICMPV6),
    ];
}

impl Display for IpProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Self::NAMES.iter().find(|(_, proto)| proto == self) {
            Some((name, _)) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Error parsing an [`IpProto`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown IP protocol '{0}'")]
pub struct UnknownProtocol(pub String);

impl FromStr for IpProto {
    type Err = UnknownProtocol;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(number) = s.parse::<u8>() {
            return Ok(IpProto(number));
        }
        Self::NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, proto)| *proto)
            .ok_or_else(|| UnknownProtocol(s.to_owned()))
    }
}

/// A rule of an ACL, as the engine sees it.
///
/// For ICMP, the source "port" range holds ICMP types and the destination one ICMP codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AclRule {
    pub action: AclAction,
    pub src_prefix: IpNet,
    pub dst_prefix: IpNet,
    pub proto: IpProto,
    pub srcport_or_icmptype_first: u16,
    pub srcport_or_icmptype_last: u16,
    pub dstport_or_icmpcode_first: u16,
    pub dstport_or_icmpcode_last: u16,
    pub tcp_flags_mask: u8,
    pub tcp_flags_value: u8,
}

impl AclRule {
    /// A rule matching any port and any TCP flags between two prefixes
    #[must_use]
    pub fn new(action: AclAction, src_prefix: IpNet, dst_prefix: IpNet, proto: IpProto) -> Self {
        Self {
            action,
            src_prefix,
            dst_prefix,
            proto,
            srcport_or_icmptype_first: 0,
            srcport_or_icmptype_last: u16::MAX,
            dstport_or_icmpcode_first: 0,
            dstport_or_icmpcode_last: u16::MAX,
            tcp_flags_mask: 0,
            tcp_flags_value: 0,
        }
    }
    #[must_use]
    pub fn with_src_ports(mut self, first: u16, last: u16) -> Self {
        self.srcport_or_icmptype_first = first;
        self.srcport_or_icmptype_last = last;
        self
    }
    #[must_use]
    pub fn with_dst_ports(mut self, first: u16, last: u16) -> Self {
        self.dstport_or_icmpcode_first = first;
        self.dstport_or_icmpcode_last = last;
        self
    }
    #[must_use]
    pub fn with_tcp_flags(mut self, mask: u8, value: u8) -> Self {
        self.tcp_flags_mask = mask;
        self.tcp_flags_value = value;
        self
    }
}

impl Display for AclRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}:{}-{} -> {}:{}-{}",
            self.action,
            self.proto,
            self.src_prefix,
            self.srcport_or_icmptype_first,
            self.srcport_or_icmptype_last,
            self.dst_prefix,
            self.dstport_or_icmpcode_first,
            self.dstport_or_icmpcode_last,
        )?;
        if self.tcp_flags_mask != 0 {
            write!(
                f,
                " flags {:#04x}/{:#04x}",
                self.tcp_flags_value, self.tcp_flags_mask
            )?;
        }
        Ok(())
    }
}

/// Create an ACL, or replace the rules of an existing one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclAddReplace {
    pub acl_index: AclIndex,
    pub tag: String,
    pub rules: Vec<AclRule>,
}

impl AclAddReplace {
    /// The number of rules, as sent on the wire
    #[must_use]
    pub fn count(&self) -> u32 {
        u32::try_from(self.rules.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclAddReplaceReply {
    pub acl_index: AclIndex,
    pub retval: i32,
}

/// Set the ACLs applied to an interface. The first `n_input` ACLs filter the traffic entering
/// the engine through the interface, the others the traffic leaving through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclInterfaceSetAclList {
    pub sw_if_index: IfIndex,
    pub count: u8,
    pub n_input: u8,
    pub acls: Vec<AclIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclDel {
    pub acl_index: AclIndex,
}

bitflags::bitflags! {
    /// NAT44 configuration flags of an interface
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NatConfigFlags: u8 {
        const IS_TWICE_NAT = 0x01;
        const IS_SELF_TWICE_NAT = 0x02;
        const IS_OUT2IN_ONLY = 0x04;
        const IS_ADDR_ONLY = 0x08;
        const IS_OUTSIDE = 0x10;
        const IS_INSIDE = 0x20;
        const IS_STATIC = 0x40;
        const IS_EXT_HOST_VALID = 0x80;
    }
}

/// The role of an interface in address translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum NatRole {
    /// Faces the private network
    Inside,
    /// Faces the public network
    Outside,
}

impl NatRole {
    #[must_use]
    pub fn flags(self) -> NatConfigFlags {
        match self {
            NatRole::Inside => NatConfigFlags::IS_INSIDE,
            NatRole::Outside => NatConfigFlags::IS_OUTSIDE,
        }
    }
}

/// Enable or disable the NAT44 feature on an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nat44InterfaceAddDelFeature {
    pub is_add: bool,
    pub flags: NatConfigFlags,
    pub sw_if_index: IfIndex,
}

/// A contiguous range of IPv4 addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    first: Ipv4Addr,
    last: Ipv4Addr,
}

/// Error parsing an [`Ipv4Range`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("invalid address in range '{0}'")]
    Address(String),
    #[error("range '{0}' ends before it starts")]
    Reversed(String),
}

impl Ipv4Range {
    /// # Errors
    ///
    /// Fails if `last` is lower than `first`.
    pub fn new(first: Ipv4Addr, last: Ipv4Addr) -> Result<Self, RangeError> {
        if last < first {
            return Err(RangeError::Reversed(format!("{first}-{last}")));
        }
        Ok(Self { first, last })
    }
    #[must_use]
    pub fn single(addr: Ipv4Addr) -> Self {
        Self {
            first: addr,
            last: addr,
        }
    }
    #[must_use]
    pub fn first(&self) -> Ipv4Addr {
        self.first
    }
    #[must_use]
    pub fn last(&self) -> Ipv4Addr {
        self.last
    }
    /// Number of addresses in the range
    #[must_use]
    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.last) - u32::from(self.first)) + 1
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Display for Ipv4Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

/// Accepts `a.b.c.d`, `a.b.c.d-e.f.g.h` and `a.b.c.d/len` (all addresses of the prefix)
impl FromStr for Ipv4Range {
    type Err = RangeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let addr = |a: &str| {
            a.trim()
                .parse::<Ipv4Addr>()
                .map_err(|_| RangeError::Address(s.to_owned()))
        };
        if let Some((first, last)) = s.split_once('-') {
            return Self::new(addr(first)?, addr(last)?);
        }
        if s.contains('/') {
            let net = s
                .parse::<ipnet::Ipv4Net>()
                .map_err(|_| RangeError::Address(s.to_owned()))?;
            return Self::new(net.network(), net.broadcast());
        }
        Ok(Self::single(addr(s)?))
    }
}

/// Add or remove addresses of the NAT44 pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nat44AddDelAddressRange {
    pub first_ip_address: Ipv4Addr,
    pub last_ip_address: Ipv4Addr,
    pub vrf_id: u32,
    pub is_add: bool,
}

/// Parameters of the NAT44 endpoint-dependent plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NatPluginParams {
    pub inside_vrf: u32,
    pub outside_vrf: u32,
    /// Maximum number of sessions, 0 for the engine default
    pub sessions: u32,
}

/// Enable or disable the NAT44 endpoint-dependent plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nat44EdPluginEnableDisable {
    pub inside_vrf: u32,
    pub outside_vrf: u32,
    pub sessions: u32,
    pub enable: bool,
}

/// Reply of the calls that only report a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reply {
    pub retval: i32,
}

/// Replies carrying an engine return code
pub trait Retval {
    fn retval(&self) -> i32;
}

impl Retval for Reply {
    fn retval(&self) -> i32 {
        self.retval
    }
}

impl Retval for AclAddReplaceReply {
    fn retval(&self) -> i32 {
        self.retval
    }
}
