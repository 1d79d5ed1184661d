// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Loading of the ACL rules from a YAML file.
//!
//! The file is a map of rule names to rule records:
//!
//! ```yaml
//! allow-http:
//!   action: permit
//!   proto: tcp
//!   src_prefix: 10.0.0.0/8
//!   dst_prefix: 0.0.0.0/0
//!   dstport_or_icmpcode_first: 80
//!   dstport_or_icmpcode_last: 80
//! deny-rest:
//!   ispermit: 0
//!   srcprefix: 0.0.0.0/0
//!   dstprefix: 0.0.0.0/0
//! ```
//!
//! Fields are snake_case; the flat lowercase names of older files are accepted as aliases.
//! Protocol and action are given by name or by number. Missing prefixes match anything, missing
//! port ranges cover all ports and a missing action denies. Rules keep the order of the file.

use dplane::api::{AclAction, AclRule, IpProto};
use ipnet::{IpNet, Ipv4Net};
use ordermap::OrderMap;
use serde::{Deserialize, Deserializer, de};
use std::path::Path;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info};

use crate::errors::{ConfigError, ConfigResult};

/// Where the rules are read from when nothing else is configured
pub const DEFAULT_ACL_CONFIG_PATH: &str = "/etc/firewall/config.yaml";

#[derive(Deserialize)]
#[serde(untagged)]
enum NameOrNumber {
    Number(u64),
    Name(String),
}

fn action<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AclAction, D::Error> {
    match NameOrNumber::deserialize(deserializer)? {
        NameOrNumber::Number(n) => u8::try_from(n)
            .ok()
            .and_then(|n| AclAction::try_from(n).ok())
            .ok_or_else(|| de::Error::custom(format!("invalid ACL action {n}"))),
        NameOrNumber::Name(name) => name
            .trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid ACL action '{name}'"))),
    }
}

fn proto<'de, D: Deserializer<'de>>(deserializer: D) -> Result<IpProto, D::Error> {
    match NameOrNumber::deserialize(deserializer)? {
        NameOrNumber::Number(n) => u8::try_from(n)
            .map(IpProto)
            .map_err(|_| de::Error::custom(format!("invalid IP protocol {n}"))),
        NameOrNumber::Name(name) => name.parse().map_err(de::Error::custom),
    }
}

fn any_prefix() -> IpNet {
    IpNet::V4(Ipv4Net::default())
}

fn last_port() -> u16 {
    u16::MAX
}

/// A rule as written in the file.
///
/// A missing `*_last` port bound defaults to 65535, so that a missing range covers all ports.
/// Older files read a missing bound as 0: such files must now write `0` to keep that meaning.
#[derive(Debug, Deserialize)]
struct RuleRecord {
    #[serde(default, alias = "ispermit", alias = "is_permit", deserialize_with = "action")]
    action: AclAction,
    #[serde(default = "any_prefix", alias = "srcprefix")]
    src_prefix: IpNet,
    #[serde(default = "any_prefix", alias = "dstprefix")]
    dst_prefix: IpNet,
    #[serde(default, deserialize_with = "proto")]
    proto: IpProto,
    #[serde(default, alias = "srcportoricmptypefirst")]
    srcport_or_icmptype_first: u16,
    #[serde(default = "last_port", alias = "srcportoricmptypelast")]
    srcport_or_icmptype_last: u16,
    #[serde(default, alias = "dstportoricmpcodefirst")]
    dstport_or_icmpcode_first: u16,
    #[serde(default = "last_port", alias = "dstportoricmpcodelast")]
    dstport_or_icmpcode_last: u16,
    #[serde(default, alias = "tcpflagsmask")]
    tcp_flags_mask: u8,
    #[serde(default, alias = "tcpflagsvalue")]
    tcp_flags_value: u8,
}

impl RuleRecord {
    fn into_rule(self, name: &str) -> ConfigResult<AclRule> {
        let bad = |reason: String| ConfigError::BadRule {
            name: name.to_owned(),
            reason,
        };
        if self.srcport_or_icmptype_first > self.srcport_or_icmptype_last {
            return Err(bad(format!(
                "source range {}-{} is reversed",
                self.srcport_or_icmptype_first, self.srcport_or_icmptype_last
            )));
        }
        if self.dstport_or_icmpcode_first > self.dstport_or_icmpcode_last {
            return Err(bad(format!(
                "destination range {}-{} is reversed",
                self.dstport_or_icmpcode_first, self.dstport_or_icmpcode_last
            )));
        }
        if self.tcp_flags_value & !self.tcp_flags_mask != 0 {
            return Err(bad(format!(
                "TCP flags {:#04x} are not covered by mask {:#04x}",
                self.tcp_flags_value, self.tcp_flags_mask
            )));
        }
        Ok(
            AclRule::new(self.action, self.src_prefix, self.dst_prefix, self.proto)
                .with_src_ports(
                    self.srcport_or_icmptype_first,
                    self.srcport_or_icmptype_last,
                )
                .with_dst_ports(self.dstport_or_icmpcode_first, self.dstport_or_icmpcode_last)
                .with_tcp_flags(self.tcp_flags_mask, self.tcp_flags_value),
        )
    }
}

/// Parse the named rules of a YAML document, in document order.
///
/// # Errors
///
/// Fails if the document is not a map of rule records or if a record is inconsistent.
pub fn parse_acl_rules(input: &str) -> ConfigResult<OrderMap<String, AclRule>> {
    if input.trim().is_empty() {
        return Ok(OrderMap::new());
    }
    let records: Option<OrderMap<String, RuleRecord>> = serde_yaml_ng::from_str(input)?;
    records
        .unwrap_or_default()
        .into_iter()
        .map(|(name, record)| {
            let rule = record.into_rule(&name)?;
            Ok((name, rule))
        })
        .collect()
}

/// Read and parse the rules of a file
///
/// # Errors
///
/// Fails if the file can't be read or parsed.
pub fn read_acl_rules(path: &Path) -> ConfigResult<OrderMap<String, AclRule>> {
    let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    parse_acl_rules(&input)
}

/// Load the rules the ACL element applies to every connection.
///
/// A missing or malformed file is not fatal: the error is logged and no rule is applied.
#[must_use]
pub fn load_acl_rules(path: &Path) -> Arc<[AclRule]> {
    match read_acl_rules(path) {
        Ok(rules) => {
            info!("Loaded {} ACL rule(s) from {}", rules.len(), path.display());
            for (name, rule) in &rules {
                debug!("ACL rule {name}: {rule}");
            }
            rules.into_values().collect()
        }
        Err(e) => {
            error!("No ACL rule loaded: {e}");
            Arc::from(Vec::new())
        }
    }
}
