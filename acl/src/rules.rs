// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Turning the configured rules into ACLs for one direction of an interface.
//!
//! Rules are written from the point of view of traffic entering the dataplane through the
//! connection interface. The ACL for the opposite direction applies the same rules to the
//! replies, so source and destination are exchanged.

use chain::ConnId;
use dplane::api::{AclAddReplace, AclIndex, AclRule};

/// Prefix of the tag of the ACLs created for a connection
pub const ACL_TAG_PREFIX: &str = "nsm-acl-from-config";

/// Direction of the traffic an ACL filters, relative to the dataplane
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// Traffic entering the dataplane through the interface
    Ingress,
    /// Traffic leaving the dataplane through the interface
    Egress,
}

/// The same rule, seen from the other end: prefixes and port ranges swap places
#[must_use]
pub fn reverse(rule: &AclRule) -> AclRule {
    AclRule {
        src_prefix: rule.dst_prefix,
        dst_prefix: rule.src_prefix,
        srcport_or_icmptype_first: rule.dstport_or_icmpcode_first,
        srcport_or_icmptype_last: rule.dstport_or_icmpcode_last,
        dstport_or_icmpcode_first: rule.srcport_or_icmptype_first,
        dstport_or_icmpcode_last: rule.srcport_or_icmptype_last,
        ..rule.clone()
    }
}

/// Copy the rules for the given direction
#[must_use]
pub fn transform(rules: &[AclRule], direction: Direction) -> Vec<AclRule> {
    match direction {
        Direction::Ingress => rules.to_vec(),
        Direction::Egress => rules.iter().map(reverse).collect(),
    }
}

/// The tag of the ACLs of a connection
#[must_use]
pub fn acl_tag(conn: &ConnId) -> String {
    format!("{ACL_TAG_PREFIX}-{conn}")
}

/// The request creating the ACL of a connection for one direction
#[must_use]
pub fn acl_add_replace(rules: &[AclRule], direction: Direction, tag: &str) -> AclAddReplace {
    AclAddReplace {
        acl_index: AclIndex::NEW,
        tag: tag.to_owned(),
        rules: transform(rules, direction),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::{Direction, acl_add_replace, acl_tag, reverse, transform};
    use chain::ConnId;
    use dplane::api::{AclAction, AclIndex, AclRule, IpProto};
    use ipnet::{IpNet, Ipv4Net};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn web_rule() -> AclRule {
        AclRule::new(
            AclAction::Permit,
            "172.16.1.0/24".parse().unwrap(),
            "10.0.0.5/32".parse().unwrap(),
            IpProto::TCP,
        )
        .with_src_ports(1024, 65535)
        .with_dst_ports(80, 80)
        .with_tcp_flags(0x12, 0x02)
    }

    #[test]
    fn egress_swaps_endpoints() {
        let rule = web_rule();
        let egress = reverse(&rule);
        assert_eq!(egress.src_prefix, rule.dst_prefix);
        assert_eq!(egress.dst_prefix, rule.src_prefix);
        assert_eq!(
            (egress.srcport_or_icmptype_first, egress.srcport_or_icmptype_last),
            (80, 80)
        );
        assert_eq!(
            (egress.dstport_or_icmpcode_first, egress.dstport_or_icmpcode_last),
            (1024, 65535)
        );
        assert_eq!(egress.proto, rule.proto);
        assert_eq!(egress.action, rule.action);
        assert_eq!(
            (egress.tcp_flags_mask, egress.tcp_flags_value),
            (0x12, 0x02)
        );
    }

    #[test]
    fn ingress_is_unchanged() {
        let rules = vec![web_rule(), reverse(&web_rule())];
        assert_eq!(transform(&rules, Direction::Ingress), rules);
    }

    #[test]
    fn directions_are_symmetric() {
        let rules = vec![web_rule()];
        let ingress = transform(&rules, Direction::Ingress);
        let egress = transform(&rules, Direction::Egress);
        assert_eq!(transform(&egress, Direction::Egress), ingress);
    }

    #[test]
    fn egress_of_a_literal_rule() {
        let rule = AclRule::new(
            AclAction::Permit,
            "10.0.0.0/24".parse().unwrap(),
            "20.0.0.0/24".parse().unwrap(),
            IpProto::TCP,
        )
        .with_src_ports(1000, 1000)
        .with_dst_ports(80, 80);
        let expected = AclRule::new(
            AclAction::Permit,
            "20.0.0.0/24".parse().unwrap(),
            "10.0.0.0/24".parse().unwrap(),
            IpProto::TCP,
        )
        .with_src_ports(80, 80)
        .with_dst_ports(1000, 1000);

        let rules = vec![rule];
        assert_eq!(transform(&rules, Direction::Ingress), rules);
        assert_eq!(transform(&rules, Direction::Egress), vec![expected]);
    }

    #[test]
    fn add_request() {
        let tag = acl_tag(&ConnId::new("conn-1"));
        assert_eq!(tag, "nsm-acl-from-config-conn-1");
        let msg = acl_add_replace(&[web_rule(), web_rule()], Direction::Egress, &tag);
        assert_eq!(msg.acl_index, AclIndex::NEW);
        assert_eq!(msg.count(), 2);
        assert_eq!(msg.tag, tag);
        assert_eq!(msg.rules[0], reverse(&web_rule()));
    }

    #[test]
    fn reverse_is_an_involution() {
        bolero::check!()
            .with_type::<(u32, u8, u32, u8, u8, [u16; 4], u8, u8)>()
            .for_each(|&(src, src_len, dst, dst_len, proto, ports, mask, value)| {
                let prefix = |addr: u32, len: u8| {
                    IpNet::V4(Ipv4Net::new(Ipv4Addr::from(addr), len % 33).unwrap())
                };
                let rule = AclRule::new(
                    AclAction::try_from(proto % 3).unwrap(),
                    prefix(src, src_len),
                    prefix(dst, dst_len),
                    IpProto(proto),
                )
                .with_src_ports(ports[0], ports[1])
                .with_dst_ports(ports[2], ports[3])
                .with_tcp_flags(mask, value);
                assert_eq!(reverse(&reverse(&rule)), rule);
            });
    }
}
