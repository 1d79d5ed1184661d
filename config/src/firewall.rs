// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The configuration of a firewall process

use derive_builder::Builder;
use dplane::api::{AclRule, Ipv4Range, NatPluginParams};
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::rules::DEFAULT_ACL_CONFIG_PATH;

/// Everything a firewall endpoint needs once started. N.B. we derive a builder type
/// `FirewallConfigBuilder` and provide defaults for each field.
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct FirewallConfig {
    /// Name the endpoint registers under
    #[builder(setter(into), default = "firewall-server".to_string())]
    pub name: String,

    /// Name of the network service connections are requested for
    #[builder(setter(into), default = "firewall".to_string())]
    pub service_name: String,

    #[builder(setter(into), default = DEFAULT_ACL_CONFIG_PATH.into())]
    pub acl_config_path: PathBuf,

    /// Rules applied by the ACL element to every connection
    #[builder(setter(into), default = Arc::from(Vec::new()))]
    pub acl_rules: Arc<[AclRule]>,

    /// Public addresses available to the NAT
    #[builder(default)]
    pub nat_pool: Vec<Ipv4Range>,

    #[builder(default)]
    pub nat_params: NatPluginParams,

    /// Budget of a single request or close
    #[builder(default = Duration::from_secs(15))]
    pub request_timeout: Duration,
}

impl FirewallConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.request_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err("request timeout must not be zero".to_string());
        }
        if let Some(pool) = &self.nat_pool {
            for (n, range) in pool.iter().enumerate() {
                if let Some(other) = pool[n + 1..].iter().find(|other| overlap(range, other)) {
                    return Err(format!("NAT address ranges {range} and {other} overlap"));
                }
            }
        }
        Ok(())
    }
}

fn overlap(a: &Ipv4Range, b: &Ipv4Range) -> bool {
    a.first() <= b.last() && b.first() <= a.last()
}

impl Display for FirewallConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Firewall config")?;
        writeln!(f, "  name       : {}", self.name)?;
        writeln!(f, "  service    : {}", self.service_name)?;
        writeln!(f, "  ACL config : {}", self.acl_config_path.display())?;
        writeln!(f, "  ACL rules  : {}", self.acl_rules.len())?;
        let pool: Vec<_> = self.nat_pool.iter().map(ToString::to_string).collect();
        writeln!(f, "  NAT pool   : [{}]", pool.join(", "))?;
        writeln!(
            f,
            "  NAT VRFs   : inside {} outside {}",
            self.nat_params.inside_vrf, self.nat_params.outside_vrf
        )?;
        writeln!(f, "  sessions   : {}", self.nat_params.sessions)?;
        write!(f, "  timeout    : {:?}", self.request_timeout)
    }
}
