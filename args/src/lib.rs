// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line of the firewall. Every option can also be set through an `NSM_*` environment
//! variable.

pub use clap::Parser;
use dplane::api::{Ipv4Range, NatPluginParams};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

fn parse_seconds(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let seconds = input.strip_suffix('s').unwrap_or(input);
    let seconds = u64::from_str(seconds).map_err(|e| format!("Bad duration '{input}': {e}"))?;
    if seconds == 0 {
        return Err("Duration must be at least one second".to_string());
    }
    Ok(Duration::from_secs(seconds))
}

#[derive(Parser, Debug)]
#[command(name = "Firewall network service endpoint")]
#[command(version = "0.1")]
#[command(about = "Applies ACL rules and NAT to the connections of a network service", long_about = None)]
pub struct CmdArgs {
    #[arg(
        long,
        env = "NSM_NAME",
        default_value = "firewall-server",
        help = "Name of the endpoint"
    )]
    name: String,

    #[arg(
        long,
        env = "NSM_SERVICE_NAME",
        default_value = "firewall",
        help = "Name of the network service provided"
    )]
    service_name: String,

    #[arg(
        long,
        env = "NSM_ACL_CONFIG_PATH",
        value_name = "PATH",
        default_value = "/etc/firewall/config.yaml",
        help = "YAML file holding the ACL rules"
    )]
    acl_config_path: PathBuf,

    #[arg(
        long,
        env = "NSM_NAT_POOL",
        value_name = "RANGE",
        value_parser = Ipv4Range::from_str,
        value_delimiter = ',',
        help = "Public IPv4 addresses of the NAT, as single addresses, ranges or prefixes.
E.g. --nat-pool 203.0.113.1-203.0.113.10,198.51.100.0/28"
    )]
    nat_pool: Vec<Ipv4Range>,

    #[arg(long, env = "NSM_NAT_INSIDE_VRF", default_value_t = 0, help = "VRF of the inside interfaces")]
    nat_inside_vrf: u32,

    #[arg(long, env = "NSM_NAT_OUTSIDE_VRF", default_value_t = 0, help = "VRF of the outside interfaces and of the pool")]
    nat_outside_vrf: u32,

    #[arg(
        long,
        env = "NSM_NAT_SESSIONS",
        default_value_t = 0,
        help = "Maximum number of NAT sessions, 0 for the dataplane default"
    )]
    nat_sessions: u32,

    #[arg(
        long,
        env = "NSM_REQUEST_TIMEOUT",
        value_name = "SECONDS",
        value_parser = parse_seconds,
        default_value = "15",
        help = "Time allowed to a request or a close"
    )]
    request_timeout: Duration,

    #[arg(
        long,
        env = "NSM_LOG_LEVEL",
        value_name = "LEVEL",
        default_value = "info",
        help = "Default log level, one of [off,error,warn,info,debug,trace]"
    )]
    log_level: String,

    #[arg(
        long,
        default_value_t = false,
        help = "Show configurable tracing targets and exit"
    )]
    show_tracing_targets: bool,

    #[arg(
        long,
        env = "NSM_TRACING",
        value_name = "tracing configuration",
        help = "Tracing config string as comma-separated sequence of tag=level, with level one in [off,error,warn,info,debug,trace].
Passing default=level sets the default log-level.
Passing all=level allows setting the log-level of all targets to level.
E.g. default=error,all=info,nat=debug will set the default target to error, and all the registered targets to info, but enable debug for nat"
    )]
    tracing: Option<String>,
}

impl CmdArgs {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
    pub fn acl_config_path(&self) -> PathBuf {
        self.acl_config_path.clone()
    }
    pub fn nat_pool(&self) -> Vec<Ipv4Range> {
        self.nat_pool.clone()
    }
    pub fn nat_params(&self) -> NatPluginParams {
        NatPluginParams {
            inside_vrf: self.nat_inside_vrf,
            outside_vrf: self.nat_outside_vrf,
            sessions: self.nat_sessions,
        }
    }
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
    pub fn show_tracing_targets(&self) -> bool {
        self.show_tracing_targets
    }
    pub fn tracing(&self) -> Option<&String> {
        self.tracing.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{CmdArgs, Parser, parse_seconds};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let args = CmdArgs::try_parse_from(["firewall"]).unwrap();
        assert_eq!(args.name(), "firewall-server");
        assert_eq!(args.acl_config_path(), Path::new("/etc/firewall/config.yaml"));
        assert!(args.nat_pool().is_empty());
        assert_eq!(args.request_timeout(), Duration::from_secs(15));
        assert_eq!(args.log_level(), "info");
        assert!(args.tracing().is_none());
    }

    #[test]
    fn test_nat_options() {
        let args = CmdArgs::try_parse_from([
            "firewall",
            "--nat-pool",
            "203.0.113.1-203.0.113.10,198.51.100.0/30",
            "--nat-pool",
            "192.0.2.9",
            "--nat-outside-vrf",
            "2",
            "--nat-sessions",
            "4096",
        ])
        .unwrap();
        let pool: Vec<_> = args.nat_pool().iter().map(ToString::to_string).collect();
        assert_eq!(
            pool,
            vec!["203.0.113.1-203.0.113.10", "198.51.100.0-198.51.100.3", "192.0.2.9"]
        );
        let params = args.nat_params();
        assert_eq!(params.inside_vrf, 0);
        assert_eq!(params.outside_vrf, 2);
        assert_eq!(params.sessions, 4096);
    }

    #[test]
    fn test_bad_values() {
        assert!(CmdArgs::try_parse_from(["firewall", "--nat-pool", "203.0.113.9-203.0.113.1"]).is_err());
        assert!(CmdArgs::try_parse_from(["firewall", "--request-timeout", "soon"]).is_err());
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("30"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_seconds("5s"), Ok(Duration::from_secs(5)));
        assert!(parse_seconds("0").is_err());
    }
}
