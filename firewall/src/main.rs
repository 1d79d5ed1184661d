// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]
#![allow(rustdoc::missing_crate_level_docs)]

use args::{CmdArgs, Parser};
use config::{FirewallConfigBuilder, load_acl_rules};
use dplane::sim::{SimDataplane, SimInterface};
use firewall::{Endpoint, Interfaces};
use std::str::FromStr;
use std::sync::Arc;
use tracectl::{LevelFilter, TracingControl, get_trace_ctl};
use tracing::{error, info};

fn init_logging(args: &CmdArgs) {
    TracingControl::init();
    let tctl = get_trace_ctl();
    match LevelFilter::from_str(args.log_level()) {
        Ok(level) => tctl.set_default_level(level),
        Err(_) => error!("Invalid log level '{}', keeping default", args.log_level()),
    }
    if let Some(tracing) = args.tracing()
        && let Err(e) = tctl.setup_from_string(tracing)
    {
        error!("Invalid tracing configuration: {e}");
        panic!("Invalid tracing configuration: {e}");
    }
}

fn main() {
    /* parse cmd line args */
    let args = CmdArgs::parse();
    init_logging(&args);
    if args.show_tracing_targets() {
        get_trace_ctl().dump();
        std::process::exit(0);
    }
    info!("Starting firewall endpoint {}...", args.name());

    let (stop_tx, stop_rx) = std::sync::mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        error!("Failed to set signal handler: {e}");
        panic!("Failed to set signal handler: {e}");
    }

    /* endpoint configuration */
    let config = match FirewallConfigBuilder::default()
        .name(args.name())
        .service_name(args.service_name())
        .acl_config_path(args.acl_config_path())
        .acl_rules(load_acl_rules(&args.acl_config_path()))
        .nat_pool(args.nat_pool())
        .nat_params(args.nat_params())
        .request_timeout(args.request_timeout())
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            error!("Bad firewall configuration: {e}");
            panic!("Bad firewall configuration: {e}");
        }
    };
    info!("{config}");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("firewall")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {e}");
            panic!("Failed to start async runtime: {e}");
        }
    };

    /* in-memory dataplane: interfaces are created on request */
    let dataplane = Arc::new(SimDataplane::new());
    let interfaces = Interfaces::shared(Arc::new(SimInterface::new(dataplane.clone())));
    let endpoint = match Endpoint::new(config, dataplane, interfaces) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("Failed to assemble the endpoint: {e}");
            panic!("Failed to assemble the endpoint: {e}");
        }
    };

    /* global NAT setup: the endpoint can't serve without it */
    if let Err(e) = runtime.block_on(endpoint.start()) {
        error!("NAT setup failed: {e}");
        panic!("NAT setup failed. Aborting...");
    }

    if stop_rx.recv().is_err() {
        error!("Signal handler went away");
    }
    info!("Shutting down firewall endpoint");
    runtime.block_on(endpoint.shutdown());
    std::process::exit(0);
}
