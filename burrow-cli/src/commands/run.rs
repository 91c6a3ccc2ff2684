//! Run command implementation

use anyhow::{Context, Result};
use burrow_core::{ContainerConfig, ContainerId, IpNetwork, LaunchStage, NetnsStrategy};
use burrow_namespace::Orchestrator;

use crate::cli::RunArgs;

/// Value of `--id` that asks for a generated ID
const AUTO_ID: &str = "auto";

pub fn execute(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    tracing::info!(container_id = %config.id, "Starting container");

    // Validate we're root
    if !nix::unistd::geteuid().is_root() {
        anyhow::bail!("Must run as root (try: sudo burrow run ...)");
    }

    let orchestrator = Orchestrator::new(config).context("Invalid container configuration")?;
    let pid = orchestrator
        .dispatch(LaunchStage::Initial, &args.command)
        .context("Failed to launch container")?
        .context("Launch returned no container process")?;

    let config = orchestrator.config();
    println!("Container {} started with PID {pid}", config.id);
    println!("stdout: {}", config.stdio_path("stdout").display());

    Ok(())
}

fn build_config(args: &RunArgs) -> Result<ContainerConfig> {
    let id = if args.id == AUTO_ID {
        ContainerId::generate()
    } else {
        ContainerId::new(args.id.as_str()).context("Invalid container ID")?
    };

    let mut config = ContainerConfig::new(id).with_base_dir(&args.base_dir);

    if let Some(hostname) = &args.hostname {
        config = config.with_hostname(hostname.as_str());
    }
    if let Some(ip) = &args.host_ip {
        config = config.with_host_addr(parse_cidr(ip)?);
    }
    if let Some(ip) = &args.container_ip {
        config = config.with_container_addr(parse_cidr(ip)?);
    }
    if args.netns_helper {
        config = config.with_netns_strategy(NetnsStrategy::Helper);
    }

    Ok(config)
}

fn parse_cidr(value: &str) -> Result<IpNetwork> {
    value
        .parse()
        .with_context(|| format!("Invalid address '{value}', expected CIDR like 10.0.0.1/24"))
}
