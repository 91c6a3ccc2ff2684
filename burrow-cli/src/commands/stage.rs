//! Re-executed launch stages
//!
//! These subcommands are hidden: the orchestrator invokes them on
//! `/proc/self/exe` from inside freshly cloned namespaces.

use anyhow::{Context, Result};
use burrow_core::{ContainerConfig, LaunchStage};
use burrow_namespace::Orchestrator;

fn orchestrator(config: &str) -> Result<Orchestrator> {
    let config = ContainerConfig::from_json(config).context("Invalid stage configuration")?;
    Ok(Orchestrator::new(config)?)
}

pub fn network_namespace_created(config: &str) -> Result<()> {
    orchestrator(config)?
        .dispatch(LaunchStage::NetworkNamespaceCreated, &[])
        .context("Failed to persist network namespace")?;
    Ok(())
}

pub fn container_namespaces_created(config: &str, command: &[String]) -> Result<()> {
    orchestrator(config)?
        .dispatch(LaunchStage::ContainerNamespacesCreated, command)
        .context("Failed to start container command")?;
    Ok(())
}
