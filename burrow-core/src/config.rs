//! Container instance configuration
//!
//! Every path, interface name and address a launch touches is derived from a
//! [`ContainerConfig`]. The defaults reproduce the single-instance layout:
//!
//! ```text
//! /root/container/            rootfs + scratch area
//! /root/container/net         persisted network namespace handle
//! /root/container/std{in,out,err}
//! /root/container/proc
//! veth0_container 10.0.0.1/24 <-> veth1_container 10.0.0.2/24
//! ```

use ipnetwork::{IpNetwork, Ipv4Network};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::{ContainerId, Error, Result};

/// Container ID used when none is given
pub const DEFAULT_CONTAINER_ID: &str = "container";

/// Directory holding one sub-directory per container
pub const DEFAULT_BASE_DIR: &str = "/root";

/// Prefix of the host-side veth name
pub const HOST_VETH_PREFIX: &str = "veth0_";

/// Prefix of the container-side veth name
pub const CONTAINER_VETH_PREFIX: &str = "veth1_";

/// Longest interface name the kernel accepts (IFNAMSIZ - 1)
pub const MAX_IFNAME_LEN: usize = 15;

/// Longest hostname the kernel accepts
pub const MAX_HOSTNAME_LEN: usize = 64;

/// Name of the namespace handle file inside the rootfs
pub const NETNS_HANDLE_FILE: &str = "net";

const DEFAULT_PREFIX: u8 = 24;
const DEFAULT_HOST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const DEFAULT_CONTAINER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

/// How the network namespace is created before the container starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetnsStrategy {
    /// Unshare in the orchestrator itself and switch back to the host namespace
    #[default]
    InProcess,

    /// Re-exec a short-lived helper with `CLONE_NEWNET` and wait for it
    Helper,
}

/// Veth pair linking the host and the container network namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VethPair {
    /// Interface that stays in the host namespace
    pub host: String,

    /// Interface migrated into the container namespace
    pub container: String,

    /// Address assigned to the host side
    pub host_addr: IpNetwork,

    /// Address assigned to the container side after the namespace is joined
    pub container_addr: IpNetwork,
}

impl VethPair {
    /// Derive interface names and default addresses from a container ID
    #[must_use]
    pub fn for_container(id: &ContainerId) -> Self {
        Self {
            host: format!("{HOST_VETH_PREFIX}{id}"),
            container: format!("{CONTAINER_VETH_PREFIX}{id}"),
            host_addr: default_network(DEFAULT_HOST_IP),
            container_addr: default_network(DEFAULT_CONTAINER_IP),
        }
    }

    /// Check interface names and addresses
    ///
    /// # Errors
    /// Returns error if a name is empty or too long, both ends share a name,
    /// or the addresses are not two distinct hosts of the same subnet
    pub fn validate(&self) -> Result<()> {
        for name in [&self.host, &self.container] {
            if name.is_empty() || name.len() > MAX_IFNAME_LEN {
                return Err(Error::invalid_config(format!(
                    "Interface name '{name}' must be 1-{MAX_IFNAME_LEN} bytes"
                )));
            }
        }

        if self.host == self.container {
            return Err(Error::invalid_config(
                "Host and container interface names must differ",
            ));
        }

        if self.host_addr.ip() == self.container_addr.ip() {
            return Err(Error::invalid_config(
                "Host and container addresses must differ",
            ));
        }

        if !self.host_addr.contains(self.container_addr.ip()) {
            return Err(Error::invalid_config(format!(
                "Container address {} is outside the host subnet {}",
                self.container_addr, self.host_addr
            )));
        }

        Ok(())
    }
}

/// Configuration of one container instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Container identifier, also the rootfs directory name
    pub id: ContainerId,

    /// Parent directory of the container rootfs
    pub base_dir: PathBuf,

    /// Hostname set inside the UTS namespace
    pub hostname: String,

    /// Veth pair for this container
    pub veth: VethPair,

    /// Network namespace creation strategy
    #[serde(default)]
    pub netns_strategy: NetnsStrategy,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        let id = ContainerId::from_static(DEFAULT_CONTAINER_ID);
        Self::new(id)
    }
}

impl ContainerConfig {
    /// Create a configuration with every value derived from `id`
    #[must_use]
    pub fn new(id: ContainerId) -> Self {
        Self {
            hostname: id.as_str().to_string(),
            veth: VethPair::for_container(&id),
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            netns_strategy: NetnsStrategy::default(),
            id,
        }
    }

    /// Set the parent directory of the container rootfs
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Set the hostname
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the host-side address
    #[must_use]
    pub fn with_host_addr(mut self, addr: IpNetwork) -> Self {
        self.veth.host_addr = addr;
        self
    }

    /// Set the container-side address
    #[must_use]
    pub fn with_container_addr(mut self, addr: IpNetwork) -> Self {
        self.veth.container_addr = addr;
        self
    }

    /// Set the network namespace creation strategy
    #[must_use]
    pub fn with_netns_strategy(mut self, strategy: NetnsStrategy) -> Self {
        self.netns_strategy = strategy;
        self
    }

    /// Container root filesystem directory
    #[must_use]
    pub fn rootfs(&self) -> PathBuf {
        self.base_dir.join(self.id.as_str())
    }

    /// Path of the bind-mounted network namespace handle
    #[must_use]
    pub fn netns_handle(&self) -> PathBuf {
        self.rootfs().join(NETNS_HANDLE_FILE)
    }

    /// Path of the file backing the given stdio stream (`stdin`, `stdout`, `stderr`)
    #[must_use]
    pub fn stdio_path(&self, stream: &str) -> PathBuf {
        self.rootfs().join(stream)
    }

    /// Validate the whole configuration
    ///
    /// # Errors
    /// Returns error if the base directory is relative, the hostname is
    /// empty or too long, or the veth pair is invalid
    pub fn validate(&self) -> Result<()> {
        if !self.base_dir.is_absolute() {
            return Err(Error::invalid_config(format!(
                "Base directory must be absolute: {}",
                self.base_dir.display()
            )));
        }

        if self.hostname.is_empty() || self.hostname.len() > MAX_HOSTNAME_LEN {
            return Err(Error::invalid_config(format!(
                "Hostname must be 1-{MAX_HOSTNAME_LEN} bytes"
            )));
        }

        self.veth.validate()
    }

    /// Serialize for the re-exec argv handoff
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate a configuration received through argv
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or the configuration is invalid
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

fn default_network(ip: Ipv4Addr) -> IpNetwork {
    IpNetwork::V4(Ipv4Network::new(ip, DEFAULT_PREFIX).unwrap_or_else(|_| Ipv4Network::from(ip)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = ContainerConfig::default();

        assert_eq!(config.rootfs(), PathBuf::from("/root/container"));
        assert_eq!(config.netns_handle(), PathBuf::from("/root/container/net"));
        assert_eq!(
            config.stdio_path("stdout"),
            PathBuf::from("/root/container/stdout")
        );
        assert_eq!(config.hostname, "container");
        assert_eq!(config.veth.host, "veth0_container");
        assert_eq!(config.veth.container, "veth1_container");
        assert_eq!(config.veth.host_addr.to_string(), "10.0.0.1/24");
        assert_eq!(config.veth.container_addr.to_string(), "10.0.0.2/24");
        assert_eq!(config.netns_strategy, NetnsStrategy::InProcess);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let id = ContainerId::new("web").unwrap();
        let config = ContainerConfig::new(id)
            .with_base_dir("/var/lib/burrow")
            .with_hostname("web-1")
            .with_host_addr("10.1.0.1/24".parse().unwrap())
            .with_container_addr("10.1.0.2/24".parse().unwrap())
            .with_netns_strategy(NetnsStrategy::Helper);

        assert_eq!(config.rootfs(), PathBuf::from("/var/lib/burrow/web"));
        assert_eq!(config.hostname, "web-1");
        assert_eq!(config.veth.host, "veth0_web");
        assert_eq!(config.netns_strategy, NetnsStrategy::Helper);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interface_name_too_long() {
        let id = ContainerId::new("a-very-long-container").unwrap();
        let config = ContainerConfig::new(id);

        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_generated_id_fits_interface_names() {
        let config = ContainerConfig::new(ContainerId::generate());
        assert!(config.veth.host.len() <= MAX_IFNAME_LEN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_address_validation() {
        let config = ContainerConfig::default().with_container_addr("10.9.0.2/24".parse().unwrap());
        assert!(config.validate().is_err());

        let config = ContainerConfig::default().with_container_addr("10.0.0.1/24".parse().unwrap());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_base_dir_rejected() {
        let config = ContainerConfig::default().with_base_dir("relative/dir");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_handoff() {
        let config = ContainerConfig::default().with_netns_strategy(NetnsStrategy::Helper);
        let json = config.to_json().unwrap();

        assert!(json.contains("\"helper\""));
        assert!(json.contains("10.0.0.2/24"));
        assert_eq!(ContainerConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_json_rejects_invalid_config() {
        let mut config = ContainerConfig::default();
        config.hostname = String::new();
        let json = serde_json::to_string(&config).unwrap();

        assert!(ContainerConfig::from_json(&json).is_err());
        assert!(ContainerConfig::from_json("{not json").is_err());
    }
}
