//! Container launch orchestration
//!
//! A launch runs in up to three processes, one per [`LaunchStage`]:
//!
//! 1. `run` (this process): creates and persists the network namespace,
//!    wires up the veth pair, then clones the container process.
//! 2. `networkNamespaceCreated` (only with [`NetnsStrategy::Helper`]): a
//!    short-lived child cloned into a fresh network namespace that persists
//!    it and exits.
//! 3. `containerNamespacesCreated`: the container process. It joins the
//!    persisted network namespace, mounts proc, chroots, sets the hostname
//!    and execs the target command.
//!
//! Stages hand over state through the serialized [`ContainerConfig`] in
//! argv and the namespace handle file only.

use burrow_core::{ContainerConfig, Error, LaunchStage, NetnsStrategy, ProcessId, Result};
use burrow_net::{NetlinkBackend, VethManager};
use nix::unistd::execve;
use std::convert::Infallible;
use std::ffi::CString;
use std::fs;
use tracing::{debug, info};

use crate::config::NamespaceConfig;
use crate::netns::{self, PersistedNetns};
use crate::{mount, spawn, stdio, uts};

/// Drives a container launch through its stages
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: ContainerConfig,
}

impl Orchestrator {
    /// Create an orchestrator for `config`
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn new(config: ContainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Run the part of the launch belonging to `stage`
    ///
    /// Returns the container PID for [`LaunchStage::Initial`]. The container
    /// stage does not return on success.
    ///
    /// # Errors
    /// Returns the error of the stage
    pub fn dispatch(&self, stage: LaunchStage, command: &[String]) -> Result<Option<ProcessId>> {
        debug!(%stage, id = %self.config.id, "Dispatching launch stage");

        match stage {
            LaunchStage::Initial => self.launch(command).map(Some),
            LaunchStage::NetworkNamespaceCreated => {
                self.finalize_network_namespace().map(|()| None)
            }
            LaunchStage::ContainerNamespacesCreated => match self.finalize_container(command)? {},
        }
    }

    /// Launch `command` in a new container and return its PID
    ///
    /// Does not wait for the container. Any failing step aborts the launch
    /// and leaves whatever it already set up in place.
    ///
    /// # Errors
    /// Returns error if `command` is empty or any launch step fails
    pub fn launch(&self, command: &[String]) -> Result<ProcessId> {
        if command.is_empty() {
            return Err(Error::invalid_config("Command cannot be empty"));
        }

        let rootfs = self.config.rootfs();
        fs::create_dir_all(&rootfs)?;
        info!(id = %self.config.id, rootfs = %rootfs.display(), "Launching container");

        self.create_network_namespace()?;

        let handle = self.config.netns_handle();
        let mut veth = VethManager::new(NetlinkBackend::new()?);
        veth.create_pair(&self.config.veth)?;
        veth.migrate_peer(&self.config.veth.container, &handle)?;

        let files = stdio::provision(&rootfs)?;
        let args = spawn::stage_args(
            LaunchStage::ContainerNamespacesCreated,
            &self.config.to_json()?,
            command,
        );
        let pid = spawn::spawn_self(NamespaceConfig::container(), &args, Some(&files))?;

        info!(id = %self.config.id, pid = pid.as_raw(), "Container started");
        Ok(pid)
    }

    /// Create the container's network namespace and persist its handle
    fn create_network_namespace(&self) -> Result<()> {
        let handle = self.config.netns_handle();

        match self.config.netns_strategy {
            NetnsStrategy::InProcess => {
                netns::in_new_netns(|| PersistedNetns::persist(&handle).map(PersistedNetns::keep))?;
            }
            NetnsStrategy::Helper => {
                let args =
                    spawn::stage_args(LaunchStage::NetworkNamespaceCreated, &self.config.to_json()?, &[]);
                let pid = spawn::spawn_self(NamespaceConfig::network_helper(), &args, None)?;

                let code = spawn::wait_for_exit(pid)?;
                if code != 0 {
                    return Err(Error::namespace(format!(
                        "network namespace helper {pid} exited with status {code}"
                    )));
                }
            }
        }

        debug!(handle = %handle.display(), strategy = ?self.config.netns_strategy, "Network namespace ready");
        Ok(())
    }

    /// Persist the network namespace this process runs in
    ///
    /// Run by the helper stage right after it was cloned into a new network
    /// namespace.
    ///
    /// # Errors
    /// Returns error if the handle cannot be persisted
    pub fn finalize_network_namespace(&self) -> Result<()> {
        let path = PersistedNetns::persist(self.config.netns_handle())?.keep();
        info!(handle = %path.display(), "Helper persisted network namespace");
        Ok(())
    }

    /// Finish setting up the container process and exec `command`
    ///
    /// Joins the network namespace before any mount changes, so the handle
    /// unmount still propagates to the host.
    ///
    /// # Errors
    /// Returns error if any setup step or the exec fails
    pub fn finalize_container(&self, command: &[String]) -> Result<Infallible> {
        let (program, _) = command
            .split_first()
            .ok_or_else(|| Error::invalid_config("Command cannot be empty"))?;
        let rootfs = self.config.rootfs();

        netns::join(&self.config.netns_handle(), &self.config.veth)?;
        mount::privatize_and_mount_proc(&rootfs)?;
        mount::chroot_into(&rootfs)?;
        uts::set_hostname(&self.config.hostname)?;

        let path = CString::new(program.as_bytes()).map_err(|e| Error::Exec {
            message: format!("invalid program {program:?}: {e}"),
        })?;
        let argv = spawn::to_cstrings(command)?;
        let env: [CString; 0] = [];

        info!(program = %program, "Executing container command");
        execve(&path, &argv, &env).map_err(|e| Error::Exec {
            message: format!("execve {program}: {e}"),
        })
    }
}
