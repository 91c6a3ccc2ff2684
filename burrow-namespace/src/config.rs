//! Namespace configuration

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};

/// Set of namespaces a re-executed stage is cloned into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Enable PID namespace
    pub pid: bool,

    /// Enable network namespace
    pub network: bool,

    /// Enable mount namespace
    pub mount: bool,

    /// Enable UTS namespace (hostname)
    pub uts: bool,
}

impl NamespaceConfig {
    /// Namespaces of the `networkNamespaceCreated` helper: network only
    #[must_use]
    pub const fn network_helper() -> Self {
        Self {
            pid: false,
            network: true,
            mount: false,
            uts: false,
        }
    }

    /// Namespaces of the container process: PID, mount and UTS
    ///
    /// The network namespace is joined later from the persisted handle.
    #[must_use]
    pub const fn container() -> Self {
        Self {
            pid: true,
            network: false,
            mount: true,
            uts: true,
        }
    }

    /// Convert to flags for clone(2)
    #[must_use]
    pub fn to_clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();

        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }

        flags
    }

    /// Get list of enabled namespace names
    #[must_use]
    pub fn enabled_namespaces(&self) -> Vec<&'static str> {
        let mut namespaces = Vec::new();

        if self.pid {
            namespaces.push("pid");
        }
        if self.network {
            namespaces.push("net");
        }
        if self.mount {
            namespaces.push("mnt");
        }
        if self.uts {
            namespaces.push("uts");
        }

        namespaces
    }
}
