//! Veth pair management

use burrow_core::{Error, Result, VethPair};
use std::fs::File;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;
use tracing::{debug, info};

use crate::backend::LinkBackend;

/// Loopback interface brought up inside every container namespace
pub const LOOPBACK: &str = "lo";

/// Outcome of [`VethManager::create_pair`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairStatus {
    /// The pair was created and the host side configured
    Created,

    /// The host side already existed; nothing was done
    AlreadyExists,
}

/// Creates, configures and migrates veth pairs through a [`LinkBackend`]
///
/// The manager acts on whatever network namespace its backend is bound to.
///
/// # Example
/// ```
/// use burrow_core::ContainerConfig;
/// use burrow_net::{MockBackend, PairStatus, VethManager};
///
/// let config = ContainerConfig::default();
/// let mut veth = VethManager::new(MockBackend::new());
///
/// assert_eq!(veth.create_pair(&config.veth).unwrap(), PairStatus::Created);
/// assert_eq!(veth.create_pair(&config.veth).unwrap(), PairStatus::AlreadyExists);
/// ```
#[derive(Debug)]
pub struct VethManager<B: LinkBackend> {
    backend: B,
}

impl<B: LinkBackend> VethManager<B> {
    /// Create a manager over `backend`
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Create the pair and configure its host side
    ///
    /// Returns [`PairStatus::AlreadyExists`] without touching anything if the
    /// host-side link is already present. A failure part way through is
    /// returned as is; the half-configured pair is left behind and a retry
    /// short-circuits on it.
    ///
    /// # Errors
    /// Returns error if adding the link, bringing it up, or assigning the
    /// host address fails
    pub fn create_pair(&mut self, pair: &VethPair) -> Result<PairStatus> {
        if self.backend.link_exists(&pair.host)? {
            debug!(host = %pair.host, "Veth pair already exists");
            return Ok(PairStatus::AlreadyExists);
        }

        self.backend.create_veth(&pair.host, &pair.container)?;
        self.backend.set_link_up(&pair.host)?;
        self.backend.add_address(&pair.host, pair.host_addr)?;

        info!(
            host = %pair.host,
            container = %pair.container,
            addr = %pair.host_addr,
            "Created veth pair"
        );
        Ok(PairStatus::Created)
    }

    /// Move the container-side link into the namespace behind `handle`
    ///
    /// # Errors
    /// Returns error if the handle cannot be opened or the link cannot be
    /// resolved or moved
    pub fn migrate_peer(&mut self, name: &str, handle: &Path) -> Result<()> {
        let netns = File::open(handle).map_err(|e| {
            Error::link(format!(
                "open namespace handle {}: {e}",
                handle.display()
            ))
        })?;
        self.migrate_peer_fd(name, netns.as_fd())?;

        info!(link = name, netns = %handle.display(), "Migrated veth peer");
        Ok(())
    }

    /// Move a link into the namespace referenced by an open descriptor
    ///
    /// # Errors
    /// Returns error if the link cannot be resolved or moved
    pub fn migrate_peer_fd(&mut self, name: &str, netns: BorrowedFd<'_>) -> Result<()> {
        self.backend.move_to_netns(name, netns)
    }

    /// Configure the container side from inside the joined namespace
    ///
    /// Brings up loopback and the migrated link, then assigns the container
    /// address. Fails with a link error if the migrated link is not visible,
    /// which is the case until the namespace has been joined.
    ///
    /// # Errors
    /// Returns error if any of the three steps fails
    pub fn configure_container_side(&mut self, pair: &VethPair) -> Result<()> {
        if !self.backend.link_exists(&pair.container)? {
            return Err(Error::link(format!(
                "interface not found: {} is not visible in this network namespace",
                pair.container
            )));
        }

        self.backend.set_link_up(LOOPBACK)?;
        self.backend.set_link_up(&pair.container)?;
        self.backend.add_address(&pair.container, pair.container_addr)?;

        info!(
            link = %pair.container,
            addr = %pair.container_addr,
            "Configured container side"
        );
        Ok(())
    }
}
