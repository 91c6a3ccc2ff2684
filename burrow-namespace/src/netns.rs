//! Persisted network namespaces
//!
//! A network namespace outlives the last process in it as long as something
//! references it. [`PersistedNetns::persist`] bind-mounts the calling
//! thread's namespace onto a file; any process can later enter the namespace
//! through that file with [`PersistedNetns::enter`], which also removes the
//! handle.
//!
//! The handle is a single-use resource: it is created once and consumed
//! once. A [`PersistedNetns`] that goes out of scope without being entered or
//! kept unmounts and removes its handle.

use burrow_core::{Error, Result, VethPair};
use burrow_net::{NetlinkBackend, VethManager};
use nix::errno::Errno;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{setns, unshare, CloneFlags};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::os::fd::AsFd;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Network namespace of the calling thread
///
/// `setns` and `unshare` act on a single thread, so the per-thread link is
/// used rather than `/proc/self`.
pub const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// Handle file aliasing a live network namespace
#[derive(Debug)]
pub struct PersistedNetns {
    path: PathBuf,
    armed: bool,
}

impl PersistedNetns {
    /// Persist the calling thread's network namespace at `path`
    ///
    /// The bind mount is made shared in a second `mount(2)` call; the kernel
    /// ignores propagation flags combined with `MS_BIND`. Shared propagation
    /// lets an unmount made from a child mount namespace reach this one.
    ///
    /// # Errors
    /// Returns error if `path` already exists, cannot be created, or either
    /// mount call fails. A partially created handle is cleaned up.
    pub fn persist(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::namespace(format!(
                    "namespace handle {} already exists; a previous launch was never joined",
                    path.display()
                )),
                _ => Error::namespace(format!("create {}: {e}", path.display())),
            })?;

        // From here on, dropping the guard undoes whatever was done
        let handle = Self { path, armed: true };

        mount(
            Some(THREAD_NETNS),
            &handle.path,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(|e| Error::namespace(format!("bind {THREAD_NETNS}: {e}")))?;

        mount(
            None::<&str>,
            &handle.path,
            None::<&str>,
            MsFlags::MS_SHARED,
            None::<&str>,
        )
        .map_err(|e| Error::namespace(format!("make {} shared: {e}", handle.path.display())))?;

        info!(path = %handle.path.display(), "Persisted network namespace");
        Ok(handle)
    }

    /// Take ownership of a handle persisted by another process
    ///
    /// # Errors
    /// Returns error if nothing exists at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(Error::namespace(format!(
                "namespace handle {} not found",
                path.display()
            )));
        }
        Ok(Self { path, armed: true })
    }

    /// Path of the handle file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the handle in place for another process and return its path
    #[must_use]
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Switch the calling thread into the namespace and consume the handle
    ///
    /// On success the handle is unmounted and removed. On failure it is
    /// removed as well, and the open or `setns` error is returned; cleanup
    /// errors are only logged.
    ///
    /// # Errors
    /// Returns error if the handle cannot be opened, `setns(2)` fails, or the
    /// handle file cannot be removed afterwards
    pub fn enter(mut self) -> Result<()> {
        let file = File::open(&self.path)
            .map_err(|e| Error::namespace(format!("open {}: {e}", self.path.display())))?;

        let entered = setns(file.as_fd(), CloneFlags::CLONE_NEWNET);
        drop(file);
        entered.map_err(|e| {
            Error::namespace(format!("setns {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "Joined network namespace");
        self.release()
    }

    /// Detach the mount and delete the file
    fn release(&mut self) -> Result<()> {
        self.armed = false;

        if let Err(e) = umount2(&self.path, MntFlags::MNT_DETACH) {
            warn!(path = %self.path.display(), error = %e, "Failed to unmount namespace handle");
        }

        fs::remove_file(&self.path)
            .map_err(|e| Error::namespace(format!("remove {}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), "Removed namespace handle");
        Ok(())
    }
}

impl Drop for PersistedNetns {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.release() {
                warn!(error = %e, "Failed to clean up namespace handle");
            }
        }
    }
}

/// Enter the namespace behind `handle`, then configure the container veth
///
/// The netlink socket is opened after the switch so that it talks to the
/// joined namespace.
///
/// # Errors
/// Returns error if the namespace cannot be entered or the interfaces cannot
/// be configured
pub fn join(handle: &Path, pair: &VethPair) -> Result<()> {
    PersistedNetns::open(handle)?.enter()?;

    let mut veth = VethManager::new(NetlinkBackend::new()?);
    veth.configure_container_side(pair)
}

/// Runs `f` in a fresh network namespace on the current thread
///
/// The thread is switched back to its original namespace afterwards, also
/// when `f` fails.
///
/// # Errors
/// Returns error if the namespace cannot be created or left, or `f` fails
pub fn in_new_netns<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    let host = File::open(THREAD_NETNS)
        .map_err(|e| Error::namespace(format!("open {THREAD_NETNS}: {e}")))?;

    unshare(CloneFlags::CLONE_NEWNET).map_err(|e| match e {
        Errno::EPERM => Error::PermissionDenied {
            operation: "unshare network namespace".to_string(),
        },
        _ => Error::namespace(format!("unshare network namespace: {e}")),
    })?;
    let guard = RestoreNetns { host: Some(host) };
    debug!("Entered new network namespace");

    let value = f()?;
    guard.restore()?;
    Ok(value)
}

/// Switches the thread back to a saved network namespace when dropped
struct RestoreNetns {
    host: Option<File>,
}

impl RestoreNetns {
    fn restore(mut self) -> Result<()> {
        match self.host.take() {
            Some(host) => {
                setns(host.as_fd(), CloneFlags::CLONE_NEWNET)
                    .map_err(|e| Error::namespace(format!("return to host network namespace: {e}")))?;
                debug!("Returned to host network namespace");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for RestoreNetns {
    fn drop(&mut self) {
        if let Some(host) = self.host.take() {
            if let Err(e) = setns(host.as_fd(), CloneFlags::CLONE_NEWNET) {
                warn!(error = %e, "Failed to return to host network namespace");
            }
        }
    }
}

/// Whether `path` is the root of a mount
///
/// Compares the device of `path` with the device of its parent, so a bind
/// mount of a namespace file reports `true` and a plain file `false`.
///
/// # Errors
/// Returns error if either path cannot be inspected
pub fn is_mount_point(path: &Path) -> Result<bool> {
    let parent = path.parent().unwrap_or_else(|| Path::new("/"));
    let own = fs::symlink_metadata(path)?;
    let above = fs::metadata(parent)?;
    Ok(own.dev() != above.dev())
}
