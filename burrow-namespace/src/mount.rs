//! Mount namespace setup and chroot

use burrow_core::{Error, Result};
use nix::mount::{mount, MsFlags};
use nix::unistd::{chdir, chroot};
use std::fs::DirBuilder;
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use tracing::debug;

/// Make every mount private, then mount a fresh proc at `<dir>/proc`
///
/// Must be the first mount operation in a new mount namespace. Nothing is
/// ever unmounted: the mounts go away with the namespace.
///
/// # Errors
/// Returns error if the remount, the directory creation, or the proc mount fails
pub fn privatize_and_mount_proc(dir: &Path) -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| Error::mount(format!("make / private: {e}")))?;
    debug!("Root mount is now private");

    let proc_dir = dir.join("proc");
    match DirBuilder::new().mode(0o555).create(&proc_dir) {
        Ok(()) => debug!(path = %proc_dir.display(), "Created proc mount point"),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }

    // MS_NOSUID | MS_NODEV | MS_NOEXEC for security
    let flags = MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC;
    mount(Some("proc"), &proc_dir, Some("proc"), flags, None::<&str>)
        .map_err(|e| Error::mount(format!("mount proc on {}: {e}", proc_dir.display())))?;
    debug!(path = %proc_dir.display(), "Mounted proc");

    Ok(())
}

/// Change the root directory to `dir` and move the working directory into it
///
/// # Errors
/// Returns error if `chroot(2)` or `chdir(2)` fails
pub fn chroot_into(dir: &Path) -> Result<()> {
    chroot(dir).map_err(|e| Error::mount(format!("chroot {}: {e}", dir.display())))?;
    // chroot leaves the cwd pointing outside the new root
    chdir("/").map_err(|e| Error::mount(format!("chdir /: {e}")))?;

    debug!(root = %dir.display(), "Changed root");
    Ok(())
}
