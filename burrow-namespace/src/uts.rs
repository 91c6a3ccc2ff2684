//! UTS namespace setup

use burrow_core::Result;
use nix::unistd::sethostname;

/// Set the hostname of the current UTS namespace
///
/// # Errors
/// Returns the `sethostname(2)` error unchanged
pub fn set_hostname(name: &str) -> Result<()> {
    tracing::debug!(hostname = %name, "Setting hostname");

    sethostname(name).map_err(|e| {
        tracing::error!(hostname = %name, error = %e, "Failed to set hostname");
        e
    })?;

    Ok(())
}
