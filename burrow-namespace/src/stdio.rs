//! Stdio files for the container process

use burrow_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::debug;

/// Names of the three stream files, in descriptor order
pub const STREAMS: [&str; 3] = ["stdin", "stdout", "stderr"];

/// Open files wired into the container's descriptors 0, 1 and 2
#[derive(Debug)]
pub struct StdioFiles {
    /// Backs descriptor 0
    pub stdin: File,
    /// Backs descriptor 1
    pub stdout: File,
    /// Backs descriptor 2
    pub stderr: File,
}

/// Create (or truncate) `stdin`, `stdout` and `stderr` under `dir`
///
/// # Errors
/// Returns the OS error of the first file that cannot be opened
pub fn provision(dir: &Path) -> Result<StdioFiles> {
    let open = |name: &str| -> Result<File> {
        let path = dir.join(name);
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("{}: {e}", path.display()),
                ))
            })
    };

    let files = StdioFiles {
        stdin: open(STREAMS[0])?,
        stdout: open(STREAMS[1])?,
        stderr: open(STREAMS[2])?,
    };

    debug!(dir = %dir.display(), "Provisioned stdio files");
    Ok(files)
}
