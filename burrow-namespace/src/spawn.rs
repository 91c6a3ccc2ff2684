//! Self re-execution in new namespaces
//!
//! This module uses `unsafe` for clone() which is inherently unsafe
//! but necessary for starting a child directly in new namespaces.

#![allow(unsafe_code)]

use burrow_core::{Error, LaunchStage, ProcessId, Result};
use nix::sched::clone;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::execv;
use std::ffi::CString;
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, error, info, warn};

use crate::config::NamespaceConfig;
use crate::stdio::StdioFiles;

/// Path the kernel resolves to the running executable
pub const SELF_EXE: &str = "/proc/self/exe";

/// Stack for the cloned child until it execs
const STACK_SIZE: usize = 1024 * 1024;

/// Exit status of a child whose exec failed
const EXEC_FAILED: isize = 127;

/// Build the argv of a re-executed stage
///
/// ```text
/// burrow <stage> --config <json> [-- <command...>]
/// ```
#[must_use]
pub fn stage_args(stage: LaunchStage, config_json: &str, command: &[String]) -> Vec<String> {
    let mut args = vec![
        "burrow".to_string(),
        stage.as_arg().to_string(),
        "--config".to_string(),
        config_json.to_string(),
    ];
    if !command.is_empty() {
        args.push("--".to_string());
        args.extend(command.iter().cloned());
    }
    args
}

/// Re-execute the running binary with `args` in the namespaces of `namespaces`
///
/// With `stdio`, the child's descriptors 0, 1 and 2 are replaced by the
/// given files before exec; otherwise they are inherited. The child is not
/// waited for.
///
/// # Errors
/// Returns error if an argument contains a NUL byte or `clone(2)` fails
pub fn spawn_self(
    namespaces: NamespaceConfig,
    args: &[String],
    stdio: Option<&StdioFiles>,
) -> Result<ProcessId> {
    // Everything the child needs is prepared before clone
    let exe = CString::new(SELF_EXE).map_err(|e| Error::Exec {
        message: e.to_string(),
    })?;
    let argv = to_cstrings(args)?;
    let redirect: Option<[RawFd; 3]> = stdio.map(|files| {
        [
            files.stdin.as_raw_fd(),
            files.stdout.as_raw_fd(),
            files.stderr.as_raw_fd(),
        ]
    });

    let mut stack = vec![0u8; STACK_SIZE];
    let flags = namespaces.to_clone_flags();

    debug!(
        namespaces = ?namespaces.enabled_namespaces(),
        stage = args.get(1).map_or("", String::as_str),
        "Cloning stage process"
    );

    let child = Box::new(|| {
        if let Some(fds) = redirect {
            for (target, fd) in fds.into_iter().enumerate() {
                // SAFETY: both descriptors are valid in the child
                if unsafe { libc::dup2(fd, target as RawFd) } < 0 {
                    return EXEC_FAILED;
                }
            }
        }
        let _ = execv(&exe, &argv);
        EXEC_FAILED
    });

    // SAFETY: the child only calls dup2 and execv before replacing its image
    let pid = unsafe { clone(child, &mut stack, flags, Some(Signal::SIGCHLD as i32)) }
        .map_err(|e| {
            error!(error = %e, "clone failed");
            Error::namespace(format!("clone {flags:?}: {e}"))
        })?;

    info!(pid = pid.as_raw(), "Spawned stage process");
    Ok(ProcessId::from_raw(pid.as_raw()))
}

/// Wait for a child to exit and return its exit code
///
/// A child killed by a signal reports `128 + signal`.
///
/// # Errors
/// Returns error if waiting fails
pub fn wait_for_exit(pid: ProcessId) -> Result<i32> {
    let pid = pid.as_nix_pid();

    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, exit_code)) => {
                debug!(pid = pid.as_raw(), exit_code, "Child exited");
                return Ok(exit_code);
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                warn!(pid = pid.as_raw(), ?signal, "Child terminated by signal");
                return Ok(128 + signal as i32);
            }
            Ok(status) => {
                debug!(?status, "Child status");
            }
            Err(nix::errno::Errno::EINTR) => {}
            Err(e) => {
                return Err(Error::namespace(format!("wait for {pid}: {e}")));
            }
        }
    }
}

/// Convert arguments for exec
///
/// # Errors
/// Returns error if an argument contains a NUL byte
pub fn to_cstrings(args: &[String]) -> Result<Vec<CString>> {
    args.iter()
        .map(|arg| {
            CString::new(arg.as_bytes()).map_err(|e| Error::Exec {
                message: format!("invalid argument {arg:?}: {e}"),
            })
        })
        .collect()
}
