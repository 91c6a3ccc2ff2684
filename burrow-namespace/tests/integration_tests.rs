#![allow(unsafe_code)]

use burrow_core::*;
use burrow_namespace::netns::{self, in_new_netns};
use burrow_namespace::spawn::wait_for_exit;
use burrow_namespace::*;
use burrow_net::{LinkBackend, NetlinkBackend};
use nix::sched::{clone, CloneFlags};
use nix::sys::signal::Signal;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Check if running as root
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Run `f` in a cloned child with `flags` and return its exit code
fn run_in_child(flags: CloneFlags, f: impl FnMut() -> isize) -> i32 {
    let mut stack = vec![0u8; 1024 * 1024];
    let pid = unsafe { clone(Box::new(f), &mut stack, flags, Some(Signal::SIGCHLD as i32)) }
        .unwrap();
    wait_for_exit(ProcessId::from_raw(pid.as_raw())).unwrap()
}

#[test]
fn test_namespace_config_for_stages() {
    assert_eq!(
        NamespaceConfig::network_helper().enabled_namespaces(),
        vec!["net"]
    );
    assert_eq!(
        NamespaceConfig::container().enabled_namespaces(),
        vec!["pid", "mnt", "uts"]
    );
}

#[test]
fn test_join_failure_removes_handle() {
    let dir = tempfile::tempdir().unwrap();
    let handle = dir.path().join("net");
    // A plain file is not a namespace: setns rejects it
    fs::write(&handle, "").unwrap();

    let pair = ContainerConfig::default().veth;
    let err = netns::join(&handle, &pair).unwrap_err();

    assert!(matches!(err, Error::Namespace { .. }));
    assert!(err.to_string().contains("setns"), "unexpected error: {err}");
    assert!(!handle.exists());
}

#[test]
fn test_join_unreadable_handle_removes_it() {
    // Root opens the file regardless of its mode
    if is_root() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let handle = dir.path().join("net");
    fs::write(&handle, "").unwrap();
    fs::set_permissions(&handle, fs::Permissions::from_mode(0o000)).unwrap();

    let pair = ContainerConfig::default().veth;
    let err = netns::join(&handle, &pair).unwrap_err();

    assert!(matches!(err, Error::Namespace { .. }));
    assert!(err.to_string().contains("open"), "unexpected error: {err}");
    assert!(!err.to_string().contains("setns"), "unexpected error: {err}");
    assert!(!handle.exists());
}

#[test]
fn test_join_missing_handle() {
    let dir = tempfile::tempdir().unwrap();
    let pair = ContainerConfig::default().veth;

    let err = netns::join(&dir.path().join("net"), &pair).unwrap_err();
    assert!(matches!(err, Error::Namespace { .. }));
}

#[test]
fn test_second_persist_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let handle = dir.path().join("net");
    fs::write(&handle, "").unwrap();

    let err = PersistedNetns::persist(&handle).unwrap_err();
    assert!(err.to_string().contains("already exists"));
    // The pending handle is untouched
    assert!(handle.exists());
}

#[test]
#[ignore] // Requires root
fn test_persist_and_join_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let handle = dir.path().join("net");

    let kept = in_new_netns(|| PersistedNetns::persist(&handle).map(PersistedNetns::keep)).unwrap();
    assert_eq!(kept, handle);
    assert!(is_mount_point(&handle).unwrap());

    // setns switches only the calling thread
    let joiner = handle.clone();
    std::thread::spawn(move || PersistedNetns::open(&joiner).unwrap().enter())
        .join()
        .unwrap()
        .unwrap();

    assert!(!handle.exists());
}

#[test]
#[ignore] // Requires root
fn test_backend_follows_namespace_it_was_created_in() {
    let host = "veth0_scoped";
    let peer = "veth1_scoped";

    let created = in_new_netns(|| {
        let mut backend = NetlinkBackend::new()?;
        backend.create_veth(host, peer)?;
        backend.link_exists(host)
    })
    .unwrap();
    assert!(created);

    // The pair only ever existed in the new namespace
    let mut backend = NetlinkBackend::new().unwrap();
    assert!(!backend.link_exists(host).unwrap());
    assert!(!backend.link_exists(peer).unwrap());
}

#[test]
#[ignore] // Requires root
fn test_proc_shows_pid_one_after_chroot() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let code = run_in_child(
        CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNS,
        move || {
            if mount::privatize_and_mount_proc(&root).is_err() || mount::chroot_into(&root).is_err() {
                return 2;
            }
            match fs::read_link("/proc/self") {
                Ok(target) if target == Path::new("1") => 0,
                _ => 1,
            }
        },
    );

    assert_eq!(code, 0);
}

#[test]
#[ignore] // Requires root
fn test_hostname_in_new_uts_namespace() {
    let host_before = nix::unistd::gethostname().unwrap();

    let code = run_in_child(CloneFlags::CLONE_NEWUTS, || {
        if uts::set_hostname("container").is_err() {
            return 2;
        }
        match nix::unistd::gethostname() {
            Ok(name) if name == "container" => 0,
            _ => 1,
        }
    });

    assert_eq!(code, 0);
    assert_eq!(nix::unistd::gethostname().unwrap(), host_before);
}
