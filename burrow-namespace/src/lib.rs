//! Namespace management for process isolation
//!
//! This crate launches a container process in its own namespaces:
//! - Network namespace - created first and persisted through a bind-mounted handle
//! - PID namespace - the container command runs as PID 1
//! - Mount namespace - private mounts, fresh proc, chroot
//! - UTS namespace - container hostname
//!
//! [`Orchestrator`] sequences the stages; the other modules are the single
//! kernel-facing steps it is built from.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod mount;
pub mod netns;
pub mod orchestrator;
pub mod spawn;
pub mod stdio;
pub mod uts;

pub use config::NamespaceConfig;
pub use netns::{is_mount_point, PersistedNetns};
pub use orchestrator::Orchestrator;
pub use stdio::StdioFiles;
