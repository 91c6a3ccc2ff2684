//! Burrow Core - Foundation types, configuration, and errors
//!
//! This crate provides the core abstractions shared by every Burrow stage.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod stage;
pub mod types;

pub use config::{ContainerConfig, NetnsStrategy, VethPair};
pub use error::{Error, Result};
pub use stage::LaunchStage;
pub use types::{ContainerId, ProcessId};

// Re-export commonly used types
pub use ipnetwork::IpNetwork;
