//! Veth link management with pluggable backends
//!
//! This crate provides a trait-based abstraction over rtnetlink for creating
//! a veth pair, configuring its host side, and moving its peer into a
//! container's network namespace, with production and mock implementations.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]

pub mod backend;
pub mod netlink;
pub mod veth;

pub use backend::{LinkBackend, MockBackend, MockLink};
pub use netlink::NetlinkBackend;
pub use veth::{PairStatus, VethManager, LOOPBACK};

// Re-export commonly used types
pub use burrow_core::VethPair;
