//! Launch stages and their argv encoding

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Stage of a container launch
///
/// Each stage after [`LaunchStage::Initial`] runs in its own re-executed
/// process; the stage is selected by `argv[1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LaunchStage {
    /// Orchestrator entry point (`run`)
    Initial,

    /// Helper running inside a fresh network namespace
    NetworkNamespaceCreated,

    /// Container process running inside fresh PID, mount and UTS namespaces
    ContainerNamespacesCreated,
}

impl LaunchStage {
    /// All stages in launch order
    pub const ALL: [Self; 3] = [
        Self::Initial,
        Self::NetworkNamespaceCreated,
        Self::ContainerNamespacesCreated,
    ];

    /// The `argv[1]` sentinel selecting this stage
    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Initial => "run",
            Self::NetworkNamespaceCreated => "networkNamespaceCreated",
            Self::ContainerNamespacesCreated => "containerNamespacesCreated",
        }
    }
}

impl fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

impl FromStr for LaunchStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_arg() == s)
            .ok_or_else(|| Error::invalid_config(format!("Unknown launch stage: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_sentinels() {
        assert_eq!(LaunchStage::Initial.as_arg(), "run");
        assert_eq!(
            "networkNamespaceCreated".parse::<LaunchStage>().unwrap(),
            LaunchStage::NetworkNamespaceCreated
        );
        assert_eq!(
            "containerNamespacesCreated".parse::<LaunchStage>().unwrap(),
            LaunchStage::ContainerNamespacesCreated
        );
        assert!("afterNamespaced".parse::<LaunchStage>().is_err());
    }
}
