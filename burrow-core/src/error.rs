//! Error types for Burrow

use thiserror::Error;

/// Burrow error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Namespace creation or join failed
    #[error("Namespace error: {message}")]
    Namespace {
        /// Error message
        message: String,
    },

    /// Mount or unmount failed
    #[error("Mount error: {message}")]
    Mount {
        /// Error message
        message: String,
    },

    /// Link-layer (veth/address) operation failed
    #[error("Link error: {message}")]
    Link {
        /// Error message
        message: String,
    },

    /// Replacing the process image failed
    #[error("Exec error: {message}")]
    Exec {
        /// Error message
        message: String,
    },

    /// Permission denied
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),

    /// Stage handoff (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::Namespace`] error
    pub fn namespace(message: impl Into<String>) -> Self {
        Self::Namespace {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Mount`] error
    pub fn mount(message: impl Into<String>) -> Self {
        Self::Mount {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Link`] error
    pub fn link(message: impl Into<String>) -> Self {
        Self::Link {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::InvalidConfig`] error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type alias for Burrow operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::namespace("setns failed: EINVAL");
        assert_eq!(err.to_string(), "Namespace error: setns failed: EINVAL");

        let err = Error::link("interface not found: veth1_container");
        assert!(err.to_string().starts_with("Link error:"));
    }

    #[test]
    fn test_nix_conversion() {
        let err: Error = nix::errno::Errno::EPERM.into();
        assert!(matches!(err, Error::System(_)));
    }
}
