//! Domain-specific error types for sandbox platform operations.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings.

use std::time::Duration;

/// Errors that can occur talking to the sandbox platform.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The platform API cannot be reached at all.
    #[error("Sandbox platform unreachable: {message}")]
    Unreachable { message: String },

    /// An operation exceeded its configured timeout.
    #[error("Sandbox operation timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The platform answered with a non-success status.
    #[error("Sandbox API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The platform answered with a payload we could not interpret.
    #[error("Unexpected sandbox API response: {message}")]
    Protocol { message: String },
}

impl PlatformError {
    /// Creates an `Unreachable` error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error from a `Duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            timeout_secs: duration.as_secs(),
        }
    }

    /// Creates an `Api` error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a `Protocol` error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns true if the platform itself is unreachable.
    ///
    /// Only this condition aborts a session. Timeouts and API-level
    /// failures are handled where they occur, like any non-success
    /// command outcome.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
