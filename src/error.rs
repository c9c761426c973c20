/// Error handling module for devport.
///
/// This module defines the error types used throughout the library.
/// Allocation and startup failures carry the port and service context
/// a caller needs to report the problem to a student.
///
/// # Example
///
/// ```
/// use devport::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::PortAllocation { reason, .. }) => println!("No port available: {}", reason),
///         Err(Error::ServiceStartup { name, port, .. }) => {
///             println!("'{}' failed to start on port {}", name, port)
///         }
///         Err(Error::ServiceNotFound(id)) => println!("Unknown server {}", id),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use crate::server::ServiceStatus;
use thiserror::Error;

/// Errors that can occur in the devport library.
#[derive(Error, Debug)]
pub enum Error {
    /// No usable port was found after exhausting the configured range.
    ///
    /// `requested_port` is the caller's preferred port, if one was given.
    #[error("Port allocation failed (requested {requested_port:?}): {reason}")]
    PortAllocation {
        requested_port: Option<u16>,
        reason: String,
    },

    /// A server failed to launch after its port had been allocated.
    ///
    /// The port has already been released when this error is returned.
    #[error("Service '{name}' failed to start on port {port}: {reason}")]
    ServiceStartup {
        name: String,
        port: u16,
        reason: String,
    },

    /// The requested server id is not known to the manager.
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// A lifecycle operation was attempted from a state that does not allow it.
    #[error("Service {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ServiceStatus,
        to: ServiceStatus,
    },

    /// A launcher failed while building, launching or terminating a server.
    #[error("Launch error: {0}")]
    Launch(String),

    /// Failed to parse configuration from a file or string.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    ///
    /// This error occurs when:
    /// - The port range is empty or inverted
    /// - A capacity or interval is zero
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for devport operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map a poisoned lock into an [`Error::Other`] naming the guarded state.
    pub(crate) fn lock(what: &str) -> Self {
        Error::Other(format!("Failed to lock {}", what))
    }
}
