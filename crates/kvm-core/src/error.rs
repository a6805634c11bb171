//! Error types for the driver engine

use thiserror::Error;

/// Errors that can occur on a driver's serial connection
#[derive(Debug, Error)]
pub enum DriverError {
    /// Device path could not be opened at startup
    #[error("could not open {path}: {source}")]
    Connection {
        /// Serial device path
        path: String,
        /// Underlying serial error
        #[source]
        source: tokio_serial::Error,
    },

    /// The connection failed mid-operation; no automatic reconnect
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A write to the device failed; the command is not retried
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Errors that can occur registering drivers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two drivers were configured with the same short name
    #[error("driver already registered: {0}")]
    DuplicateShortName(String),
}

/// Errors that can occur resolving layout actions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The named device is not part of the layout
    #[error("device [{0}] was not found")]
    DeviceNotFound(String),

    /// A direction string from the transport layer did not parse
    #[error("unknown direction: {0}")]
    UnknownDirection(String),
}
