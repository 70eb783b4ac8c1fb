//! Error types for connection lifecycle operations

use thiserror::Error;

/// Errors surfaced by the iSCSI connection driver
#[derive(Debug, Error)]
pub enum DriverError {
    /// The connector lacks a field needed to identify the compute host
    #[error("Connector is missing required field '{field}'")]
    MissingConnectorField { field: &'static str },

    /// The controller could not be reached or rejected the command
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The controller returned data that violates an expected invariant
    #[error("Storage backend inconsistency: {0}")]
    BackendInconsistency(String),

    #[error("No node found in I/O group {io_group} for volume {volume}")]
    NoServingNodeInGroup { io_group: String, volume: String },

    #[error("Volume {volume} is already mapped to host {mapped_host}; multi-host mapping is disabled")]
    MultiMapNotAllowed { volume: String, mapped_host: String },

    /// Setup left no node able to serve any protocol
    #[error("No configured nodes")]
    NoConfiguredNodes,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error on {name}: {source}")]
    Lock {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = DriverError::NoServingNodeInGroup {
            io_group: "1".to_string(),
            volume: "volume-1".to_string(),
        };
        assert_eq!(err.to_string(), "No node found in I/O group 1 for volume volume-1");

        let err = DriverError::MissingConnectorField { field: "initiator" };
        assert!(err.to_string().contains("initiator"));
    }
}
