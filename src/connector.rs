//! Connector descriptors supplied by compute hosts

use crate::error::{DriverError, DriverResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest host-name prefix kept before the uniqueness suffix.
/// The controller limits host names to 63 characters.
const MAX_HOST_PREFIX: usize = 54;

/// Description of the compute host asking for a connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    /// Initiator IQN of the compute host
    #[serde(default)]
    pub initiator: Option<String>,
    /// Hostname of the compute host
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub multipath: bool,
}

impl Connector {
    /// Create a connector for the given initiator IQN
    pub fn new(initiator: impl Into<String>) -> Self {
        Connector {
            initiator: Some(initiator.into()),
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_multipath(mut self, multipath: bool) -> Self {
        self.multipath = multipath;
        self
    }

    /// The initiator IQN, or `MissingConnectorField` when absent or empty
    pub fn initiator(&self) -> DriverResult<&str> {
        match self.initiator.as_deref() {
            Some(initiator) if !initiator.is_empty() => Ok(initiator),
            _ => Err(DriverError::MissingConnectorField { field: "initiator" }),
        }
    }

    /// Whether the caller claims to know its own host
    pub fn claims_host(&self) -> bool {
        self.host.is_some()
    }

    /// Short form used in log records and error messages
    pub fn summary(&self) -> ConnectorSummary<'_> {
        ConnectorSummary(self)
    }
}

/// Display adapter for [`Connector::summary`]
pub struct ConnectorSummary<'a>(&'a Connector);

impl fmt::Display for ConnectorSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "initiator={} host={}",
            self.0.initiator.as_deref().unwrap_or("<none>"),
            self.0.host.as_deref().unwrap_or("<none>")
        )
    }
}

/// Check the connector carries what an iSCSI connection needs
pub fn validate_connector(connector: &Connector) -> DriverResult<()> {
    connector.initiator().map(|_| ()).map_err(|e| {
        log::error!("The connector does not contain the required information: {}", connector.summary());
        e
    })
}

/// Controller host name for a connector
///
/// The hostname (or the initiator when no hostname is given) is reduced to
/// `[A-Za-z0-9 ._-]`, made to start with a letter or `_`, and suffixed with
/// 8 hex digits of the initiator's MD5 so two compute hosts sharing a
/// hostname still get distinct host objects. The same connector always
/// yields the same name.
pub fn host_name_for(connector: &Connector) -> DriverResult<String> {
    let initiator = connector.initiator()?;
    let base = connector
        .host
        .as_deref()
        .filter(|host| !host.is_empty())
        .unwrap_or(initiator);

    let mut name: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        name.insert(0, '_');
    }
    // ASCII only at this point, so byte truncation is safe
    name.truncate(MAX_HOST_PREFIX);

    let digest = md5::compute(initiator.as_bytes());
    Ok(format!("{}-{}", name, hex::encode(&digest.0[..4])))
}
