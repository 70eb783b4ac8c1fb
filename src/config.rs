//! Driver configuration
//!
//! Values are loaded by the hosting framework (TOML, JSON or options on the
//! command line) and handed to the driver read-only. Every field has a
//! default, so a partial document deserializes cleanly.

use crate::error::{DriverError, DriverResult};
use crate::node::Protocol;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

/// Default iSCSI portal port
pub const DEFAULT_ISCSI_PORT: u16 = 3260;

/// Default name of the host-mapping lock
pub const DEFAULT_LOCK_NAME: &str = "storwize-host";

/// Default prefix of lock files
pub const DEFAULT_LOCK_PREFIX: &str = "svc-iscsi";

/// Connection driver configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Configure CHAP authentication for iSCSI connections
    pub chap_enabled: bool,
    /// Allow a volume to be mapped to more than one host
    pub multihostmap_enabled: bool,
    /// Protocol volumes are served over
    pub protocol: Protocol,
    /// Port reported in the target portal
    pub iscsi_port: u16,
    /// Directory holding lock files
    pub lock_path: PathBuf,
    pub lock_prefix: String,
    /// Lock serializing host-mapping operations
    pub lock_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            chap_enabled: true,
            multihostmap_enabled: true,
            protocol: Protocol::Iscsi,
            iscsi_port: DEFAULT_ISCSI_PORT,
            lock_path: std::env::temp_dir(),
            lock_prefix: DEFAULT_LOCK_PREFIX.to_string(),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
        }
    }
}

impl DriverConfig {
    /// Create a new builder starting from the defaults
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder {
            config: DriverConfig::default(),
        }
    }

    /// Check values a deserialized document may have gotten wrong
    pub fn validate(&self) -> DriverResult<()> {
        if self.iscsi_port == 0 {
            return Err(DriverError::Config("iscsi_port must be non-zero".to_string()));
        }
        for (key, value) in [("lock_name", &self.lock_name), ("lock_prefix", &self.lock_prefix)] {
            if value.is_empty() {
                return Err(DriverError::Config(format!("{} must not be empty", key)));
            }
            let mut components = Path::new(value).components();
            let single_name = matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(name)), None) if name == value.as_str()
            );
            if !single_name || value.contains('\0') {
                return Err(DriverError::Config(format!(
                    "{} must not contain path separators: {:?}",
                    key, value
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`DriverConfig`]
#[derive(Debug, Clone)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// Enable or disable CHAP (default: enabled)
    pub fn chap_enabled(mut self, enabled: bool) -> Self {
        self.config.chap_enabled = enabled;
        self
    }

    /// Allow or refuse mapping a volume to several hosts (default: allowed)
    pub fn multihostmap_enabled(mut self, enabled: bool) -> Self {
        self.config.multihostmap_enabled = enabled;
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Set the portal port (default: 3260)
    pub fn iscsi_port(mut self, port: u16) -> Self {
        self.config.iscsi_port = port;
        self
    }

    /// Set the lock directory (default: the OS temp dir)
    pub fn lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.lock_path = path.into();
        self
    }

    pub fn lock_prefix(mut self, prefix: &str) -> Self {
        self.config.lock_prefix = prefix.to_string();
        self
    }

    pub fn lock_name(mut self, name: &str) -> Self {
        self.config.lock_name = name.to_string();
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> DriverResult<DriverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert!(config.chap_enabled);
        assert!(config.multihostmap_enabled);
        assert_eq!(config.protocol, Protocol::Iscsi);
        assert_eq!(config.iscsi_port, 3260);
        assert_eq!(config.lock_name, "storwize-host");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = DriverConfig::builder()
            .chap_enabled(false)
            .multihostmap_enabled(false)
            .iscsi_port(3261)
            .lock_path("/run/lock")
            .build()
            .unwrap();
        assert!(!config.chap_enabled);
        assert!(!config.multihostmap_enabled);
        assert_eq!(config.iscsi_port, 3261);
        assert_eq!(config.lock_path, PathBuf::from("/run/lock"));
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(matches!(
            DriverConfig::builder().iscsi_port(0).build(),
            Err(DriverError::Config(_))
        ));
        assert!(matches!(
            DriverConfig::builder().lock_name("").build(),
            Err(DriverError::Config(_))
        ));
        for name in ["../host", "locks/host", "..", ".", "/host", "host\0"] {
            assert!(
                matches!(DriverConfig::builder().lock_name(name).build(), Err(DriverError::Config(_))),
                "lock name {:?} should be rejected",
                name
            );
        }
        assert!(matches!(
            DriverConfig::builder().lock_prefix("a/b").build(),
            Err(DriverError::Config(_))
        ));
        assert!(DriverConfig::builder().lock_name("storwize-host.v2").build().is_ok());
    }
}
