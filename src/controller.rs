//! Storage controller access layer
//!
//! The driver never talks to the controller CLI itself. Implementations of
//! [`StorageController`] own the transport and output parsing; every method
//! is one blocking round trip. Transport failures must be reported as
//! [`DriverError::BackendUnavailable`](crate::DriverError::BackendUnavailable).

use crate::auth::ChapSecret;
use crate::connector::Connector;
use crate::error::{DriverError, DriverResult};
use crate::node::StorageNode;
use std::sync::Arc;

/// Logical unit number a host addresses a mapped volume by
pub type LunId = u32;

/// Operations the driver needs from the storage controller
pub trait StorageController: Send + Sync {
    /// All nodes of the cluster, in controller order
    fn node_inventory(&self) -> DriverResult<Vec<StorageNode>>;

    /// Host object whose ports match the connector, if any
    fn host_by_connector(&self, connector: &Connector) -> DriverResult<Option<String>>;

    /// Create a host object for the connector and return its name
    fn create_host(&self, connector: &Connector) -> DriverResult<String>;

    fn chap_secret(&self, host: &str) -> DriverResult<Option<ChapSecret>>;

    /// Generate and install a CHAP secret on the host
    fn install_chap_secret(&self, host: &str) -> DriverResult<ChapSecret>;

    /// Volume metadata, or `None` when the controller does not know the volume
    fn volume_attributes(&self, volume: &str) -> DriverResult<Option<VolumeAttributes>>;

    /// Map the volume to the host and return the LUN id
    ///
    /// Mapping a volume to a host it is already mapped to returns the
    /// existing LUN. When `allow_multihost` is false and the volume is
    /// mapped to another host this fails with `MultiMapNotAllowed`.
    fn map_volume_to_host(&self, volume: &str, host: &str, allow_multihost: bool) -> DriverResult<LunId>;

    /// Remove a mapping and return the host it was removed from
    ///
    /// With `host == None` the host is taken from the volume's only mapping.
    /// Returns `None` when nothing was unmapped.
    fn unmap_volume_from_host(&self, volume: &str, host: Option<&str>) -> DriverResult<Option<String>>;

    /// Volumes currently mapped to the host
    fn mapped_volumes(&self, host: &str) -> DriverResult<Vec<String>>;

    fn delete_host(&self, host: &str) -> DriverResult<()>;
}

impl<C: StorageController + ?Sized> StorageController for Arc<C> {
    fn node_inventory(&self) -> DriverResult<Vec<StorageNode>> {
        (**self).node_inventory()
    }

    fn host_by_connector(&self, connector: &Connector) -> DriverResult<Option<String>> {
        (**self).host_by_connector(connector)
    }

    fn create_host(&self, connector: &Connector) -> DriverResult<String> {
        (**self).create_host(connector)
    }

    fn chap_secret(&self, host: &str) -> DriverResult<Option<ChapSecret>> {
        (**self).chap_secret(host)
    }

    fn install_chap_secret(&self, host: &str) -> DriverResult<ChapSecret> {
        (**self).install_chap_secret(host)
    }

    fn volume_attributes(&self, volume: &str) -> DriverResult<Option<VolumeAttributes>> {
        (**self).volume_attributes(volume)
    }

    fn map_volume_to_host(&self, volume: &str, host: &str, allow_multihost: bool) -> DriverResult<LunId> {
        (**self).map_volume_to_host(volume, host, allow_multihost)
    }

    fn unmap_volume_from_host(&self, volume: &str, host: Option<&str>) -> DriverResult<Option<String>> {
        (**self).unmap_volume_from_host(volume, host)
    }

    fn mapped_volumes(&self, host: &str) -> DriverResult<Vec<String>> {
        (**self).mapped_volumes(host)
    }

    fn delete_host(&self, host: &str) -> DriverResult<()> {
        (**self).delete_host(host)
    }
}

/// Volume metadata as reported by the controller
///
/// Fields the controller may omit are optional here and checked by
/// [`VolumeAttributes::placement`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeAttributes {
    pub name: String,
    pub preferred_node_id: Option<String>,
    pub io_group_id: Option<String>,
}

impl VolumeAttributes {
    pub fn new(name: impl Into<String>, preferred_node_id: impl Into<String>, io_group_id: impl Into<String>) -> Self {
        VolumeAttributes {
            name: name.into(),
            preferred_node_id: Some(preferred_node_id.into()),
            io_group_id: Some(io_group_id.into()),
        }
    }

    /// Where the volume is served from; both ids are required
    pub fn placement(&self) -> DriverResult<VolumePlacement> {
        let missing = |column: &str| {
            log::error!("Did not find expected column {} for volume {}", column, self.name);
            DriverError::BackendInconsistency(format!(
                "missing volume attribute {} for volume {}",
                column, self.name
            ))
        };
        let preferred_node_id = self
            .preferred_node_id
            .clone()
            .ok_or_else(|| missing("preferred_node_id"))?;
        let io_group_id = self.io_group_id.clone().ok_or_else(|| missing("IO_group_id"))?;

        Ok(VolumePlacement {
            volume: self.name.clone(),
            preferred_node_id,
            io_group_id,
        })
    }
}

/// Validated placement of a volume on the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePlacement {
    pub volume: String,
    pub preferred_node_id: String,
    pub io_group_id: String,
}
