//! In-memory storage controller
//!
//! Behaves like a single controller cluster held in process memory: host
//! objects, CHAP secrets, volumes and host mappings. Every call is recorded
//! so callers can check which controller operations a request performed and
//! in what order. Useful for tests and dry runs of the driver.

use crate::auth::{generate_chap_secret, ChapSecret};
use crate::connector::{host_name_for, Connector};
use crate::controller::{LunId, StorageController, VolumeAttributes};
use crate::error::{DriverError, DriverResult};
use crate::node::StorageNode;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// A controller operation as recorded by [`InMemoryController`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCall {
    NodeInventory,
    HostByConnector { initiator: Option<String> },
    CreateHost { host: String },
    ChapSecret { host: String },
    InstallChapSecret { host: String },
    VolumeAttributes { volume: String },
    MapVolume { volume: String, host: String },
    UnmapVolume { volume: String, host: Option<String> },
    MappedVolumes { host: String },
    DeleteHost { host: String },
}

#[derive(Debug)]
struct HostRecord {
    initiator: String,
    chap_secret: Option<ChapSecret>,
    /// Volume name to LUN id
    mappings: BTreeMap<String, LunId>,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<StorageNode>,
    hosts: BTreeMap<String, HostRecord>,
    volumes: BTreeMap<String, VolumeAttributes>,
    calls: Vec<ControllerCall>,
    offline: bool,
}

impl State {
    fn record(&mut self, call: ControllerCall) -> DriverResult<()> {
        self.calls.push(call);
        if self.offline {
            return Err(DriverError::BackendUnavailable(
                "controller is not reachable".to_string(),
            ));
        }
        Ok(())
    }

    fn host_mut(&mut self, host: &str) -> DriverResult<&mut HostRecord> {
        self.hosts.get_mut(host).ok_or_else(|| {
            DriverError::BackendInconsistency(format!("host {} does not exist", host))
        })
    }

    /// Hosts the volume is mapped to
    fn hosts_of(&self, volume: &str) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|(_, record)| record.mappings.contains_key(volume))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Storage controller kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryController {
    state: Mutex<State>,
}

impl InMemoryController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the cluster inventory
    pub fn with_node(self, node: StorageNode) -> Self {
        self.state.lock().nodes.push(node);
        self
    }

    /// Add a volume to the cluster
    pub fn with_volume(self, attributes: VolumeAttributes) -> Self {
        self.add_volume(attributes);
        self
    }

    pub fn add_volume(&self, attributes: VolumeAttributes) {
        self.state
            .lock()
            .volumes
            .insert(attributes.name.clone(), attributes);
    }

    /// Make every following call fail with `BackendUnavailable`
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Calls made so far, oldest first
    pub fn calls(&self) -> Vec<ControllerCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn host_names(&self) -> Vec<String> {
        self.state.lock().hosts.keys().cloned().collect()
    }

    pub fn has_host(&self, host: &str) -> bool {
        self.state.lock().hosts.contains_key(host)
    }

    /// Hosts the volume is mapped to, with the LUN id on each
    pub fn mappings_of(&self, volume: &str) -> Vec<(String, LunId)> {
        self.state
            .lock()
            .hosts
            .iter()
            .filter_map(|(name, record)| record.mappings.get(volume).map(|lun| (name.clone(), *lun)))
            .collect()
    }
}

impl StorageController for InMemoryController {
    fn node_inventory(&self) -> DriverResult<Vec<StorageNode>> {
        let mut state = self.state.lock();
        state.record(ControllerCall::NodeInventory)?;
        Ok(state.nodes.clone())
    }

    fn host_by_connector(&self, connector: &Connector) -> DriverResult<Option<String>> {
        let mut state = self.state.lock();
        state.record(ControllerCall::HostByConnector {
            initiator: connector.initiator.clone(),
        })?;
        let initiator = connector.initiator()?;
        Ok(state
            .hosts
            .iter()
            .find(|(_, record)| record.initiator == initiator)
            .map(|(name, _)| name.clone()))
    }

    fn create_host(&self, connector: &Connector) -> DriverResult<String> {
        let host = host_name_for(connector)?;
        let mut state = self.state.lock();
        state.record(ControllerCall::CreateHost { host: host.clone() })?;
        if state.hosts.contains_key(&host) {
            return Err(DriverError::BackendInconsistency(format!(
                "host {} already exists",
                host
            )));
        }
        state.hosts.insert(
            host.clone(),
            HostRecord {
                initiator: connector.initiator()?.to_string(),
                chap_secret: None,
                mappings: BTreeMap::new(),
            },
        );
        Ok(host)
    }

    fn chap_secret(&self, host: &str) -> DriverResult<Option<ChapSecret>> {
        let mut state = self.state.lock();
        state.record(ControllerCall::ChapSecret { host: host.to_string() })?;
        Ok(state.host_mut(host)?.chap_secret.clone())
    }

    fn install_chap_secret(&self, host: &str) -> DriverResult<ChapSecret> {
        let mut state = self.state.lock();
        state.record(ControllerCall::InstallChapSecret { host: host.to_string() })?;
        let secret = generate_chap_secret();
        state.host_mut(host)?.chap_secret = Some(secret.clone());
        Ok(secret)
    }

    fn volume_attributes(&self, volume: &str) -> DriverResult<Option<VolumeAttributes>> {
        let mut state = self.state.lock();
        state.record(ControllerCall::VolumeAttributes { volume: volume.to_string() })?;
        Ok(state.volumes.get(volume).cloned())
    }

    fn map_volume_to_host(&self, volume: &str, host: &str, allow_multihost: bool) -> DriverResult<LunId> {
        let mut state = self.state.lock();
        state.record(ControllerCall::MapVolume {
            volume: volume.to_string(),
            host: host.to_string(),
        })?;
        if !state.volumes.contains_key(volume) {
            return Err(DriverError::BackendInconsistency(format!(
                "volume {} does not exist",
                volume
            )));
        }
        if let Some(lun) = state.host_mut(host)?.mappings.get(volume) {
            return Ok(*lun);
        }
        if !allow_multihost {
            if let Some(mapped_host) = state.hosts_of(volume).into_iter().next() {
                return Err(DriverError::MultiMapNotAllowed {
                    volume: volume.to_string(),
                    mapped_host,
                });
            }
        }

        let record = state.host_mut(host)?;
        let lun = (0..)
            .find(|candidate| !record.mappings.values().any(|used| used == candidate))
            .unwrap_or_default();
        record.mappings.insert(volume.to_string(), lun);
        Ok(lun)
    }

    fn unmap_volume_from_host(&self, volume: &str, host: Option<&str>) -> DriverResult<Option<String>> {
        let mut state = self.state.lock();
        state.record(ControllerCall::UnmapVolume {
            volume: volume.to_string(),
            host: host.map(str::to_string),
        })?;

        let mapped = state.hosts_of(volume);
        if mapped.is_empty() {
            log::warn!("No mapping of volume {} to any host found", volume);
            return Ok(None);
        }
        let host = match host {
            Some(host) if mapped.iter().any(|h| h == host) => host.to_string(),
            Some(host) => {
                log::warn!("No mapping of volume {} to host {} found", volume, host);
                return Ok(None);
            }
            None if mapped.len() > 1 => {
                log::warn!("Multiple mappings of volume {} found, no host specified", volume);
                return Ok(None);
            }
            None => mapped[0].clone(),
        };
        state.host_mut(&host)?.mappings.remove(volume);
        Ok(Some(host))
    }

    fn mapped_volumes(&self, host: &str) -> DriverResult<Vec<String>> {
        let mut state = self.state.lock();
        state.record(ControllerCall::MappedVolumes { host: host.to_string() })?;
        Ok(state.host_mut(host)?.mappings.keys().cloned().collect())
    }

    fn delete_host(&self, host: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.record(ControllerCall::DeleteHost { host: host.to_string() })?;
        if !state.host_mut(host)?.mappings.is_empty() {
            return Err(DriverError::BackendInconsistency(format!(
                "host {} still has mappings",
                host
            )));
        }
        state.hosts.remove(host);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> InMemoryController {
        InMemoryController::new()
            .with_volume(VolumeAttributes::new("volume-1", "1", "0"))
            .with_volume(VolumeAttributes::new("volume-2", "1", "0"))
    }

    #[test]
    fn test_lun_allocation_reuses_gaps() {
        let controller = controller();
        let host = controller.create_host(&Connector::new("iqn.a")).unwrap();

        assert_eq!(controller.map_volume_to_host("volume-1", &host, true).unwrap(), 0);
        assert_eq!(controller.map_volume_to_host("volume-2", &host, true).unwrap(), 1);
        // Same host keeps its LUN
        assert_eq!(controller.map_volume_to_host("volume-1", &host, true).unwrap(), 0);

        controller.unmap_volume_from_host("volume-1", Some(host.as_str())).unwrap();
        assert_eq!(controller.map_volume_to_host("volume-1", &host, true).unwrap(), 0);
    }

    #[test]
    fn test_multihost_policy() {
        let controller = controller();
        let a = controller.create_host(&Connector::new("iqn.a")).unwrap();
        let b = controller.create_host(&Connector::new("iqn.b")).unwrap();

        controller.map_volume_to_host("volume-1", &a, false).unwrap();
        assert!(matches!(
            controller.map_volume_to_host("volume-1", &b, false),
            Err(DriverError::MultiMapNotAllowed { .. })
        ));
        assert!(controller.map_volume_to_host("volume-1", &b, true).is_ok());
        assert_eq!(controller.mappings_of("volume-1").len(), 2);
    }

    #[test]
    fn test_unmap_without_host_is_ambiguous_with_two_mappings() {
        let controller = controller();
        let a = controller.create_host(&Connector::new("iqn.a")).unwrap();
        let b = controller.create_host(&Connector::new("iqn.b")).unwrap();
        controller.map_volume_to_host("volume-1", &a, true).unwrap();
        controller.map_volume_to_host("volume-1", &b, true).unwrap();

        assert_eq!(controller.unmap_volume_from_host("volume-1", None).unwrap(), None);
        assert_eq!(controller.mappings_of("volume-1").len(), 2);

        assert_eq!(
            controller.unmap_volume_from_host("volume-1", Some(b.as_str())).unwrap(),
            Some(b)
        );
        assert_eq!(
            controller.unmap_volume_from_host("volume-1", None).unwrap(),
            Some(a)
        );
        assert_eq!(controller.unmap_volume_from_host("volume-1", None).unwrap(), None);
    }

    #[test]
    fn test_offline_controller() {
        let controller = controller();
        controller.set_offline(true);
        assert!(matches!(
            controller.create_host(&Connector::new("iqn.a")),
            Err(DriverError::BackendUnavailable(_))
        ));
        assert_eq!(controller.calls().len(), 1);
    }

    #[test]
    fn test_duplicate_host_is_refused() {
        let controller = controller();
        let connector = Connector::new("iqn.a");
        controller.create_host(&connector).unwrap();
        assert!(matches!(
            controller.create_host(&connector),
            Err(DriverError::BackendInconsistency(_))
        ));
        assert_eq!(controller.host_names().len(), 1);
    }

    #[test]
    fn test_delete_host_with_mappings_is_refused() {
        let controller = controller();
        let host = controller.create_host(&Connector::new("iqn.a")).unwrap();
        controller.map_volume_to_host("volume-1", &host, true).unwrap();
        assert!(controller.delete_host(&host).is_err());
        assert!(controller.has_host(&host));
    }
}
