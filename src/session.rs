//! Connection session management
//!
//! [`IscsiDriver`] turns connection requests from the orchestration
//! framework into controller operations. Attaching a volume walks through
//! the [`SessionState`] sequence below; a failure once the volume is mapped
//! rolls the mapping back before the error is returned.
//!
//! ```text
//! Idle -> Resolving -> Authenticating -> Mapping -> Selecting -> Completed
//!                   \_____________________________________\_____> Failed
//! ```
//!
//! Both operations hold the host-mapping [`NamedLock`] for their whole
//! controller conversation.

use crate::auth::{ensure_chap_secret, ChapCredentials};
use crate::config::DriverConfig;
use crate::connector::{validate_connector, Connector};
use crate::controller::StorageController;
use crate::error::{DriverError, DriverResult};
use crate::host::resolve_or_create_host;
use crate::lock::NamedLock;
use crate::mapping::{count_remaining_mappings, map_volume_to_host, unmap_volume_from_host};
use crate::node::NodeInventory;
use crate::properties::{ConnectionInfo, ConnectionProperties};

/// Volume a connection is requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Identifier reported back to the framework
    pub id: String,
    /// Name of the volume on the controller
    pub name: String,
}

impl Volume {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Volume {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Attach state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Looking up or creating the host object
    Resolving,
    /// Reconciling the host's CHAP secret
    Authenticating,
    /// Fetching volume attributes and mapping the volume
    Mapping,
    /// Picking the serving node and building properties
    Selecting,
    Completed,
    Failed,
}

/// Progress of one `initialize_connection` call
#[derive(Debug, Default)]
struct Attach {
    state: SessionState,
    /// Host the volume was mapped to, once mapping succeeded
    mapped_host: Option<String>,
}

impl Attach {
    fn enter(&mut self, next: SessionState) {
        log::debug!("Attach state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// An attach that failed, with the outcome of its rollback
#[derive(Debug)]
struct FailedAttach {
    cause: DriverError,
    /// State the failure happened in
    state: SessionState,
    /// `None` when nothing had been mapped yet
    rollback: Option<DriverResult<()>>,
}

impl FailedAttach {
    /// Log the failure and rollback, then hand back the original error
    fn into_cause(self, volume: &Volume, connector: &Connector) -> DriverError {
        match &self.rollback {
            Some(Ok(())) => log::info!(
                "initialize_connection: rolled back mapping of volume {} for {}",
                volume.id,
                connector.summary()
            ),
            Some(Err(e)) => log::error!(
                "initialize_connection: rollback of volume {} for {} failed: {}",
                volume.id,
                connector.summary(),
                e
            ),
            None => {}
        }
        log::error!(
            "initialize_connection: failed in state {:?} for volume {} and connector {}: {}",
            self.state,
            volume.id,
            connector.summary(),
            self.cause
        );
        self.cause
    }
}

/// iSCSI connection driver for one storage controller
pub struct IscsiDriver<C: StorageController> {
    controller: C,
    config: DriverConfig,
    nodes: NodeInventory,
    lock: NamedLock,
}

impl<C: StorageController> IscsiDriver<C> {
    /// Create a new builder for configuring the driver
    pub fn builder() -> IscsiDriverBuilder<C> {
        IscsiDriverBuilder::new()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Node inventory captured at setup
    pub fn nodes(&self) -> &NodeInventory {
        &self.nodes
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Check the connector carries an initiator
    pub fn validate_connector(&self, connector: &Connector) -> DriverResult<()> {
        validate_connector(connector)
    }

    /// Make a volume reachable over iSCSI from the connector's host
    ///
    /// 1. Translate the connector to a controller host, creating it if needed
    /// 2. Make the host's CHAP secret match the configured policy
    /// 3. Map the volume to the host if it is not already
    /// 4. Return the portal of the volume's serving node
    pub fn initialize_connection(&self, volume: &Volume, connector: &Connector) -> DriverResult<ConnectionInfo> {
        log::debug!(
            "enter: initialize_connection: volume {} with connector {}",
            volume.id,
            connector.summary()
        );
        self.validate_connector(connector)?;
        let _guard = self.lock.acquire()?;

        let mut attach = Attach::default();
        match self.attach(&mut attach, volume, connector) {
            Ok(properties) => {
                attach.enter(SessionState::Completed);
                log::debug!(
                    "leave: initialize_connection: volume {} with connector {}: portal {} iqn {} lun {}",
                    volume.id,
                    connector.summary(),
                    properties.target_portal,
                    properties.target_iqn,
                    properties.target_lun
                );
                Ok(ConnectionInfo::connected(properties))
            }
            Err(cause) => {
                let state = attach.state;
                attach.enter(SessionState::Failed);
                let rollback = attach
                    .mapped_host
                    .as_deref()
                    .map(|host| self.detach(volume, connector, Some(host)));
                Err(FailedAttach {
                    cause,
                    state,
                    rollback,
                }
                .into_cause(volume, connector))
            }
        }
    }

    fn attach(&self, attach: &mut Attach, volume: &Volume, connector: &Connector) -> DriverResult<ConnectionProperties> {
        attach.enter(SessionState::Resolving);
        let host = resolve_or_create_host(&self.controller, connector)?;

        attach.enter(SessionState::Authenticating);
        let chap = ensure_chap_secret(&self.controller, &host, self.config.chap_enabled)?;

        attach.enter(SessionState::Mapping);
        let attributes = self.controller.volume_attributes(&volume.name)?.ok_or_else(|| {
            DriverError::BackendInconsistency(format!(
                "failed to get attributes for volume {}",
                volume.name
            ))
        })?;
        let lun = map_volume_to_host(
            &self.controller,
            &volume.name,
            &host,
            self.config.multihostmap_enabled,
        )?;
        attach.mapped_host = Some(host);

        attach.enter(SessionState::Selecting);
        let placement = attributes.placement()?;
        let selection = self.nodes.select_serving_node(self.config.protocol, &placement)?;

        let properties = ConnectionProperties::new(
            selection.address,
            self.config.iscsi_port,
            &selection.node.iscsi_name,
            lun,
            &volume.id,
        );
        Ok(match chap.secret() {
            Some(secret) => {
                properties.with_chap(&ChapCredentials::new(connector.initiator()?, secret.clone()))
            }
            None => properties,
        })
    }

    /// Clean up after a connection has been terminated
    ///
    /// 1. Translate the connector to a host name, when it names a host
    /// 2. Remove the volume-to-host mapping if it exists
    /// 3. Delete the host once it has no mappings left
    pub fn terminate_connection(&self, volume: &Volume, connector: &Connector) -> DriverResult<ConnectionInfo> {
        log::debug!(
            "enter: terminate_connection: volume {} with connector {}",
            volume.id,
            connector.summary()
        );
        let _guard = self.lock.acquire()?;

        self.detach(volume, connector, None).map_err(|e| {
            log::error!(
                "terminate_connection: failed for volume {} and connector {}: {}",
                volume.id,
                connector.summary(),
                e
            );
            e
        })?;

        log::debug!(
            "leave: terminate_connection: volume {} with connector {}",
            volume.id,
            connector.summary()
        );
        Ok(ConnectionInfo::disconnected())
    }

    /// Unmap and reclaim the host; the caller holds the lock
    ///
    /// `known_host` short-cuts host resolution when the caller already
    /// resolved it.
    fn detach(&self, volume: &Volume, connector: &Connector, known_host: Option<&str>) -> DriverResult<()> {
        let host = match known_host {
            Some(host) => Some(host.to_string()),
            None if connector.claims_host() => match self.controller.host_by_connector(connector)? {
                Some(host) => Some(host),
                None => {
                    return Err(DriverError::BackendInconsistency(format!(
                        "failed to get host name from connector {}",
                        connector.summary()
                    )))
                }
            },
            // Host unknown; use the volume's mapping
            None => None,
        };

        let affected = unmap_volume_from_host(&self.controller, &volume.name, host.as_deref())?;
        if let Some(host) = affected {
            if count_remaining_mappings(&self.controller, &host)? == 0 {
                log::info!("Deleting host {} with no remaining mappings", host);
                self.controller.delete_host(&host)?;
            }
        }
        Ok(())
    }
}

/// Builder for configuring an [`IscsiDriver`]
pub struct IscsiDriverBuilder<C: StorageController> {
    config: Option<DriverConfig>,
    _phantom: std::marker::PhantomData<C>,
}

impl<C: StorageController> IscsiDriverBuilder<C> {
    fn new() -> Self {
        Self {
            config: None,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Set the configuration (default: [`DriverConfig::default`])
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Read the node inventory from the controller and build the driver
    ///
    /// Fails with `NoConfiguredNodes` when no node can serve any protocol.
    pub fn build(self, controller: C) -> DriverResult<IscsiDriver<C>> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        log::debug!("enter: do_setup");
        let nodes = NodeInventory::from_nodes(controller.node_inventory()?)?;
        if !nodes.enabled_protocols().contains(&config.protocol) {
            log::warn!("No node has {} enabled; connections will fail", config.protocol);
        }
        let lock = NamedLock::from_config(&config);
        log::debug!("leave: do_setup: {} nodes", nodes.len());

        Ok(IscsiDriver {
            controller,
            config,
            nodes,
            lock,
        })
    }
}
