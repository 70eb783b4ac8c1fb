//! Connection descriptors returned to the orchestration framework
//!
//! Field names follow what iSCSI initiator-side connectors expect
//! (`target_portal`, `target_iqn`, `auth_method`, ...), so the serialized
//! form can be handed over unchanged.

use crate::auth::{ChapCredentials, ChapSecret};
use crate::controller::LunId;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};

/// Value of `driver_volume_type` for every descriptor this crate produces
pub const DRIVER_VOLUME_TYPE: &str = "iscsi";

/// Everything an initiator needs to log in to a mapped volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionProperties {
    pub target_discovered: bool,
    /// `address:port` of the serving node
    pub target_portal: String,
    pub target_iqn: String,
    pub target_lun: LunId,
    pub volume_id: String,
    #[serde(flatten)]
    pub auth: Option<ChapAuth>,
}

impl ConnectionProperties {
    pub fn new(
        address: IpAddr,
        port: u16,
        target_iqn: impl Into<String>,
        target_lun: LunId,
        volume_id: impl Into<String>,
    ) -> Self {
        ConnectionProperties {
            target_discovered: false,
            target_portal: SocketAddr::new(address, port).to_string(),
            target_iqn: target_iqn.into(),
            target_lun,
            volume_id: volume_id.into(),
            auth: None,
        }
    }

    pub fn with_chap(mut self, credentials: &ChapCredentials) -> Self {
        self.auth = Some(ChapAuth::from_credentials(credentials));
        self
    }
}

/// CHAP settings for session and discovery logins
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapAuth {
    pub auth_method: String,
    pub auth_username: String,
    pub auth_password: ChapSecret,
    pub discovery_auth_method: String,
    pub discovery_auth_username: String,
    pub discovery_auth_password: ChapSecret,
}

impl ChapAuth {
    pub fn from_credentials(credentials: &ChapCredentials) -> Self {
        ChapAuth {
            auth_method: "CHAP".to_string(),
            auth_username: credentials.username.clone(),
            auth_password: credentials.secret.clone(),
            discovery_auth_method: "CHAP".to_string(),
            discovery_auth_username: credentials.username.clone(),
            discovery_auth_password: credentials.secret.clone(),
        }
    }
}

/// Payload of a [`ConnectionInfo`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConnectionData {
    Properties(ConnectionProperties),
    /// Serializes as `{}`
    Empty {},
}

/// Descriptor handed back by `initialize_connection` and `terminate_connection`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub driver_volume_type: &'static str,
    pub data: ConnectionData,
}

impl ConnectionInfo {
    pub fn connected(properties: ConnectionProperties) -> Self {
        ConnectionInfo {
            driver_volume_type: DRIVER_VOLUME_TYPE,
            data: ConnectionData::Properties(properties),
        }
    }

    pub fn disconnected() -> Self {
        ConnectionInfo {
            driver_volume_type: DRIVER_VOLUME_TYPE,
            data: ConnectionData::Empty {},
        }
    }

    pub fn properties(&self) -> Option<&ConnectionProperties> {
        match &self.data {
            ConnectionData::Properties(properties) => Some(properties),
            ConnectionData::Empty {} => None,
        }
    }
}
