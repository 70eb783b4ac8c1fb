//! iSCSI connection lifecycle for SVC/Storwize-family storage controllers
//!
//! This library attaches controller-hosted volumes to compute hosts over
//! iSCSI and detaches them again. For each request it finds or creates the
//! host object, reconciles the host's CHAP secret with policy, maps the
//! volume and picks the node of the volume's I/O group that should serve it.
//! Users implement the `StorageController` trait to provide access to the
//! controller (CLI over SSH, REST, ...).
//!
//! # Example
//!
//! ```no_run
//! use std::net::Ipv4Addr;
//! use svc_iscsi::{
//!     Connector, DriverConfig, InMemoryController, IscsiDriver, StorageNode, Volume,
//!     VolumeAttributes,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = InMemoryController::new()
//!     .with_node(
//!         StorageNode::new("1", "node1", "0")
//!             .with_iscsi_name("iqn.1986-03.com.ibm:2145.cluster.node1")
//!             .with_ipv4(Ipv4Addr::new(10, 0, 0, 5)),
//!     )
//!     .with_volume(VolumeAttributes::new("volume-1", "1", "0"));
//!
//! let driver = IscsiDriver::builder()
//!     .config(DriverConfig::builder().lock_path("/run/lock").build()?)
//!     .build(controller)?;
//!
//! let volume = Volume::new("1", "volume-1");
//! let connector = Connector::new("iqn.1993-08.org.debian:01:compute1");
//! let info = driver.initialize_connection(&volume, &connector)?;
//! println!("{:?}", info.properties().map(|p| &p.target_portal));
//! driver.terminate_connection(&volume, &connector)?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod connector;
pub mod controller;
pub mod error;
pub mod host;
pub mod lock;
pub mod mapping;
pub mod memory;
pub mod node;
pub mod properties;
pub mod session;

pub use auth::{ChapCredentials, ChapNegotiation, ChapSecret};
pub use config::DriverConfig;
pub use connector::Connector;
pub use controller::{LunId, StorageController, VolumeAttributes, VolumePlacement};
pub use error::{DriverError, DriverResult};
pub use memory::InMemoryController;
pub use node::{NodeInventory, Protocol, StorageNode};
pub use properties::{ConnectionData, ConnectionInfo, ConnectionProperties};
pub use session::{IscsiDriver, IscsiDriverBuilder, SessionState, Volume};

/// Version of this library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
