//! Attach and detach a volume against the in-memory controller
//!
//! Usage: cargo run --example attach_detach -- [initiator-iqn]
//!
//! Set RUST_LOG=debug to follow each step of the connection sequence.

use std::net::Ipv4Addr;
use svc_iscsi::{
    Connector, DriverConfig, InMemoryController, IscsiDriver, StorageNode, Volume, VolumeAttributes,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let initiator = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "iqn.1993-08.org.debian:01:compute1".to_string());

    let controller = InMemoryController::new()
        .with_node(
            StorageNode::new("1", "node1", "0")
                .with_iscsi_name("iqn.1986-03.com.ibm:2145.cluster.node1")
                .with_ipv4(Ipv4Addr::new(192, 168, 10, 21)),
        )
        .with_node(
            StorageNode::new("2", "node2", "0")
                .with_iscsi_name("iqn.1986-03.com.ibm:2145.cluster.node2")
                .with_ipv4(Ipv4Addr::new(192, 168, 10, 22)),
        )
        .with_volume(VolumeAttributes::new("volume-demo", "2", "0"));

    let driver = IscsiDriver::builder()
        .config(DriverConfig::builder().chap_enabled(true).build()?)
        .build(controller)?;

    let volume = Volume::new("demo", "volume-demo");
    let connector = Connector::new(initiator).with_host("compute1");
    driver.validate_connector(&connector)?;

    let info = driver.initialize_connection(&volume, &connector)?;
    if let Some(properties) = info.properties() {
        println!("Portal: {}", properties.target_portal);
        println!("Target: {}", properties.target_iqn);
        println!("LUN:    {}", properties.target_lun);
        println!("Auth:   {}", properties.auth.as_ref().map_or("None", |a| a.auth_method.as_str()));
    }

    driver.terminate_connection(&volume, &connector)?;
    println!("Detached; hosts left on controller: {}", driver.controller().host_names().len());
    Ok(())
}
