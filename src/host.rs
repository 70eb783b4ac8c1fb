//! Host object resolution

use crate::connector::Connector;
use crate::controller::StorageController;
use crate::error::DriverResult;

/// Find the controller host for a connector, creating it when absent
///
/// Callers must hold the host-mapping lock; lookup and creation are not
/// atomic on the controller.
pub fn resolve_or_create_host<C: StorageController + ?Sized>(
    controller: &C,
    connector: &Connector,
) -> DriverResult<String> {
    connector.initiator()?;

    if let Some(host) = controller.host_by_connector(connector)? {
        log::debug!("Found host {} for {}", host, connector.summary());
        return Ok(host);
    }

    let host = controller.create_host(connector)?;
    log::info!("Created host {} for {}", host, connector.summary());
    Ok(host)
}
