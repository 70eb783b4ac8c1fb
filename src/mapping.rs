//! Volume-to-host mapping

use crate::controller::{LunId, StorageController};
use crate::error::DriverResult;

/// Map a volume to a host and return the LUN id the host sees it at
pub fn map_volume_to_host<C: StorageController + ?Sized>(
    controller: &C,
    volume: &str,
    host: &str,
    allow_multihost: bool,
) -> DriverResult<LunId> {
    let lun = controller.map_volume_to_host(volume, host, allow_multihost)?;
    log::debug!("Volume {} mapped to host {} at LUN {}", volume, host, lun);
    Ok(lun)
}

/// Remove a volume's mapping
///
/// Without a host the volume's current mapping decides which host is
/// affected. Returns that host, or `None` when no mapping was removed.
pub fn unmap_volume_from_host<C: StorageController + ?Sized>(
    controller: &C,
    volume: &str,
    host: Option<&str>,
) -> DriverResult<Option<String>> {
    let affected = controller.unmap_volume_from_host(volume, host)?;
    match &affected {
        Some(host) => log::debug!("Volume {} unmapped from host {}", volume, host),
        None => log::debug!("Volume {} had no mapping to remove", volume),
    }
    Ok(affected)
}

pub fn count_remaining_mappings<C: StorageController + ?Sized>(
    controller: &C,
    host: &str,
) -> DriverResult<usize> {
    Ok(controller.mapped_volumes(host)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Connector;
    use crate::controller::VolumeAttributes;
    use crate::error::DriverError;
    use crate::memory::InMemoryController;

    fn setup() -> (InMemoryController, String, String) {
        let controller = InMemoryController::new()
            .with_volume(VolumeAttributes::new("volume-1", "1", "0"))
            .with_volume(VolumeAttributes::new("volume-2", "1", "0"));
        let a = controller.create_host(&Connector::new("iqn.a")).unwrap();
        let b = controller.create_host(&Connector::new("iqn.b")).unwrap();
        (controller, a, b)
    }

    #[test]
    fn test_map_is_idempotent_for_same_host() {
        let (controller, a, _) = setup();
        let lun = map_volume_to_host(&controller, "volume-1", &a, false).unwrap();
        assert_eq!(map_volume_to_host(&controller, "volume-1", &a, false).unwrap(), lun);
        assert_eq!(count_remaining_mappings(&controller, &a).unwrap(), 1);
    }

    #[test]
    fn test_multimap_refused_when_disabled() {
        let (controller, a, b) = setup();
        map_volume_to_host(&controller, "volume-1", &a, false).unwrap();
        match map_volume_to_host(&controller, "volume-1", &b, false) {
            Err(DriverError::MultiMapNotAllowed { volume, mapped_host }) => {
                assert_eq!(volume, "volume-1");
                assert_eq!(mapped_host, a);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(count_remaining_mappings(&controller, &b).unwrap(), 0);
    }

    #[test]
    fn test_unmap_infers_host() {
        let (controller, a, _) = setup();
        map_volume_to_host(&controller, "volume-1", &a, true).unwrap();
        map_volume_to_host(&controller, "volume-2", &a, true).unwrap();

        let affected = unmap_volume_from_host(&controller, "volume-1", None).unwrap();
        assert_eq!(affected.as_deref(), Some(a.as_str()));
        assert_eq!(count_remaining_mappings(&controller, &a).unwrap(), 1);

        assert_eq!(unmap_volume_from_host(&controller, "volume-1", None).unwrap(), None);
    }
}
