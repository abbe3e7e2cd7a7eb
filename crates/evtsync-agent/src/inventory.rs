//! Devices the aggregator told this plugin about at startup.

use dashmap::DashMap;
use evtsync_core::DeviceData;

/// In-memory device inventory keyed by aggregator UUID.
#[derive(Debug, Default)]
pub struct DeviceInventory {
    devices: DashMap<String, DeviceData>,
}

impl DeviceInventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a startup entry's `add`/`del` operation.
    ///
    /// Other operations leave the inventory unchanged.
    pub fn apply(&self, uuid: &str, device: &DeviceData) {
        match device.operation.as_str() {
            "add" => {
                self.devices.insert(uuid.to_string(), device.clone());
            }
            "del" => {
                self.devices.remove(uuid);
            }
            other => {
                tracing::debug!(uuid, operation = other, "Ignoring inventory operation");
            }
        }
    }

    /// Look up a device.
    #[must_use]
    pub fn get(&self, uuid: &str) -> Option<DeviceData> {
        self.devices.get(uuid).map(|entry| entry.value().clone())
    }

    /// Number of devices held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the inventory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(operation: &str) -> DeviceData {
        DeviceData {
            address: "10.0.0.5".to_string(),
            operation: operation.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn add_then_del() {
        let inventory = DeviceInventory::new();
        inventory.apply("uuid-1", &entry("add"));
        assert_eq!(inventory.get("uuid-1").unwrap().address, "10.0.0.5");

        inventory.apply("uuid-1", &entry("del"));
        assert!(inventory.is_empty());
    }

    #[test]
    fn unknown_operation_is_ignored() {
        let inventory = DeviceInventory::new();
        inventory.apply("uuid-1", &entry("update"));
        assert_eq!(inventory.len(), 0);
    }
}
