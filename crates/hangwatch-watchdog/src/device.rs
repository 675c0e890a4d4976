//! Device stacks.
//!
//! Devices are plain identifiers. The registry records which device sits
//! directly below another so a watchdog's owning device can be resolved to
//! the bottom of its stack.

use std::collections::{HashMap, HashSet};

use hangwatch_report::DeviceId;
use parking_lot::RwLock;

/// Maps each device to the device directly below it.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    lower: RwLock<HashMap<DeviceId, DeviceId>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `device` is stacked on top of `lower`.
    ///
    /// Returns the previous lower device, if any.
    pub fn attach(&self, device: DeviceId, lower: DeviceId) -> Option<DeviceId> {
        tracing::debug!(%device, %lower, "device attached");
        self.lower.write().insert(device, lower)
    }

    /// Remove `device` from the stack it sits on.
    pub fn detach(&self, device: DeviceId) -> Option<DeviceId> {
        self.lower.write().remove(&device)
    }

    /// Device directly below `device`.
    #[must_use]
    pub fn lower_device(&self, device: DeviceId) -> Option<DeviceId> {
        self.lower.read().get(&device).copied()
    }

    /// Bottom of the stack containing `device`.
    ///
    /// A device with nothing below it is its own lowest device. Walking stops
    /// at the first repeated device if the recorded links form a cycle.
    #[must_use]
    pub fn lowest_device(&self, device: DeviceId) -> DeviceId {
        let lower = self.lower.read();
        let mut visited = HashSet::new();
        let mut current = device;
        visited.insert(current);
        while let Some(&next) = lower.get(&current) {
            if !visited.insert(next) {
                tracing::warn!(%device, %next, "device stack contains a cycle");
                break;
            }
            current = next;
        }
        current
    }

    /// Number of recorded links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lower.read().len()
    }

    /// Whether no links are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lower.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_device_walks_stack() {
        let registry = DeviceRegistry::new();
        let (top, mid, bottom) = (DeviceId::new(3), DeviceId::new(2), DeviceId::new(1));
        registry.attach(top, mid);
        registry.attach(mid, bottom);

        assert_eq!(registry.lowest_device(top), bottom);
        assert_eq!(registry.lowest_device(bottom), bottom);
        assert_eq!(registry.lower_device(top), Some(mid));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_cycle_terminates() {
        let registry = DeviceRegistry::new();
        let (a, b) = (DeviceId::new(10), DeviceId::new(11));
        registry.attach(a, b);
        registry.attach(b, a);
        assert_eq!(registry.lowest_device(a), b);
    }

    #[test]
    fn test_detach() {
        let registry = DeviceRegistry::new();
        registry.attach(DeviceId::new(2), DeviceId::new(1));
        assert_eq!(registry.detach(DeviceId::new(2)), Some(DeviceId::new(1)));
        assert!(registry.is_empty());
        assert_eq!(registry.lowest_device(DeviceId::new(2)), DeviceId::new(2));
    }
}
