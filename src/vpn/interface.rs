//! Virtual interface name allocation
//!
//! Picks the first `tunN` name not present on the host, scanning a fixed
//! window that starts at the profile's position in the chain. The check is
//! advisory: nothing stops another process from taking the name between the
//! check and the VPN client creating the device.

use crate::platform::{NetworkInspector, PlatformError};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceHandle {
    name: String,
    index: usize,
}

impl InterfaceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for InterfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub struct InterfaceAllocator<'a> {
    inspector: &'a dyn NetworkInspector,
    prefix: &'a str,
    window: usize,
}

impl<'a> InterfaceAllocator<'a> {
    pub fn new(inspector: &'a dyn NetworkInspector, prefix: &'a str, window: usize) -> Self {
        Self {
            inspector,
            prefix,
            window,
        }
    }

    /// First free name in `[start, start + window)`, or `None` if all are taken
    pub fn allocate(&self, start: usize) -> Result<Option<InterfaceHandle>, PlatformError> {
        let taken: HashSet<String> = self.inspector.interface_names()?.into_iter().collect();

        Ok((start..start + self.window)
            .map(|index| InterfaceHandle {
                name: format!("{}{}", self.prefix, index),
                index,
            })
            .find(|candidate| !taken.contains(&candidate.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInspector;

    #[test]
    fn test_first_free_from_start() {
        let inspector = FakeInspector::with_interfaces(&["lo", "eth0"]);
        let allocator = InterfaceAllocator::new(&inspector, "tun", 10);

        let handle = allocator.allocate(0).unwrap().unwrap();
        assert_eq!(handle.name(), "tun0");

        let handle = allocator.allocate(3).unwrap().unwrap();
        assert_eq!(handle.name(), "tun3");
        assert_eq!(handle.index(), 3);
    }

    #[test]
    fn test_skips_busy_names() {
        let inspector = FakeInspector::with_interfaces(&["lo", "tun1", "tun2"]);
        let allocator = InterfaceAllocator::new(&inspector, "tun", 10);

        let handle = allocator.allocate(1).unwrap().unwrap();
        assert_eq!(handle.to_string(), "tun3");
    }

    #[test]
    fn test_exact_match_only() {
        // tun10 being up must not make tun1 look busy
        let inspector = FakeInspector::with_interfaces(&["tun10"]);
        let allocator = InterfaceAllocator::new(&inspector, "tun", 3);

        let handle = allocator.allocate(1).unwrap().unwrap();
        assert_eq!(handle.name(), "tun1");
    }

    #[test]
    fn test_window_exhausted() {
        let inspector = FakeInspector::with_interfaces(&["tun2", "tun3", "tun4"]);
        let allocator = InterfaceAllocator::new(&inspector, "tun", 3);

        assert!(allocator.allocate(2).unwrap().is_none());
        assert_eq!(allocator.allocate(1).unwrap().unwrap().name(), "tun1");
    }

    #[test]
    fn test_enumeration_error() {
        let inspector = FakeInspector::failing();
        let allocator = InterfaceAllocator::new(&inspector, "tun", 3);

        assert!(matches!(
            allocator.allocate(0).unwrap_err(),
            PlatformError::InterfaceEnum(_)
        ));
    }
}
