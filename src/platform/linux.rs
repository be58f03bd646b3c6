//! Linux network inspection via iproute2

use super::{host_interface_names, run_query, NetworkInspector, PlatformError};

pub struct LinuxNetworkInspector;

impl LinuxNetworkInspector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxNetworkInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkInspector for LinuxNetworkInspector {
    fn interface_names(&self) -> Result<Vec<String>, PlatformError> {
        host_interface_names()
    }

    fn routes(&self) -> Result<String, PlatformError> {
        run_query("ip", &["route"])
    }

    fn rules(&self) -> Result<String, PlatformError> {
        run_query("ip", &["rule"])
    }

    fn interface_state(&self, name: &str) -> Result<String, PlatformError> {
        run_query("ip", &["addr", "show", "dev", name])
    }
}
