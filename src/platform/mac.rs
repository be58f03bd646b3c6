//! macOS network inspection

use super::{host_interface_names, run_query, NetworkInspector, PlatformError};

pub struct MacNetworkInspector;

impl MacNetworkInspector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacNetworkInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkInspector for MacNetworkInspector {
    fn interface_names(&self) -> Result<Vec<String>, PlatformError> {
        host_interface_names()
    }

    fn routes(&self) -> Result<String, PlatformError> {
        run_query("netstat", &["-rn"])
    }

    // No policy routing on macOS
    fn rules(&self) -> Result<String, PlatformError> {
        Ok(String::new())
    }

    fn interface_state(&self, name: &str) -> Result<String, PlatformError> {
        run_query("ifconfig", &[name])
    }
}
