//! Post-connection routing snapshot

use crate::platform::NetworkInspector;
use tracing::info;

/// Text captured from read-only host queries after a tunnel comes up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub interface: String,
    pub routes: String,
    pub rules: String,
    pub addresses: String,
}

impl Diagnostics {
    /// Run every query; a failed query is recorded in place of its output
    pub fn capture(inspector: &dyn NetworkInspector, interface: &str) -> Self {
        let or_note = |result: Result<String, crate::platform::PlatformError>| {
            result.unwrap_or_else(|e| format!("<unavailable: {}>", e))
        };

        Self {
            interface: interface.to_string(),
            routes: or_note(inspector.routes()),
            rules: or_note(inspector.rules()),
            addresses: or_note(inspector.interface_state(interface)),
        }
    }

    pub fn log(&self) {
        info!("Routes:\n{}", self.routes);
        info!("Rules:\n{}", self.rules);
        info!("Interface {}:\n{}", self.interface, self.addresses);
    }
}
