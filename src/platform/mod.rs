//! Platform-specific host network inspection
//!
//! Everything here is read-only: interface enumeration for the allocator and
//! text snapshots of routing state for post-connection diagnostics.

#[cfg(target_os = "macos")]
pub mod mac;

#[cfg(target_os = "linux")]
pub mod linux;

use std::collections::BTreeSet;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Failed to enumerate interfaces: {0}")]
    InterfaceEnum(String),
    #[error("Query `{command}` failed: {message}")]
    Query { command: String, message: String },
    #[error("Unsupported platform")]
    Unsupported,
}

/// Platform-agnostic view of host network state
pub trait NetworkInspector: Send + Sync {
    /// Names of all interfaces currently present on the host
    fn interface_names(&self) -> Result<Vec<String>, PlatformError>;
    /// Routing table snapshot
    fn routes(&self) -> Result<String, PlatformError>;
    /// Policy-routing rules snapshot
    fn rules(&self) -> Result<String, PlatformError>;
    /// Address state of one interface
    fn interface_state(&self, name: &str) -> Result<String, PlatformError>;
}

/// Get the appropriate network inspector for the current platform
pub fn get_network_inspector() -> Result<Box<dyn NetworkInspector>, PlatformError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(mac::MacNetworkInspector::new()))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxNetworkInspector::new()))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Err(PlatformError::Unsupported)
    }
}

/// Interface names via getifaddrs(3), one entry per interface
pub(crate) fn host_interface_names() -> Result<Vec<String>, PlatformError> {
    let addrs = nix::ifaddrs::getifaddrs()
        .map_err(|e| PlatformError::InterfaceEnum(e.to_string()))?;

    let names: BTreeSet<String> = addrs.map(|ifaddr| ifaddr.interface_name).collect();
    Ok(names.into_iter().collect())
}

/// Run a read-only query command and return its trimmed stdout
pub(crate) fn run_query(program: &str, args: &[&str]) -> Result<String, PlatformError> {
    let command = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| PlatformError::Query {
            command: command.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PlatformError::Query {
            command,
            message: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
