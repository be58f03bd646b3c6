//! External VPN client integration
//!
//! The VPN protocol itself is handled by an `openvpn` process. We launch it
//! with the profile's connection file, the credential file and an assigned
//! device name, then read its combined stdout/stderr line by line.
//!
//! # Success detection
//!
//! There is no protocol-level acknowledgment. A tunnel counts as up when the
//! client prints [`SUCCESS_MARKER`] (configurable per deployment). This
//! textual contract is the most fragile dependency of the whole chain, so it
//! lives in exactly one place: [`is_success_marker`].

pub mod process;

pub use process::OpenVpnClient;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Line printed by OpenVPN once the tunnel is configured
pub const SUCCESS_MARKER: &str = "Initialization Sequence Completed";

/// Does this output line signal an established tunnel?
pub fn is_success_marker(line: &str, marker: &str) -> bool {
    !marker.is_empty() && line.contains(marker)
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to create output pipe: {0}")]
    Pipe(String),
}

/// Arguments for one client launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config: PathBuf,
    pub auth_file: PathBuf,
    pub device: String,
    pub connect_retry: u32,
    pub connect_retry_delay: u32,
}

impl Invocation {
    pub fn args(&self) -> Vec<String> {
        vec![
            "--config".to_string(),
            self.config.display().to_string(),
            "--auth-user-pass".to_string(),
            self.auth_file.display().to_string(),
            "--dev".to_string(),
            self.device.clone(),
            "--connect-retry-max".to_string(),
            self.connect_retry.to_string(),
            "--connect-retry".to_string(),
            self.connect_retry_delay.to_string(),
        ]
    }

    /// Printable command line for the event log
    pub fn command_line(&self, binary: &str) -> String {
        std::iter::once(binary.to_string())
            .chain(self.args())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A running client whose output is being consumed
pub trait ClientProcess: Send {
    /// Next line of combined output; `None` once the stream has ended
    fn next_line(&mut self) -> Option<String>;

    /// Leave the client running after the tunnel is up
    fn detach(self: Box<Self>);

    /// Collect the exit status of a client whose output has ended
    fn reap(self: Box<Self>);
}

pub trait VpnClient: Send + Sync {
    fn launch(&self, invocation: &Invocation) -> Result<Box<dyn ClientProcess>, LaunchError>;

    /// Program name, for logging
    fn binary(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> Invocation {
        Invocation {
            config: PathBuf::from("/vpn/vpn/office.ovpn"),
            auth_file: PathBuf::from("/vpn/secrets/office.auth"),
            device: "tun0".to_string(),
            connect_retry: 1,
            connect_retry_delay: 2,
        }
    }

    #[test]
    fn test_success_marker() {
        assert!(is_success_marker(
            "2024-05-01 10:00:00 Initialization Sequence Completed",
            SUCCESS_MARKER
        ));
        assert!(!is_success_marker(
            "2024-05-01 10:00:00 AUTH_FAILED",
            SUCCESS_MARKER
        ));
        assert!(!is_success_marker(
            "initialization sequence completed",
            SUCCESS_MARKER
        ));
        assert!(!is_success_marker("anything", ""));
    }

    #[test]
    fn test_custom_marker() {
        assert!(is_success_marker("Tunnel is up", "Tunnel is up"));
    }

    #[test]
    fn test_invocation_args() {
        let args = invocation().args();
        assert_eq!(
            args,
            vec![
                "--config",
                "/vpn/vpn/office.ovpn",
                "--auth-user-pass",
                "/vpn/secrets/office.auth",
                "--dev",
                "tun0",
                "--connect-retry-max",
                "1",
                "--connect-retry",
                "2",
            ]
        );
    }

    #[test]
    fn test_command_line() {
        let line = invocation().command_line("openvpn");
        assert!(line.starts_with("openvpn --config /vpn/vpn/office.ovpn"));
        assert!(line.ends_with("--connect-retry 2"));
    }
}
