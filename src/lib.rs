//! VPN Chain - sequential OpenVPN sessions with TOTP logins
//!
//! Brings up an ordered list of OpenVPN profiles, one after another. Each
//! profile authenticates with a username and a one-time password derived
//! from a stored TOTP seed (gpg-sealed file, plaintext file, inline value or
//! `otpauth://` URI).
//!
//! # Architecture
//!
//! - `config`: Settings file (TOML) and environment overrides
//! - `profile`: Profile descriptors (JSON) and connection order
//! - `secret`: Seed resolution and gpg decryption
//! - `otp`: RFC 6238 code generation
//! - `vpn`: Interface allocation, credential files, diagnostics, hosts file
//! - `openvpn`: Client process launch and success detection
//! - `chain`: Per-profile attempt state machine and the chain itself
//! - `probe`: Post-connection reachability checks
//! - `platform`: Read-only host network queries (macOS, Linux)
//! - `logging`: Console and event-log output
//!
//! # Usage
//!
//! ```bash
//! sudo vpn-chain connect --profiles /vpn/config/vpn.json
//! ```

pub mod chain;
pub mod config;
pub mod logging;
pub mod openvpn;
pub mod otp;
pub mod platform;
pub mod probe;
pub mod profile;
pub mod secret;
pub mod vpn;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{Chain, ChainResult, Host};
pub use config::Settings;
pub use profile::Profile;
