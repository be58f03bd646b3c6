//! Configuration handling for vpn-chain
//!
//! Settings are read once at startup (TOML file, then environment overrides)
//! and passed by reference to every component. Nothing below `main` reads the
//! process environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value for {var}: {value}")]
    InvalidOverride { var: String, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chain: ChainConfig,
    pub paths: PathsConfig,
    pub openvpn: OpenVpnConfig,
    pub otp: OtpConfig,
    pub secrets: SecretsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Launches per profile before giving up
    pub max_retries: u32,
    /// Maximum OTP age (seconds) at the moment credentials are written
    pub otp_validity_secs: u64,
    /// Pause between profiles
    pub connect_delay_secs: u64,
    pub retry_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_secs: u64,
    pub stop_on_failure: bool,
    /// Number of candidate interface names scanned per profile
    pub interface_window: usize,
    pub interface_prefix: String,
    /// Run reachability probes after a fully successful chain
    pub post_check: bool,
    /// Log the public IP before the chain and after each connection
    pub public_ip_check: bool,
    /// Plain-text "what is my IP" endpoint
    pub public_ip_url: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            otp_validity_secs: 30,
            connect_delay_secs: 10,
            retry_backoff_secs: 5,
            backoff_multiplier: 1.0,
            max_backoff_secs: 60,
            stop_on_failure: true,
            interface_window: 10,
            interface_prefix: "tun".to_string(),
            post_check: false,
            public_ip_check: false,
            public_ip_url: "https://ifconfig.me".to_string(),
        }
    }
}

impl ChainConfig {
    pub fn otp_validity(&self) -> Duration {
        Duration::from_secs(self.otp_validity_secs)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_secs(self.connect_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory of per-profile JSON descriptors, or a single JSON list file
    pub profiles: PathBuf,
    /// Directory holding `<name>.ovpn` connection files
    pub profile_dir: PathBuf,
    /// Directory holding sealed seeds and transient `.auth` files
    pub secret_dir: PathBuf,
    pub targets_file: PathBuf,
    pub extra_hosts: PathBuf,
    pub hosts_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            profiles: PathBuf::from("/vpn/config/vpn.json"),
            profile_dir: PathBuf::from("/vpn/vpn"),
            secret_dir: PathBuf::from("/vpn/secrets"),
            targets_file: PathBuf::from("/vpn/config/targets.txt"),
            extra_hosts: PathBuf::from("/vpn/config/extra_hosts.txt"),
            hosts_file: PathBuf::from("/etc/hosts"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenVpnConfig {
    pub binary: String,
    /// Passed through as `--connect-retry-max`
    pub connect_retry: u32,
    /// Passed through as `--connect-retry`
    pub connect_retry_delay: u32,
    /// Output substring that marks an established tunnel
    pub success_marker: String,
}

impl Default for OpenVpnConfig {
    fn default() -> Self {
        Self {
            binary: "openvpn".to_string(),
            connect_retry: 1,
            connect_retry_delay: 2,
            success_marker: crate::openvpn::SUCCESS_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    pub digits: u32,
    pub period_secs: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            digits: 6,
            period_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub gpg_binary: String,
    /// Name of the environment variable holding the gpg passphrase
    pub passphrase_env: String,
    pub use_keyring: bool,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            gpg_binary: "gpg".to_string(),
            passphrase_env: "GPG_PASSPHRASE".to_string(),
            use_keyring: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub fallback_path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("/vpn/logs/connect.log"),
            fallback_path: PathBuf::from("/vpn/logs/fallback.log"),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Locate and load settings, then apply environment overrides
    ///
    /// Lookup order: explicit path, `./vpn-chain.toml`,
    /// `~/.vpn-chain/config.toml`, built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match explicit {
            Some(path) => Self::load(path)?,
            None => match default_locations().into_iter().find(|p| p.exists()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env_overrides(|key| env::var(key))?;
        Ok(settings)
    }

    /// Apply overrides using a custom getter (for testing)
    pub fn apply_env_overrides<F>(&mut self, get_var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        if let Ok(v) = get_var("MAX_RETRIES") {
            self.chain.max_retries = parse_number("MAX_RETRIES", &v)?;
        }
        if let Ok(v) = get_var("OTP_VALIDITY") {
            self.chain.otp_validity_secs = parse_number("OTP_VALIDITY", &v)?;
        }
        if let Ok(v) = get_var("VPN_CONNECT_DELAY") {
            self.chain.connect_delay_secs = parse_number("VPN_CONNECT_DELAY", &v)?;
        }
        if let Ok(v) = get_var("STOP_ON_FAILURE") {
            self.chain.stop_on_failure = parse_flag(&v);
        }
        if let Ok(v) = get_var("PUBLIC_IP_CHECK") {
            self.chain.public_ip_check = parse_flag(&v);
        }
        if let Ok(v) = get_var("OPENVPN_RETRY") {
            self.openvpn.connect_retry = parse_number("OPENVPN_RETRY", &v)?;
        }
        if let Ok(v) = get_var("OPENVPN_RETRY_DELAY") {
            self.openvpn.connect_retry_delay = parse_number("OPENVPN_RETRY_DELAY", &v)?;
        }
        if let Ok(v) = get_var("ENABLE_LOG") {
            self.log.enabled = parse_flag(&v);
        }
        if let Ok(v) = get_var("VPN_CONFIG") {
            self.paths.profiles = PathBuf::from(v);
        }
        if let Ok(v) = get_var("VPN_PROFILE_DIR") {
            self.paths.profile_dir = PathBuf::from(v);
        }
        if let Ok(v) = get_var("VPN_SECRET_DIR") {
            self.paths.secret_dir = PathBuf::from(v);
        }
        if let Ok(v) = get_var("LOG_PATH") {
            self.log.path = PathBuf::from(v);
        }
        if let Ok(v) = get_var("FALLBACK_LOG") {
            self.log.fallback_path = PathBuf::from(v);
        }
        if let Ok(v) = get_var("HOSTS_DIR") {
            self.paths.hosts_file = PathBuf::from(v);
        }
        if let Ok(v) = get_var("EXTRA_HOSTS_CONFIG") {
            self.paths.extra_hosts = PathBuf::from(v);
        }
        Ok(())
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from("vpn-chain.toml")];
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(".vpn-chain").join("config.toml"));
    }
    locations
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true") || value.trim() == "1"
}
