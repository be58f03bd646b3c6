//! In-memory stand-ins for the host-facing traits

use crate::chain::{Clock, Host};
use crate::config::Settings;
use crate::openvpn::{ClientProcess, Invocation, LaunchError, VpnClient};
use crate::platform::{NetworkInspector, PlatformError};
use crate::profile::Profile;
use crate::secret::{GpgDecryptor, SecretProvider, SecretRef};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

pub(crate) const SEED: &str = "JBSWY3DPEHPK3PXP";

/// Defaults with every path inside `dir`
pub(crate) fn settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.paths.profile_dir = dir.path().join("vpn");
    settings.paths.secret_dir = dir.path().join("secrets");
    settings.paths.targets_file = dir.path().join("targets.txt");
    settings.paths.extra_hosts = dir.path().join("extra_hosts.txt");
    settings.paths.hosts_file = dir.path().join("hosts");
    std::fs::create_dir_all(&settings.paths.profile_dir).unwrap();
    std::fs::create_dir_all(&settings.paths.secret_dir).unwrap();
    settings
}

/// Profile with an inline seed and an existing connection file
pub(crate) fn profile(dir: &TempDir, name: &str, order: i64) -> Profile {
    let connection_file = dir.path().join("vpn").join(format!("{}.ovpn", name));
    std::fs::create_dir_all(dir.path().join("vpn")).unwrap();
    std::fs::write(&connection_file, "client\nremote vpn.example.com 1194\n").unwrap();

    Profile {
        name: name.to_string(),
        order,
        username: Some("alice".to_string()),
        prefix: "pin".to_string(),
        secret: SecretRef::Inline(SEED.to_string()),
        connection_file,
    }
}

pub(crate) fn host(client: ScriptedClient, inspector: FakeInspector, clock: FakeClock) -> Host {
    Host {
        secrets: Arc::new(SecretProvider::new(GpgDecryptor::default(), None)),
        network: Arc::new(inspector),
        client: Arc::new(client),
        clock: Arc::new(clock),
    }
}

pub(crate) struct FakeInspector {
    interfaces: Vec<String>,
    failing: bool,
}

impl FakeInspector {
    pub fn with_interfaces(names: &[&str]) -> Self {
        Self {
            interfaces: names.iter().map(|n| n.to_string()).collect(),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            interfaces: Vec::new(),
            failing: true,
        }
    }

    fn check(&self, command: &str) -> Result<(), PlatformError> {
        if self.failing {
            return Err(PlatformError::Query {
                command: command.to_string(),
                message: "not available".to_string(),
            });
        }
        Ok(())
    }
}

impl NetworkInspector for FakeInspector {
    fn interface_names(&self) -> Result<Vec<String>, PlatformError> {
        if self.failing {
            return Err(PlatformError::InterfaceEnum("not available".to_string()));
        }
        Ok(self.interfaces.clone())
    }

    fn routes(&self) -> Result<String, PlatformError> {
        self.check("ip route")?;
        Ok("default via 192.0.2.1 dev eth0".to_string())
    }

    fn rules(&self) -> Result<String, PlatformError> {
        self.check("ip rule")?;
        Ok("0:\tfrom all lookup local".to_string())
    }

    fn interface_state(&self, name: &str) -> Result<String, PlatformError> {
        self.check("ip addr")?;
        Ok(format!("7: {}: <POINTOPOINT,UP> mtu 1500", name))
    }
}

pub(crate) fn epoch(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// Manual clock: `sleep` advances time instead of blocking, and every
/// `now()` call can optionally advance it by a fixed step
pub(crate) struct FakeClock {
    now: Mutex<SystemTime>,
    step: Duration,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn at(secs: u64) -> Self {
        Self::stepping(secs, Duration::ZERO)
    }

    pub fn stepping(secs: u64, step: Duration) -> Self {
        Self {
            now: Mutex::new(epoch(secs)),
            step,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        let mut now = self.now.lock().unwrap();
        let current = *now;
        *now += self.step;
        current
    }

    fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// What the fake client saw at launch time
#[derive(Debug, Clone)]
pub(crate) struct LaunchRecord {
    pub invocation: Invocation,
    /// Content of the credential file while the client was starting
    pub credentials: Option<String>,
}

#[derive(Default)]
pub(crate) struct ClientLog {
    pub launches: Vec<LaunchRecord>,
    pub detached: usize,
    pub reaped: usize,
}

/// Client that replays fixed output per connection file
#[derive(Clone, Default)]
pub(crate) struct ScriptedClient {
    scripts: HashMap<PathBuf, Vec<String>>,
    refuse_launch: bool,
    log: Arc<Mutex<ClientLog>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch of `config` prints `lines`
    pub fn script(mut self, config: impl Into<PathBuf>, lines: &[&str]) -> Self {
        self.scripts.insert(
            config.into(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    pub fn refusing() -> Self {
        Self {
            refuse_launch: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> Arc<Mutex<ClientLog>> {
        Arc::clone(&self.log)
    }
}

impl VpnClient for ScriptedClient {
    fn launch(&self, invocation: &Invocation) -> Result<Box<dyn ClientProcess>, LaunchError> {
        if self.refuse_launch {
            return Err(LaunchError::Spawn {
                binary: "openvpn".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        self.log.lock().unwrap().launches.push(LaunchRecord {
            invocation: invocation.clone(),
            credentials: std::fs::read_to_string(&invocation.auth_file).ok(),
        });

        let lines = self
            .scripts
            .get(&invocation.config)
            .cloned()
            .unwrap_or_else(|| vec!["TLS Error: handshake failed".to_string()]);

        Ok(Box::new(ScriptedProcess {
            lines: lines.into(),
            log: Arc::clone(&self.log),
        }))
    }

    fn binary(&self) -> &str {
        "openvpn"
    }
}

struct ScriptedProcess {
    lines: VecDeque<String>,
    log: Arc<Mutex<ClientLog>>,
}

impl ClientProcess for ScriptedProcess {
    fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    fn detach(self: Box<Self>) {
        self.log.lock().unwrap().detached += 1;
    }

    fn reap(self: Box<Self>) {
        self.log.lock().unwrap().reaped += 1;
    }
}
