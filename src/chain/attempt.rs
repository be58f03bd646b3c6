//! One profile's connection attempt
//!
//! An attempt resolves the profile's secret once, then runs up to
//! `max_retries` launches. Each launch gets a freshly allocated interface
//! name, a freshly generated OTP and a freshly written credential file.
//!
//! ```text
//! Init -> CredentialWritten -> ProcessLaunched -> StreamingOutput
//!                                                   |-> Succeeded
//!                                                   |-> Retrying -> CredentialWritten ...
//!                                                   '-> Failed
//! ```
//!
//! The credential file never outlives the launch it was written for.

use super::{BackoffPolicy, Host};
use crate::config::Settings;
use crate::openvpn::{is_success_marker, Invocation, LaunchError};
use crate::otp::{OtpError, OtpGenerator};
use crate::platform::PlatformError;
use crate::profile::{is_plain_name, Profile};
use crate::secret::{Secret, SecretError};
use crate::vpn::{CredentialFile, Diagnostics, InterfaceAllocator, InterfaceHandle};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("Connection file not found: {0}")]
    MissingProfileArtifact(PathBuf),
    #[error("Profile name '{0}' is not a plain file name")]
    InvalidProfileName(String),
    #[error("No Username configured")]
    MissingUsername,
    #[error("Secret unavailable: {0}")]
    SecretUnavailable(#[from] SecretError),
    #[error("OTP generation failed: {0}")]
    Otp(#[from] OtpError),
    #[error("OTP is stale ({age_secs}s old)")]
    OtpStale { age_secs: u64 },
    #[error("No free interface in {prefix}{start}..{prefix}{end}")]
    InterfaceExhausted {
        prefix: String,
        start: usize,
        end: usize,
    },
    #[error("Interface lookup failed: {0}")]
    InterfaceLookup(#[from] PlatformError),
    #[error("Failed to write credential file {path}: {source}")]
    CredentialWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to launch VPN client: {0}")]
    ProcessLaunch(#[from] LaunchError),
    #[error("No connection after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Init,
    CredentialWritten,
    ProcessLaunched,
    StreamingOutput,
    Retrying,
    Succeeded,
    Failed,
}

/// Result of one profile's attempt, as seen by the chain
#[derive(Debug)]
pub struct AttemptOutcome {
    pub success: bool,
    pub interface: Option<InterfaceHandle>,
    pub diagnostics: Option<Diagnostics>,
    pub error: Option<AttemptError>,
    /// Number of client processes started
    pub launches: u32,
}

struct Connected {
    interface: InterfaceHandle,
    diagnostics: Diagnostics,
}

pub struct ConnectionAttempt<'a> {
    profile: &'a Profile,
    position: usize,
    settings: &'a Settings,
    host: &'a Host,
    otp: OtpGenerator,
    backoff: BackoffPolicy,
    state: AttemptState,
    launches: u32,
}

impl<'a> ConnectionAttempt<'a> {
    /// `position` is the profile's index in the chain; it is also where the
    /// interface scan starts
    pub fn new(
        profile: &'a Profile,
        position: usize,
        settings: &'a Settings,
        host: &'a Host,
    ) -> Self {
        Self {
            profile,
            position,
            settings,
            host,
            otp: OtpGenerator::from_config(&settings.otp),
            backoff: BackoffPolicy::from_config(&settings.chain),
            state: AttemptState::Init,
            launches: 0,
        }
    }

    pub fn run(mut self) -> AttemptOutcome {
        let span = info_span!("profile", name = %self.profile.name);
        let _entered = span.enter();

        info!("Connecting (order {})", self.profile.order);

        match self.execute() {
            Ok(connected) => {
                self.transition(AttemptState::Succeeded);
                info!("VPN connected on {}", connected.interface);
                AttemptOutcome {
                    success: true,
                    interface: Some(connected.interface),
                    diagnostics: Some(connected.diagnostics),
                    error: None,
                    launches: self.launches,
                }
            }
            Err(e) => {
                self.transition(AttemptState::Failed);
                error!("VPN failed: {}", e);
                AttemptOutcome {
                    success: false,
                    interface: None,
                    diagnostics: None,
                    error: Some(e),
                    launches: self.launches,
                }
            }
        }
    }

    fn transition(&mut self, next: AttemptState) {
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn execute(&mut self) -> Result<Connected, AttemptError> {
        let profile = self.profile;
        // The name becomes the credential file name under secret_dir
        if !is_plain_name(&profile.name) {
            return Err(AttemptError::InvalidProfileName(profile.name.clone()));
        }
        if !profile.connection_file.exists() {
            return Err(AttemptError::MissingProfileArtifact(
                profile.connection_file.clone(),
            ));
        }
        let username = profile
            .username
            .as_deref()
            .ok_or(AttemptError::MissingUsername)?;
        let secret = self.host.secrets.resolve(&profile.secret)?;

        let max_retries = self.settings.chain.max_retries;

        for attempt in 1..=max_retries {
            info!("Attempt {}/{}", attempt, max_retries);

            let interface = self.allocate_interface()?;
            let Some(credentials) = self.write_credentials(&secret, username)? else {
                continue;
            };
            self.transition(AttemptState::CredentialWritten);

            if self.launch_and_watch(&interface, &credentials)? {
                if let Err(e) = credentials.remove() {
                    warn!("Failed to remove credential file: {}", e);
                }
                let diagnostics =
                    Diagnostics::capture(self.host.network.as_ref(), interface.name());
                diagnostics.log();
                return Ok(Connected {
                    interface,
                    diagnostics,
                });
            }

            drop(credentials);
            warn!("No connection marker from {}", interface);

            if attempt < max_retries {
                self.transition(AttemptState::Retrying);
                let delay = self.backoff.next_delay(attempt);
                info!("Retrying in {}s", delay.as_secs_f64());
                self.host.clock.sleep(delay);
            }
        }

        Err(AttemptError::RetriesExhausted {
            attempts: max_retries,
        })
    }

    fn allocate_interface(&self) -> Result<InterfaceHandle, AttemptError> {
        let chain = &self.settings.chain;
        let allocator = InterfaceAllocator::new(
            self.host.network.as_ref(),
            &chain.interface_prefix,
            chain.interface_window,
        );

        let handle = allocator
            .allocate(self.position)?
            .ok_or_else(|| AttemptError::InterfaceExhausted {
                prefix: chain.interface_prefix.clone(),
                start: self.position,
                end: self.position + chain.interface_window,
            })?;
        debug!("Using interface {} (index {})", handle, handle.index());
        Ok(handle)
    }

    /// Generate an OTP and write it out, unless it went stale on the way.
    /// `Ok(None)` means this iteration is skipped.
    fn write_credentials(
        &self,
        secret: &Secret,
        username: &str,
    ) -> Result<Option<CredentialFile>, AttemptError> {
        let chain = &self.settings.chain;
        let code = self.otp.generate(secret, self.host.clock.now())?;

        let now = self.host.clock.now();
        if !code.is_fresh(now, chain.otp_validity()) {
            let stale = AttemptError::OtpStale {
                age_secs: code.age(now).as_secs(),
            };
            if chain.stop_on_failure {
                return Err(stale);
            }
            warn!("{}, skipping attempt", stale);
            return Ok(None);
        }

        let password = Zeroizing::new(format!("{}{}", self.profile.prefix, code.value));
        let path = CredentialFile::path_for(&self.settings.paths.secret_dir, &self.profile.name);
        CredentialFile::write(path.clone(), username, &password)
            .map(Some)
            .map_err(|source| AttemptError::CredentialWrite { path, source })
    }

    /// Launch the client and read its output until the marker or EOF
    fn launch_and_watch(
        &mut self,
        interface: &InterfaceHandle,
        credentials: &CredentialFile,
    ) -> Result<bool, AttemptError> {
        let settings = self.settings;
        let openvpn = &settings.openvpn;
        let invocation = Invocation {
            config: self.profile.connection_file.clone(),
            auth_file: credentials.path().to_path_buf(),
            device: interface.name().to_string(),
            connect_retry: openvpn.connect_retry,
            connect_retry_delay: openvpn.connect_retry_delay,
        };
        info!("{}", invocation.command_line(self.host.client.binary()));

        let mut process = self.host.client.launch(&invocation)?;
        self.launches += 1;
        self.transition(AttemptState::ProcessLaunched);
        self.transition(AttemptState::StreamingOutput);

        while let Some(line) = process.next_line() {
            debug!("{}", line);
            if is_success_marker(&line, &openvpn.success_marker) {
                process.detach();
                return Ok(true);
            }
        }

        process.reap();
        Ok(false)
    }
}
