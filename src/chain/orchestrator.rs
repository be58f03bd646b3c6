//! Ordered execution of profiles with the stop-on-failure policy

use super::{AttemptOutcome, ConnectionAttempt, Host};
use crate::config::Settings;
use crate::profile::{load_profiles, Profile};
use crate::vpn::hosts::inject_extra_hosts;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("No usable VPN profiles")]
    NoProfiles,
}

#[derive(Debug)]
pub struct ChainEntry {
    pub profile: Profile,
    pub outcome: AttemptOutcome,
}

/// Outcomes of the profiles that were attempted, in chain order
#[derive(Debug, Default)]
pub struct ChainResult {
    pub entries: Vec<ChainEntry>,
    /// A failure halted the chain before every profile was attempted
    pub stopped_early: bool,
}

impl ChainResult {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.success).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    /// Every attempted profile came up
    pub fn all_succeeded(&self) -> bool {
        !self.entries.is_empty() && self.failed() == 0
    }
}

/// Load the profiles, then update the hosts file. Nothing on the host is
/// touched when no profile is usable.
pub fn prepare_run(settings: &Settings) -> Result<Vec<Profile>, ChainError> {
    let paths = &settings.paths;
    let profiles = load_profiles(&paths.profiles, paths);
    if profiles.is_empty() {
        error!("No VPN profiles found in {}", paths.profiles.display());
        return Err(ChainError::NoProfiles);
    }

    inject_extra_hosts(&paths.extra_hosts, &paths.hosts_file);
    Ok(profiles)
}

/// Diagnostic hook run after a fully successful chain
pub trait PostCheck: Send + Sync {
    fn run(&self);
}

/// Source of the host's current public address
pub trait PublicIpLookup: Send + Sync {
    /// `None` when the address cannot be determined
    fn public_ip(&self) -> Option<String>;
}

pub struct Chain<'a> {
    settings: &'a Settings,
    host: &'a Host,
    post_check: Option<&'a dyn PostCheck>,
    ip_lookup: Option<&'a dyn PublicIpLookup>,
}

impl<'a> Chain<'a> {
    pub fn new(settings: &'a Settings, host: &'a Host) -> Self {
        Self {
            settings,
            host,
            post_check: None,
            ip_lookup: None,
        }
    }

    pub fn with_post_check(mut self, check: &'a dyn PostCheck) -> Self {
        self.post_check = Some(check);
        self
    }

    pub fn with_ip_lookup(mut self, lookup: &'a dyn PublicIpLookup) -> Self {
        self.ip_lookup = Some(lookup);
        self
    }

    fn active_ip_lookup(&self) -> Option<&'a dyn PublicIpLookup> {
        self.ip_lookup.filter(|_| self.settings.chain.public_ip_check)
    }

    fn initial_ip(&self) -> Option<String> {
        let ip = self.active_ip_lookup()?.public_ip();
        match &ip {
            Some(ip) => info!("Public IP before connecting: {}", ip),
            None => warn!("Public IP unavailable before connecting"),
        }
        ip
    }

    /// Log the address after `profile` came up and flag an unchanged one
    fn report_ip(&self, profile: &Profile, initial: Option<&str>) {
        let Some(lookup) = self.active_ip_lookup() else {
            return;
        };
        match lookup.public_ip() {
            Some(ip) if initial == Some(ip.as_str()) => warn!(
                "[{}] Public IP unchanged ({}), the tunnel may not be carrying traffic",
                profile.name, ip
            ),
            Some(ip) => info!("[{}] Public IP after connecting: {}", profile.name, ip),
            None => warn!("[{}] Public IP unavailable after connecting", profile.name),
        }
    }

    pub fn run(&self, profiles: &[Profile]) -> Result<ChainResult, ChainError> {
        if profiles.is_empty() {
            error!("No VPN profiles to connect");
            return Err(ChainError::NoProfiles);
        }

        let chain = &self.settings.chain;
        let mut result = ChainResult::default();
        let initial_ip = self.initial_ip();

        for (position, profile) in profiles.iter().enumerate() {
            let outcome =
                ConnectionAttempt::new(profile, position, self.settings, self.host).run();
            let failed = !outcome.success;
            if !failed {
                self.report_ip(profile, initial_ip.as_deref());
            }
            result.entries.push(ChainEntry {
                profile: profile.clone(),
                outcome,
            });

            if failed && chain.stop_on_failure {
                let skipped = profiles.len() - position - 1;
                if skipped > 0 {
                    warn!("Stopping chain, {} profile(s) not attempted", skipped);
                    result.stopped_early = true;
                }
                break;
            }

            if position + 1 < profiles.len() {
                info!("Waiting {}s before next VPN", chain.connect_delay_secs);
                self.host.clock.sleep(chain.connect_delay());
            }
        }

        info!(
            "Chain finished: {}/{} connected",
            result.succeeded(),
            profiles.len()
        );

        if chain.post_check && result.all_succeeded() {
            if let Some(check) = self.post_check {
                info!("Running reachability checks");
                check.run();
            }
        }

        Ok(result)
    }
}
