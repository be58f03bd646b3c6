//! Time-based one-time passwords (RFC 6238, HMAC-SHA1)
//!
//! The generator only stamps each code with its generation time. Whether a
//! code is still usable is decided by the caller right before it is written
//! out, because slow file I/O or process startup can push a code past its
//! time step.

use crate::config::OtpConfig;
use crate::secret::Secret;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Error, Debug)]
pub enum OtpError {
    #[error("Seed is not valid base32")]
    InvalidSeed,
    #[error("Clock is before the unix epoch")]
    ClockBeforeEpoch,
    #[error("Unsupported digit count: {0}")]
    InvalidDigits(u32),
}

/// A generated code and the moment it was generated
#[derive(Clone, PartialEq, Eq)]
pub struct OtpCode {
    pub value: String,
    pub generated_at: SystemTime,
}

impl OtpCode {
    /// Elapsed time since generation; zero if the clock went backwards
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.generated_at).unwrap_or_default()
    }

    pub fn is_fresh(&self, now: SystemTime, validity: Duration) -> bool {
        self.age(now) <= validity
    }
}

impl Drop for OtpCode {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

impl std::fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpCode")
            .field("value", &"<redacted>")
            .field("generated_at", &self.generated_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OtpGenerator {
    digits: u32,
    period: u64,
}

impl OtpGenerator {
    pub fn new(digits: u32, period_secs: u64) -> Self {
        Self {
            digits,
            period: period_secs.max(1),
        }
    }

    pub fn from_config(config: &OtpConfig) -> Self {
        Self::new(config.digits, config.period_secs)
    }

    /// Generate the code for the time step containing `now`
    pub fn generate(&self, secret: &Secret, now: SystemTime) -> Result<OtpCode, OtpError> {
        if !(6..=9).contains(&self.digits) {
            return Err(OtpError::InvalidDigits(self.digits));
        }

        let key = decode_seed(secret.expose()).ok_or(OtpError::InvalidSeed)?;
        let unix = now
            .duration_since(UNIX_EPOCH)
            .map_err(|_| OtpError::ClockBeforeEpoch)?
            .as_secs();

        Ok(OtpCode {
            value: hotp(&key, unix / self.period, self.digits),
            generated_at: now,
        })
    }
}

impl Default for OtpGenerator {
    fn default() -> Self {
        Self::new(6, 30)
    }
}

/// Decode a base32 seed, tolerating lowercase, spaces and `=` padding
pub fn decode_seed(seed: &str) -> Option<Vec<u8>> {
    let normalised: String = seed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalised.is_empty() {
        return None;
    }

    base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &normalised)
}

/// HOTP value for `counter` (RFC 4226 dynamic truncation)
fn hotp(key: &[u8], counter: u64, digits: u32) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    let code = binary % 10u32.pow(digits);
    format!("{:0>width$}", code, width = digits as usize)
}
