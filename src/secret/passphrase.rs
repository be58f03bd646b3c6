//! Process-wide passphrase for sealed seeds
//!
//! Resolved once at startup from (in order) an interactive prompt, an
//! environment variable, or the OS keyring.

use crate::config::SecretsConfig;
use std::env;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const KEYRING_SERVICE: &str = "vpn-chain";
const KEYRING_USER: &str = "gpg-passphrase";

#[derive(Error, Debug)]
pub enum PassphraseError {
    #[error("Failed to read passphrase: {0}")]
    Prompt(#[from] std::io::Error),
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("Passphrase must not be empty")]
    Empty,
}

#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(value: &str) -> Self {
        Self(Zeroizing::new(value.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// Resolve the passphrase from the configured sources
///
/// Returns `Ok(None)` when no source has one; sealed seeds then fail with
/// `SecretError::MissingPassphrase` at attempt time.
pub fn resolve<F>(
    config: &SecretsConfig,
    ask: bool,
    get_var: F,
) -> Result<Option<Passphrase>, PassphraseError>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    if ask {
        let value = Zeroizing::new(rpassword::prompt_password("gpg passphrase: ")?);
        if value.is_empty() {
            return Err(PassphraseError::Empty);
        }
        return Ok(Some(Passphrase::new(&value)));
    }

    if let Ok(value) = get_var(&config.passphrase_env) {
        let value = Zeroizing::new(value);
        if !value.is_empty() {
            debug!("Passphrase taken from ${}", config.passphrase_env);
            return Ok(Some(Passphrase::new(&value)));
        }
    }

    if config.use_keyring {
        match load_from_keyring() {
            Ok(found) => return Ok(found),
            Err(e) => warn!("Keyring lookup failed: {}", e),
        }
    }

    Ok(None)
}

fn load_from_keyring() -> Result<Option<Passphrase>, PassphraseError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    match entry.get_password() {
        Ok(value) => {
            let value = Zeroizing::new(value);
            debug!("Passphrase taken from keyring");
            Ok(Some(Passphrase::new(&value)))
        }
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Prompt for the passphrase and store it in the OS keyring
pub fn store_in_keyring() -> Result<(), PassphraseError> {
    let value = Zeroizing::new(rpassword::prompt_password("gpg passphrase to store: ")?);
    if value.is_empty() {
        return Err(PassphraseError::Empty);
    }
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry.set_password(&value)?;
    Ok(())
}
