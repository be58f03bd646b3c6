//! OTP seed resolution
//!
//! A profile references its seed in one of three ways: inline, as an
//! `otpauth://` enrollment URI, or as a file. Files ending in `.gpg` are
//! sealed and decrypted through an external [`Decryptor`]; other files hold
//! the seed in plain text.
//!
//! Seeds are held in [`Secret`], which zeroizes its buffer on drop and never
//! prints its contents.

pub mod gpg;
pub mod passphrase;

pub use gpg::GpgDecryptor;
pub use passphrase::Passphrase;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Secret file not found: {0}")]
    NotFound(PathBuf),
    #[error("No passphrase configured for sealed secret")]
    MissingPassphrase,
    #[error("Failed to run decryptor: {0}")]
    Launch(#[source] io::Error),
    #[error("Decryption failed ({status}): {stderr}")]
    Decryption { status: String, stderr: String },
    #[error("Invalid otpauth URI: {0}")]
    InvalidUri(String),
    #[error("Seed is not valid base32")]
    InvalidSeed,
    #[error("Failed to read secret: {0}")]
    Io(#[from] io::Error),
}

/// Where a profile's seed lives
#[derive(Clone, PartialEq, Eq)]
pub enum SecretRef {
    Inline(String),
    OtpAuthUri(String),
    File(PathBuf),
}

impl fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretRef::Inline(_) => f.write_str("Inline(<redacted>)"),
            SecretRef::OtpAuthUri(_) => f.write_str("OtpAuthUri(<redacted>)"),
            SecretRef::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// A decrypted base32 OTP seed
pub struct Secret {
    seed: Zeroizing<String>,
}

impl Secret {
    /// Validate and wrap a base32 seed
    pub fn new(seed: &str) -> Result<Self, SecretError> {
        let seed = Zeroizing::new(seed.trim().to_string());
        match crate::otp::decode_seed(&seed) {
            Some(bytes) if !bytes.is_empty() => Ok(Self { seed }),
            _ => Err(SecretError::InvalidSeed),
        }
    }

    pub fn expose(&self) -> &str {
        &self.seed
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Resolves a [`SecretRef`] into a usable seed
pub trait SecretSource: Send + Sync {
    fn resolve(&self, reference: &SecretRef) -> Result<Secret, SecretError>;
}

/// External decryption capability for sealed seed files
pub trait Decryptor: Send + Sync {
    fn decrypt(
        &self,
        path: &Path,
        passphrase: &Passphrase,
    ) -> Result<Zeroizing<String>, SecretError>;
}

pub struct SecretProvider<D = GpgDecryptor> {
    decryptor: D,
    passphrase: Option<Passphrase>,
}

impl<D: Decryptor> SecretProvider<D> {
    pub fn new(decryptor: D, passphrase: Option<Passphrase>) -> Self {
        Self {
            decryptor,
            passphrase,
        }
    }

    fn read_file(&self, path: &Path) -> Result<Secret, SecretError> {
        if !path.exists() {
            return Err(SecretError::NotFound(path.to_path_buf()));
        }

        if is_sealed(path) {
            let passphrase = self
                .passphrase
                .as_ref()
                .ok_or(SecretError::MissingPassphrase)?;
            let plain = self.decryptor.decrypt(path, passphrase)?;
            info!("Secret decrypted: {}", path.display());
            return Secret::new(&plain);
        }

        debug!("Reading plaintext secret: {}", path.display());
        let content = Zeroizing::new(std::fs::read_to_string(path)?);
        Secret::new(&content)
    }
}

impl<D: Decryptor> SecretSource for SecretProvider<D> {
    fn resolve(&self, reference: &SecretRef) -> Result<Secret, SecretError> {
        match reference {
            SecretRef::Inline(seed) => Secret::new(seed),
            SecretRef::OtpAuthUri(uri) => {
                let seed = seed_from_otpauth(uri)?;
                Secret::new(&seed)
            }
            SecretRef::File(path) => self.read_file(path),
        }
    }
}

/// Sealed blobs are recognized by their `.gpg` extension
pub fn is_sealed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gpg")
}

/// Extract the `secret` parameter from an `otpauth://` enrollment URI
pub fn seed_from_otpauth(uri: &str) -> Result<Zeroizing<String>, SecretError> {
    let parsed =
        url::Url::parse(uri.trim()).map_err(|e| SecretError::InvalidUri(e.to_string()))?;

    if parsed.scheme() != "otpauth" {
        return Err(SecretError::InvalidUri(format!(
            "unexpected scheme '{}'",
            parsed.scheme()
        )));
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "secret")
        .map(|(_, value)| Zeroizing::new(value.into_owned()))
        .ok_or_else(|| SecretError::InvalidUri("missing secret parameter".to_string()))
}
