//! Sealed seed decryption through the `gpg` command line

use super::{Decryptor, Passphrase, SecretError};
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;
use zeroize::Zeroizing;

pub struct GpgDecryptor {
    binary: String,
}

impl GpgDecryptor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for GpgDecryptor {
    fn default() -> Self {
        Self::new("gpg")
    }
}

impl Decryptor for GpgDecryptor {
    fn decrypt(
        &self,
        path: &Path,
        passphrase: &Passphrase,
    ) -> Result<Zeroizing<String>, SecretError> {
        debug!("Decrypting {} with {}", path.display(), self.binary);

        let mut child = Command::new(&self.binary)
            .args([
                "--quiet",
                "--batch",
                "--yes",
                "--passphrase-fd",
                "0",
                "--decrypt",
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(SecretError::Launch)?;

        // Passphrase goes in on fd 0; dropping the handle closes it.
        // A decryptor that exits early surfaces through its exit status.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(passphrase.expose().as_bytes()) {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output()?;
        let stdout = Zeroizing::new(output.stdout);

        if !output.status.success() {
            return Err(SecretError::Decryption {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(Zeroizing::new(
            String::from_utf8_lossy(&stdout).trim().to_string(),
        ))
    }
}
