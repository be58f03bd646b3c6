//! Ephemeral username/password file for the VPN client
//!
//! The file is created with owner-only permissions right before a launch and
//! is removed when the guard is dropped, so every exit path of an attempt
//! (success, failure, early return, panic unwind) cleans it up.

use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::Zeroizing;

const CREDENTIAL_MODE: u32 = 0o600;

#[derive(Debug)]
pub struct CredentialFile {
    path: PathBuf,
    removed: bool,
}

impl CredentialFile {
    /// Location of a profile's credential file
    pub fn path_for(secret_dir: &Path, profile: &str) -> PathBuf {
        secret_dir.join(format!("{}.auth", profile))
    }

    /// Write `username` and `password` on two lines with mode 0600
    pub fn write(path: PathBuf, username: &str, password: &str) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(CREDENTIAL_MODE)
            .open(&path)?;

        // From here on the guard owns the path, even if the write fails
        let guard = Self {
            path,
            removed: false,
        };

        // `mode` only applies when the file is created
        file.set_permissions(Permissions::from_mode(CREDENTIAL_MODE))?;

        let content = Zeroizing::new(format!("{}\n{}\n", username, password));
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        debug!("Credential file written: {}", guard.path.display());
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now, reporting the result
    pub fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        remove_if_present(&self.path)
    }
}

impl Drop for CredentialFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match remove_if_present(&self.path) {
            Ok(()) => debug!("Credential file removed: {}", self.path.display()),
            Err(e) => warn!(
                "Failed to remove credential file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
