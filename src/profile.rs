//! Connection profile discovery and ordering
//!
//! Profiles come from JSON descriptors: either a directory with one object
//! per `*.json` file (the file stem is the default name) or a single file
//! holding a list of objects. A descriptor that fails to parse is logged and
//! skipped; the rest still load.
//!
//! The result is stable-sorted by `Order`. Connection order matters because
//! later tunnels may only be reachable through routes set up by earlier ones,
//! so equal orders keep their discovery order.

use crate::config::PathsConfig;
use crate::secret::SecretRef;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

/// Order assigned to descriptors without a usable `Order`
pub const DEFAULT_ORDER: i64 = 9999;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("[{origin}] failed to read: {source}")]
    Read {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("[{origin}] failed to parse: {message}")]
    Parse { origin: String, message: String },
    #[error("[{origin}] descriptor has no Name")]
    MissingName { origin: String },
    #[error("[{origin}] duplicate profile name '{name}'")]
    Duplicate { origin: String, name: String },
    #[error("[{origin}] profile name '{name}' is not a plain file name")]
    InvalidName { origin: String, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub order: i64,
    pub username: Option<String>,
    /// Static text placed before the OTP in the password
    pub prefix: String,
    pub secret: SecretRef,
    /// OpenVPN connection file
    pub connection_file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Order", default, deserialize_with = "lenient_order")]
    order: Option<i64>,
    #[serde(rename = "Username", default)]
    username: Option<String>,
    #[serde(rename = "Prefix", default)]
    prefix: Option<String>,
    #[serde(rename = "Secret", alias = "otp_secret", default)]
    secret: Option<String>,
    #[serde(rename = "OtpAuthUrl", default)]
    otp_auth_url: Option<String>,
    #[serde(rename = "SecretPath", default)]
    secret_path: Option<PathBuf>,
    #[serde(rename = "Profile", default)]
    profile: Option<PathBuf>,
}

/// Accept integers, floats and numeric strings; anything else means "unset"
fn lenient_order<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl Descriptor {
    fn into_profile(
        self,
        default_name: Option<&str>,
        origin: &str,
        paths: &PathsConfig,
    ) -> Result<Profile, ProfileError> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| default_name.map(String::from))
            .ok_or_else(|| ProfileError::MissingName {
                origin: origin.to_string(),
            })?;
        if !is_plain_name(&name) {
            return Err(ProfileError::InvalidName {
                origin: origin.to_string(),
                name,
            });
        }

        let secret = if let Some(seed) = self.secret {
            SecretRef::Inline(seed)
        } else if let Some(uri) = self.otp_auth_url {
            SecretRef::OtpAuthUri(uri)
        } else if let Some(path) = self.secret_path {
            SecretRef::File(paths.secret_dir.join(path))
        } else {
            SecretRef::File(paths.secret_dir.join(format!("{}.gpg", name)))
        };

        let connection_file = match self.profile {
            Some(path) => paths.profile_dir.join(path),
            None => paths.profile_dir.join(format!("{}.ovpn", name)),
        };

        Ok(Profile {
            order: self.order.unwrap_or(DEFAULT_ORDER),
            username: self.username.filter(|u| !u.is_empty()),
            prefix: self.prefix.unwrap_or_default(),
            secret,
            connection_file,
            name,
        })
    }
}

/// Names become file names under the secret and profile directories
pub fn is_plain_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed != name || name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}

/// Load, validate and order profiles, logging every skipped descriptor
pub fn load_profiles(source: &Path, paths: &PathsConfig) -> Vec<Profile> {
    let (profiles, skipped) = collect_profiles(source, paths);

    for err in &skipped {
        error!("{}", err);
    }

    let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
    info!("Connection order: {:?}", names);

    profiles
}

/// Profiles in connection order plus the errors for skipped descriptors
pub fn collect_profiles(source: &Path, paths: &PathsConfig) -> (Vec<Profile>, Vec<ProfileError>) {
    let mut profiles = Vec::new();
    let mut skipped = Vec::new();

    let candidates = if source.is_dir() {
        read_directory(source, paths, &mut skipped)
    } else {
        read_list_file(source, paths, &mut skipped)
    };

    let mut seen = HashSet::new();
    for (origin, result) in candidates {
        match result {
            Ok(profile) if !seen.insert(profile.name.clone()) => {
                skipped.push(ProfileError::Duplicate {
                    origin,
                    name: profile.name,
                });
            }
            Ok(profile) => profiles.push(profile),
            Err(e) => skipped.push(e),
        }
    }

    // Stable: equal orders keep discovery order
    profiles.sort_by_key(|p| p.order);
    (profiles, skipped)
}

type Candidate = (String, Result<Profile, ProfileError>);

fn read_directory(dir: &Path, paths: &PathsConfig, skipped: &mut Vec<ProfileError>) -> Vec<Candidate> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) => {
            skipped.push(ProfileError::Read {
                origin: dir.display().to_string(),
                source,
            });
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    files
        .into_iter()
        .map(|file| {
            let origin = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string());
            let result = fs::read_to_string(&file)
                .map_err(|source| ProfileError::Read {
                    origin: origin.clone(),
                    source,
                })
                .and_then(|content| {
                    serde_json::from_str::<Descriptor>(&content).map_err(|e| ProfileError::Parse {
                        origin: origin.clone(),
                        message: e.to_string(),
                    })
                })
                .and_then(|descriptor| descriptor.into_profile(stem.as_deref(), &origin, paths));
            (origin, result)
        })
        .collect()
}

fn read_list_file(file: &Path, paths: &PathsConfig, skipped: &mut Vec<ProfileError>) -> Vec<Candidate> {
    let origin = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());

    let value = match fs::read_to_string(file) {
        Ok(content) => match serde_json::from_str::<Value>(&content) {
            Ok(value) => value,
            Err(e) => {
                skipped.push(ProfileError::Parse {
                    origin,
                    message: e.to_string(),
                });
                return Vec::new();
            }
        },
        Err(source) => {
            skipped.push(ProfileError::Read { origin, source });
            return Vec::new();
        }
    };

    let (entries, default_name) = match value {
        Value::Array(entries) => (entries, None),
        single @ Value::Object(_) => (
            vec![single],
            file.file_stem().map(|s| s.to_string_lossy().to_string()),
        ),
        _ => {
            skipped.push(ProfileError::Parse {
                origin,
                message: "expected a list of profiles".to_string(),
            });
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let entry_origin = format!("{}#{}", origin, i);
            let result = serde_json::from_value::<Descriptor>(entry)
                .map_err(|e| ProfileError::Parse {
                    origin: entry_origin.clone(),
                    message: e.to_string(),
                })
                .and_then(|d| d.into_profile(default_name.as_deref(), &entry_origin, paths));
            (entry_origin, result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_paths() -> PathsConfig {
        PathsConfig {
            profile_dir: PathBuf::from("/vpn/vpn"),
            secret_dir: PathBuf::from("/vpn/secrets"),
            ..PathsConfig::default()
        }
    }

    fn write_list(temp_dir: &TempDir, json: &str) -> PathBuf {
        let path = temp_dir.path().join("vpn.json");
        fs::write(&path, json).unwrap();
        path
    }

    fn names(profiles: &[Profile]) -> Vec<&str> {
        profiles.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_stable_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_list(
            &temp_dir,
            r#"[
                {"Name": "A", "Order": 2},
                {"Name": "B", "Order": 1},
                {"Name": "C", "Order": 1}
            ]"#,
        );

        let profiles = load_profiles(&path, &test_paths());
        assert_eq!(names(&profiles), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_missing_or_bad_order_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_list(
            &temp_dir,
            r#"[
                {"Name": "none"},
                {"Name": "text", "Order": "soon"},
                {"Name": "numeric-string", "Order": "3"},
                {"Name": "null", "Order": null},
                {"Name": "first", "Order": 1}
            ]"#,
        );

        let profiles = load_profiles(&path, &test_paths());
        assert_eq!(
            names(&profiles),
            vec!["first", "numeric-string", "none", "text", "null"]
        );
        assert_eq!(profiles[1].order, 3);
        assert_eq!(profiles[2].order, DEFAULT_ORDER);
        assert_eq!(profiles[3].order, DEFAULT_ORDER);
    }

    #[test]
    fn test_bad_entry_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_list(
            &temp_dir,
            r#"[
                {"Name": "good", "Order": 1},
                {"Name": 42},
                {"Order": 3},
                {"Name": "also-good", "Order": 2}
            ]"#,
        );

        let (profiles, skipped) = collect_profiles(&path, &test_paths());
        assert_eq!(names(&profiles), vec!["good", "also-good"]);
        assert_eq!(skipped.len(), 2);
        assert!(matches!(skipped[0], ProfileError::Parse { .. }));
        assert!(matches!(skipped[1], ProfileError::MissingName { .. }));
    }

    #[test]
    fn test_duplicate_name_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_list(
            &temp_dir,
            r#"[{"Name": "office", "Order": 2}, {"Name": "office", "Order": 1}]"#,
        );

        let (profiles, skipped) = collect_profiles(&path, &test_paths());
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].order, 2);
        assert!(matches!(skipped[0], ProfileError::Duplicate { .. }));
    }

    #[test]
    fn test_unparseable_file_gives_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_list(&temp_dir, "{ not json");

        let (profiles, skipped) = collect_profiles(&path, &test_paths());
        assert!(profiles.is_empty());
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn test_missing_source_gives_empty() {
        let profiles = load_profiles(Path::new("/nonexistent/vpn.json"), &test_paths());
        assert!(profiles.is_empty());
    }

    #[test]
    fn test_directory_uses_file_stems() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("b-datacenter.json"),
            r#"{"Order": 1, "Username": "alice"}"#,
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("a-office.json"),
            r#"{"Order": 1, "Username": "bob"}"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("broken.json"), "[").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let (profiles, skipped) = collect_profiles(temp_dir.path(), &test_paths());
        assert_eq!(names(&profiles), vec!["a-office", "b-datacenter"]);
        assert_eq!(skipped.len(), 1);
        assert_eq!(profiles[0].username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_default_paths_and_secret_ref() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_list(&temp_dir, r#"[{"Name": "office", "Username": "alice"}]"#);

        let profiles = load_profiles(&path, &test_paths());
        let profile = &profiles[0];

        assert_eq!(profile.connection_file, PathBuf::from("/vpn/vpn/office.ovpn"));
        assert_eq!(
            profile.secret,
            SecretRef::File(PathBuf::from("/vpn/secrets/office.gpg"))
        );
        assert_eq!(profile.prefix, "");
    }

    #[test]
    fn test_secret_ref_variants() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_list(
            &temp_dir,
            r#"[
                {"Name": "inline", "Secret": "JBSWY3DPEHPK3PXP", "Prefix": "pin"},
                {"Name": "uri", "OtpAuthUrl": "otpauth://totp/x?secret=JBSWY3DPEHPK3PXP"},
                {"Name": "file", "SecretPath": "seeds/file.txt", "Profile": "/etc/openvpn/file.conf"}
            ]"#,
        );

        let profiles = load_profiles(&path, &test_paths());

        assert_eq!(
            profiles[0].secret,
            SecretRef::Inline("JBSWY3DPEHPK3PXP".to_string())
        );
        assert_eq!(profiles[0].prefix, "pin");
        assert!(matches!(profiles[1].secret, SecretRef::OtpAuthUri(_)));
        assert_eq!(
            profiles[2].secret,
            SecretRef::File(PathBuf::from("/vpn/secrets/seeds/file.txt"))
        );
        // Absolute paths are kept as-is by Path::join
        assert_eq!(
            profiles[2].connection_file,
            PathBuf::from("/etc/openvpn/file.conf")
        );
    }

    #[test]
    fn test_name_that_leaves_secret_dir_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_list(
            &temp_dir,
            r#"[
                {"Name": "../x", "Order": 1},
                {"Name": "/abs", "Order": 1},
                {"Name": "..", "Order": 1},
                {"Name": "corp\\vpn", "Order": 1},
                {"Name": " padded ", "Order": 1},
                {"Name": "office", "Order": 2}
            ]"#,
        );

        let (profiles, skipped) = collect_profiles(&path, &test_paths());
        assert_eq!(names(&profiles), vec!["office"]);
        assert_eq!(skipped.len(), 5);
        assert!(skipped
            .iter()
            .all(|e| matches!(e, ProfileError::InvalidName { .. })));
        assert!(matches!(
            &skipped[0],
            ProfileError::InvalidName { name, .. } if name == "../x"
        ));
        assert!(matches!(
            &skipped[1],
            ProfileError::InvalidName { name, .. } if name == "/abs"
        ));
    }

    #[test]
    fn test_plain_names() {
        assert!(is_plain_name("office"));
        assert!(is_plain_name("dc-1.eu"));
        assert!(!is_plain_name("."));
        assert!(!is_plain_name("a/b"));
        assert!(!is_plain_name(""));
    }

    #[test]
    fn test_single_object_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("office.json");
        fs::write(&path, r#"{"Username": "alice"}"#).unwrap();

        let profiles = load_profiles(&path, &test_paths());
        assert_eq!(names(&profiles), vec!["office"]);
    }
}
