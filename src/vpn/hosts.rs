//! /etc/hosts injection for names only resolvable inside the tunnels
//!
//! Extra entries live in a marked block so repeated runs replace them instead
//! of appending duplicates, and `hosts --remove` can take them out again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum HostsError {
    #[error("Failed to access hosts file: {0}")]
    Io(#[from] io::Error),
    #[error("Extra hosts file not found: {0}")]
    SourceMissing(PathBuf),
}

const HOSTS_MARKER_START: &str = "# BEGIN vpn-chain";
const HOSTS_MARKER_END: &str = "# END vpn-chain";

pub struct HostsManager {
    path: PathBuf,
}

impl HostsManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the managed block with `lines`
    pub fn add_lines(&self, lines: &[String]) -> Result<(), HostsError> {
        let content = fs::read_to_string(&self.path)?;
        let new_content = update_content(&content, lines);
        fs::write(&self.path, new_content)?;
        Ok(())
    }

    pub fn remove_entries(&self) -> Result<(), HostsError> {
        let content = fs::read_to_string(&self.path)?;
        let new_content = remove_managed_section(&content);
        fs::write(&self.path, new_content)?;
        Ok(())
    }
}

/// Read host lines from an extra-hosts file, skipping blanks and comments
pub fn read_extra_hosts(path: &Path) -> Result<Vec<String>, HostsError> {
    if !path.exists() {
        return Err(HostsError::SourceMissing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Copy the extra hosts into the managed block. Missing or unreadable
/// sources are logged and never stop the chain.
pub fn inject_extra_hosts(extra_hosts: &Path, hosts_file: &Path) {
    let lines = match read_extra_hosts(extra_hosts) {
        Ok(lines) => lines,
        Err(HostsError::SourceMissing(path)) => {
            warn!("Extra hosts file not found: {}", path.display());
            return;
        }
        Err(e) => {
            error!("Failed to read extra hosts: {}", e);
            return;
        }
    };

    let manager = HostsManager::new(hosts_file);
    match manager.add_lines(&lines) {
        Ok(()) => info!(
            "Added {} entries to {}",
            lines.len(),
            manager.path().display()
        ),
        Err(e) => error!("Failed to update {}: {}", manager.path().display(), e),
    }
}

fn update_content(content: &str, lines: &[String]) -> String {
    let cleaned = remove_managed_section(content);
    let mut result = cleaned.trim_end().to_string();
    result.push('\n');

    if !lines.is_empty() {
        result.push('\n');
        result.push_str(HOSTS_MARKER_START);
        result.push('\n');
        for line in lines {
            result.push_str(line);
            result.push('\n');
        }
        result.push_str(HOSTS_MARKER_END);
        result.push('\n');
    }

    result
}

fn remove_managed_section(content: &str) -> String {
    let mut result = String::new();
    let mut in_managed_section = false;

    for line in content.lines() {
        if line.trim() == HOSTS_MARKER_START {
            in_managed_section = true;
            continue;
        }
        if line.trim() == HOSTS_MARKER_END {
            in_managed_section = false;
            continue;
        }
        if !in_managed_section {
            result.push_str(line);
            result.push('\n');
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_manager(temp_dir: &TempDir, content: &str) -> HostsManager {
        let path = temp_dir.path().join("hosts");
        fs::write(&path, content).unwrap();
        HostsManager::new(path)
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_inject_extra_hosts() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir, "127.0.0.1\tlocalhost\n");
        let extra = temp_dir.path().join("extra_hosts.txt");
        fs::write(&extra, "# corp\n10.0.0.1 git.corp.local\n").unwrap();

        inject_extra_hosts(&extra, manager.path());

        let content = fs::read_to_string(manager.path()).unwrap();
        assert!(content.contains("10.0.0.1 git.corp.local"));
        assert!(!content.contains("# corp"));
    }

    #[test]
    fn test_inject_without_source_leaves_hosts_alone() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir, "127.0.0.1\tlocalhost\n");

        inject_extra_hosts(&temp_dir.path().join("absent.txt"), manager.path());

        let content = fs::read_to_string(manager.path()).unwrap();
        assert_eq!(content, "127.0.0.1\tlocalhost\n");
    }

    #[test]
    fn test_update_content_adds_section() {
        let original = "127.0.0.1\tlocalhost\n";
        let result = update_content(original, &lines(&["10.0.0.1 git.corp.local"]));

        assert!(result.contains("127.0.0.1\tlocalhost"));
        assert!(result.contains("# BEGIN vpn-chain"));
        assert!(result.contains("10.0.0.1 git.corp.local"));
        assert!(result.contains("# END vpn-chain"));
    }

    #[test]
    fn test_update_content_empty_lines() {
        let original = "127.0.0.1\tlocalhost\n";
        let result = update_content(original, &[]);

        assert_eq!(result, "127.0.0.1\tlocalhost\n");
    }

    #[test]
    fn test_update_content_replaces_existing_section() {
        let original = "127.0.0.1\tlocalhost\n\
                        # BEGIN vpn-chain\n\
                        10.0.0.1 old.corp.local\n\
                        # END vpn-chain\n\
                        ::1\tlocalhost\n";

        let result = update_content(original, &lines(&["10.0.0.2 new.corp.local"]));

        assert!(result.contains("::1\tlocalhost"));
        assert!(!result.contains("old.corp.local"));
        assert!(result.contains("10.0.0.2 new.corp.local"));
        assert_eq!(result.matches("# BEGIN vpn-chain").count(), 1);
    }

    #[test]
    fn test_update_is_idempotent() {
        let entries = lines(&["10.0.0.1 a.corp.local", "10.0.0.2 b.corp.local"]);
        let once = update_content("127.0.0.1\tlocalhost\n", &entries);
        let twice = update_content(&once, &entries);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_remove_managed_section() {
        let content = "127.0.0.1\tlocalhost\n\
                       # BEGIN vpn-chain\n\
                       10.0.0.1 db.corp.local\n\
                       # END vpn-chain\n\
                       ::1\tlocalhost\n";

        let result = remove_managed_section(content);

        assert!(result.contains("127.0.0.1\tlocalhost"));
        assert!(result.contains("::1\tlocalhost"));
        assert!(!result.contains("# BEGIN vpn-chain"));
        assert!(!result.contains("db.corp.local"));
    }

    #[test]
    fn test_add_and_remove_file_operations() {
        let temp_dir = TempDir::new().unwrap();
        let manager = create_test_manager(&temp_dir, "127.0.0.1\tlocalhost\n");

        manager
            .add_lines(&lines(&["192.168.1.100 git.corp.local"]))
            .unwrap();
        let content = fs::read_to_string(manager.path()).unwrap();
        assert!(content.contains("192.168.1.100 git.corp.local"));

        manager.remove_entries().unwrap();
        let content = fs::read_to_string(manager.path()).unwrap();
        assert!(content.contains("127.0.0.1\tlocalhost"));
        assert!(!content.contains("git.corp.local"));
    }

    #[test]
    fn test_read_extra_hosts_skips_comments() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("extra_hosts.txt");
        fs::write(
            &path,
            "# corp hosts\n10.0.0.1 git.corp.local\n\n  10.0.0.2 db.corp.local  \n",
        )
        .unwrap();

        let entries = read_extra_hosts(&path).unwrap();
        assert_eq!(
            entries,
            lines(&["10.0.0.1 git.corp.local", "10.0.0.2 db.corp.local"])
        );
    }

    #[test]
    fn test_read_extra_hosts_missing() {
        let result = read_extra_hosts(Path::new("/nonexistent/extra_hosts.txt"));
        assert!(matches!(result.unwrap_err(), HostsError::SourceMissing(_)));
    }
}
