//! Sectioned targets file

use super::ProbeError;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::warn;
use url::Url;

const SSH_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `[http]`: a URL
    Http(Url),
    /// `[postgresql]` / `[database]`: `host:port`
    Tcp { host: String, port: u16 },
    /// `[git]` / `[ssh]`: `user@host:path`
    Ssh {
        user: String,
        host: String,
        port: u16,
        path: String,
    },
}

impl Target {
    pub fn section(&self) -> &'static str {
        match self {
            Target::Http(_) => "http",
            Target::Tcp { .. } => "database",
            Target::Ssh { .. } => "git",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Http(url) => write!(f, "{}", url),
            Target::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Target::Ssh {
                user, host, path, ..
            } => write!(f, "{}@{}:{}", user, host, path),
        }
    }
}

pub fn load_targets(path: &Path) -> Result<Vec<Target>, ProbeError> {
    let content = fs::read_to_string(path).map_err(|source| ProbeError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let (targets, problems) = parse_targets(&content);
    for problem in &problems {
        warn!("{}: {}", path.display(), problem);
    }
    Ok(targets)
}

/// Parsed targets plus one message per skipped line
pub fn parse_targets(content: &str) -> (Vec<Target>, Vec<String>) {
    let mut targets = Vec::new();
    let mut problems = Vec::new();
    let mut section: Option<String> = None;

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = Some(name.trim().to_lowercase());
            continue;
        }

        let parsed = match section.as_deref() {
            Some("http") => parse_url(line),
            Some("postgresql") | Some("database") => parse_host_port(line),
            Some("git") | Some("ssh") => parse_ssh(line),
            Some(other) => Err(format!("unknown section [{}]", other)),
            None => Err("entry outside of any section".to_string()),
        };

        match parsed {
            Ok(target) => targets.push(target),
            Err(reason) => problems.push(format!("line {}: {} ({})", index + 1, reason, line)),
        }
    }

    (targets, problems)
}

fn parse_url(line: &str) -> Result<Target, String> {
    let url = Url::parse(line).map_err(|e| format!("invalid URL: {}", e))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err("expected an http(s) URL with a host".to_string());
    }
    Ok(Target::Http(url))
}

fn parse_host_port(line: &str) -> Result<Target, String> {
    let (host, port) = line
        .rsplit_once(':')
        .ok_or_else(|| "expected host:port".to_string())?;
    let port = port
        .trim()
        .parse::<u16>()
        .map_err(|_| format!("invalid port '{}'", port))?;
    if host.trim().is_empty() {
        return Err("missing host".to_string());
    }

    Ok(Target::Tcp {
        host: host.trim().to_string(),
        port,
    })
}

fn parse_ssh(line: &str) -> Result<Target, String> {
    let (user_host, path) = line
        .split_once(':')
        .ok_or_else(|| "expected user@host:path".to_string())?;
    let (user, host) = user_host
        .split_once('@')
        .ok_or_else(|| "expected user@host:path".to_string())?;
    if user.is_empty() || host.is_empty() {
        return Err("expected user@host:path".to_string());
    }

    Ok(Target::Ssh {
        user: user.to_string(),
        host: host.to_string(),
        port: SSH_PORT,
        path: path.to_string(),
    })
}
