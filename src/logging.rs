//! Event log with a fallback destination
//!
//! Every event is appended to the primary log file. If that write fails the
//! line goes to the fallback file instead, and if that fails too it is only
//! reported on stderr. A logging failure is never propagated to the caller.

use crate::config::LogConfig;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Where an appended line ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Primary,
    Fallback,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    primary: PathBuf,
    fallback: PathBuf,
}

impl EventLog {
    pub fn new(primary: PathBuf, fallback: PathBuf) -> Self {
        Self { primary, fallback }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        Self::new(config.path.clone(), config.fallback_path.clone())
    }

    pub fn append(&self, buf: &[u8]) -> Destination {
        let primary_err = match append_to(&self.primary, buf) {
            Ok(()) => return Destination::Primary,
            Err(e) => e,
        };

        eprintln!(
            "warning: cannot write log {}: {}; using {}",
            self.primary.display(),
            primary_err,
            self.fallback.display()
        );

        match append_to(&self.fallback, buf) {
            Ok(()) => Destination::Fallback,
            Err(e) => {
                eprintln!(
                    "error: cannot write fallback log {}: {}",
                    self.fallback.display(),
                    e
                );
                Destination::Dropped
            }
        }
    }
}

fn append_to(path: &Path, buf: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(buf)
}

pub struct EventLogWriter<'a> {
    log: &'a EventLog,
}

impl Write for EventLogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for EventLog {
    type Writer = EventLogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        EventLogWriter { log: self }
    }
}

/// Install the global subscriber: stderr console plus the optional event log
pub fn init(verbose: bool, config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = fmt::layer().with_target(false).with_writer(io::stderr);

    let file = config.enabled.then(|| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(EventLog::from_config(config))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    Ok(())
}
