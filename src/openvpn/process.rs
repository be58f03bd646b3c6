//! `openvpn` child process with merged output

use super::{ClientProcess, Invocation, LaunchError, VpnClient};
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::{Child, Command, Stdio};
use std::thread;
use tracing::{debug, warn};

pub struct OpenVpnClient {
    binary: String,
}

impl OpenVpnClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for OpenVpnClient {
    fn default() -> Self {
        Self::new("openvpn")
    }
}

impl VpnClient for OpenVpnClient {
    fn launch(&self, invocation: &Invocation) -> Result<Box<dyn ClientProcess>, LaunchError> {
        let (reader, writer) = output_pipe().map_err(|e| LaunchError::Pipe(e.to_string()))?;
        let writer_err = writer
            .try_clone()
            .map_err(|e| LaunchError::Pipe(e.to_string()))?;

        // The Command owns our copies of the write end; dropping it after
        // spawn leaves the child as the only writer, so EOF means it exited.
        let child = {
            let mut command = Command::new(&self.binary);
            command
                .args(invocation.args())
                .stdin(Stdio::null())
                .stdout(Stdio::from(writer))
                .stderr(Stdio::from(writer_err));
            command.spawn().map_err(|source| LaunchError::Spawn {
                binary: self.binary.clone(),
                source,
            })?
        };

        debug!("{} started (pid {})", self.binary, child.id());

        Ok(Box::new(OpenVpnProcess {
            child,
            output: BufReader::new(File::from(reader)),
        }))
    }

    fn binary(&self) -> &str {
        &self.binary
    }
}

/// Pipe whose ends are not leaked into unrelated children
fn output_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    let (reader, writer) = nix::unistd::pipe()?;
    for fd in [&reader, &writer] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((reader, writer))
}

struct OpenVpnProcess {
    child: Child,
    output: BufReader<File>,
}

impl ClientProcess for OpenVpnProcess {
    fn next_line(&mut self) -> Option<String> {
        let mut buf = Vec::new();
        match self.output.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => Some(String::from_utf8_lossy(&buf).trim().to_string()),
            Err(e) => {
                warn!("Failed to read client output: {}", e);
                None
            }
        }
    }

    fn detach(self: Box<Self>) {
        let OpenVpnProcess { mut child, output } = *self;
        let span = tracing::Span::current();

        // Keep draining so the client never blocks on a full pipe
        let spawned = thread::Builder::new()
            .name("vpn-output".to_string())
            .spawn(move || {
                let _entered = span.enter();
                for line in output.split(b'\n') {
                    match line {
                        Ok(bytes) => debug!("{}", String::from_utf8_lossy(&bytes).trim()),
                        Err(_) => break,
                    }
                }
                match child.wait() {
                    Ok(status) => warn!("VPN client exited: {}", status),
                    Err(e) => warn!("Failed to wait for VPN client: {}", e),
                }
            });

        if let Err(e) = spawned {
            warn!("Failed to start output drain thread: {}", e);
        }
    }

    fn reap(self: Box<Self>) {
        let OpenVpnProcess { mut child, .. } = *self;
        match child.wait() {
            Ok(status) => debug!("VPN client exited: {}", status),
            Err(e) => warn!("Failed to wait for VPN client: {}", e),
        }
    }
}
