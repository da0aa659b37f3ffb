//! Watch worker process.
//!
//! A watch runs in its own OS process (the `opa-watch` binary) so the
//! blocking stream never shares a scheduler with the caller and all of its
//! resources go away when the process is torn down.
//!
//! The two sides talk over the worker's stdout exactly once: after the
//! streaming request got its response head, the worker prints a single JSON
//! [`Handshake`] line. Everything after that goes to the sink file. Worker
//! logs go to stderr.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use super::reassembly::read_records;
use super::writer::{open_sink, write_records};
use crate::error::{OpaError, Result};
use crate::rest::{RestClient, RestReturn};

/// What a worker needs to run one watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Full request URL, watch query included.
    pub url: String,
    pub sink: PathBuf,
    pub connect_timeout: Duration,
}

impl WorkerConfig {
    /// Command-line arguments understood by the `opa-watch` binary.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--url".to_string(),
            self.url.clone(),
            "--sink".to_string(),
            self.sink.to_string_lossy().into_owned(),
            "--connect-timeout-ms".to_string(),
            self.connect_timeout.as_millis().to_string(),
        ]
    }
}

/// Status line reported by the worker once the stream is (or is not) open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub success: bool,
    pub status: u16,
    pub message: String,
}

impl Handshake {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: 0,
            message: message.into(),
        }
    }
}

impl From<&RestReturn> for Handshake {
    fn from(ret: &RestReturn) -> Self {
        Self {
            success: ret.success,
            status: ret.http_status,
            message: ret.message.clone(),
        }
    }
}

fn report<W: Write>(out: &mut W, handshake: &Handshake) -> Result<()> {
    let line = serde_json::to_string(handshake)?;
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

/// Worker entry point: connect, open the sink, report, then stream.
///
/// The sink is only created once the server accepted the stream. Returns the
/// number of records written once the server closes the stream.
pub fn run<W: Write>(config: &WorkerConfig, handshake_out: &mut W) -> Result<usize> {
    let client = RestClient::new(config.connect_timeout);
    let response = match client.get_stream(&config.url) {
        Ok(response) => response,
        Err(e) => {
            report(handshake_out, &Handshake::failed(e.to_string()))?;
            return Err(e);
        }
    };

    let handshake = Handshake::from(&response.head);
    let body = match response.body {
        Some(body) if handshake.success => body,
        _ => {
            report(handshake_out, &handshake)?;
            return Err(OpaError::WatchRejected {
                status: handshake.status,
                message: handshake.message,
            });
        }
    };

    let mut sink = match open_sink(&config.sink) {
        Ok(sink) => sink,
        Err(e) => {
            report(handshake_out, &Handshake::failed(e.to_string()))?;
            return Err(e);
        }
    };
    report(handshake_out, &handshake)?;

    log::info!(
        "Streaming {} into {}",
        config.url,
        config.sink.display()
    );
    let written = write_records(read_records(body), &mut sink)?;
    log::info!(
        "Watch stream for {} ended after {} records",
        config.url,
        written
    );
    Ok(written)
}

/// Owner side of a running worker process.
#[derive(Debug)]
pub struct WatchWorker {
    child: Child,
}

impl WatchWorker {
    /// Spawn the worker binary and wait for its handshake.
    ///
    /// Succeeds only when the server accepted the stream. On any other outcome
    /// the process is reaped before returning.
    pub fn spawn(binary: &Path, config: &WorkerConfig) -> Result<Self> {
        let mut child = Command::new(binary)
            .args(config.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                OpaError::Worker(format!("Failed to spawn {}: {}", binary.display(), e))
            })?;

        let stdout = child.stdout.take();
        let mut worker = Self { child };

        let stdout = match stdout {
            Some(stdout) => stdout,
            None => {
                worker.terminate()?;
                return Err(OpaError::Worker("Failed to capture worker stdout".to_string()));
            }
        };

        let mut line = String::new();
        let read = BufReader::new(stdout).read_line(&mut line);
        let handshake = match read {
            Ok(0) => Err(OpaError::Worker(
                "Worker exited before reporting".to_string(),
            )),
            Ok(_) => serde_json::from_str::<Handshake>(line.trim()).map_err(|e| {
                OpaError::Worker(format!("Unreadable handshake {:?}: {}", line.trim(), e))
            }),
            Err(e) => Err(OpaError::Io(e)),
        };

        match handshake {
            Ok(handshake) if handshake.success => {
                log::debug!(
                    "Watch worker {} streaming {} ({})",
                    worker.id(),
                    config.url,
                    handshake.status
                );
                Ok(worker)
            }
            Ok(handshake) => {
                worker.terminate()?;
                Err(OpaError::WatchRejected {
                    status: handshake.status,
                    message: handshake.message,
                })
            }
            Err(e) => {
                worker.terminate()?;
                Err(e)
            }
        }
    }

    /// Process id of the worker.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Check whether the worker is still alive without blocking.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stop the worker and wait until the process has exited.
    ///
    /// Sends SIGTERM on Unix (falling back to a hard kill if signalling
    /// fails), kills outright elsewhere.
    pub fn terminate(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        #[cfg(unix)]
        {
            let pid = self.child.id() as libc::pid_t;
            let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
            if rc != 0 {
                log::warn!(
                    "Failed to signal watch worker {}: {}",
                    pid,
                    std::io::Error::last_os_error()
                );
                self.kill();
            }
        }

        #[cfg(not(unix))]
        {
            self.kill();
        }

        let status = self.child.wait()?;
        log::debug!("Watch worker {} exited with {}", self.child.id(), status);
        Ok(status)
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            log::warn!("Failed to kill watch worker {}: {}", self.child.id(), e);
        }
    }
}
