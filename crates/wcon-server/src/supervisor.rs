//! The managed process: command forwarding and console output capture.
//!
//! The relay core only depends on the [`ProcessSupervisor`] trait.
//! [`ManagedProcess`] is the built-in implementation: a piped child whose
//! stdout/stderr feed the broadcast buffer and the replay history, and
//! whose stdin drains a fire-and-forget command channel.

use crate::broadcast::ConsoleBuffer;
use crate::history::HistoryBuffer;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wcon_core::{mark_fragment, WconError, WconResult};

/// Queue depth for commands awaiting the child's stdin.
const COMMAND_QUEUE: usize = 256;

/// Interface to the process supervisor that owns the managed process.
pub trait ProcessSupervisor: Send + Sync {
    /// Queue command text for the process's stdin. Fire-and-forget: there
    /// is no completion signal; resulting output arrives via the console
    /// stream.
    fn submit_command(&self, text: &str);

    /// Full historical console output for replay to a new viewer.
    fn history(&self) -> WconResult<String>;
}

/// A supervised child process with piped stdio.
pub struct ManagedProcess {
    cmd_tx: mpsc::Sender<String>,
    history: Arc<Mutex<HistoryBuffer>>,
}

impl ManagedProcess {
    /// Spawn `command_line` (split on whitespace) and start the output
    /// pump and stdin writer tasks.
    pub fn spawn(
        command_line: &str,
        buffer: Arc<ConsoleBuffer>,
        history_limit: usize,
    ) -> WconResult<Self> {
        let parts: Vec<&str> = command_line.split_whitespace().collect();
        if parts.is_empty() {
            return Err(WconError::Supervisor("empty command".into()));
        }

        let mut child = Command::new(parts[0])
            .args(&parts[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WconError::Supervisor(format!("failed to spawn {}: {e}", parts[0])))?;

        info!(command = %command_line, pid = ?child.id(), "managed process spawned");

        let history = Arc::new(Mutex::new(HistoryBuffer::new(history_limit)));

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WconError::Supervisor("child stdout not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| WconError::Supervisor("child stderr not piped".into()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| WconError::Supervisor("child stdin not piped".into()))?;

        // stdout pump
        {
            let buffer = Arc::clone(&buffer);
            let history = Arc::clone(&history);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    ingest(&buffer, &history, &format!("{line}\n"), None);
                }
            });
        }

        // stderr pump, tagged as errors
        {
            let buffer = Arc::clone(&buffer);
            let history = Arc::clone(&history);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    ingest(&buffer, &history, &line, Some("error"));
                }
            });
        }

        // stdin writer
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(COMMAND_QUEUE);
        tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                let mut payload = command.into_bytes();
                payload.push(b'\n');
                if let Err(e) = stdin.write_all(&payload).await {
                    warn!(error = %e, "child stdin closed, dropping command");
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    warn!(error = %e, "child stdin flush failed");
                    break;
                }
            }
        });

        // Reap the child and surface its exit in the console stream.
        {
            let buffer = Arc::clone(&buffer);
            let history = Arc::clone(&history);
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => {
                        info!(%status, "managed process exited");
                        ingest(
                            &buffer,
                            &history,
                            &format!("managed process exited ({status})"),
                            Some("error"),
                        );
                    }
                    Err(e) => warn!(error = %e, "failed to wait on managed process"),
                }
            });
        }

        Ok(Self { cmd_tx, history })
    }
}

/// Append output to the broadcast buffer and mirror the rendered fragment
/// into the replay history.
fn ingest(
    buffer: &ConsoleBuffer,
    history: &Mutex<HistoryBuffer>,
    data: &str,
    mark: Option<&str>,
) {
    buffer.append(data, mark);
    let mut history = history
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    match mark {
        Some(tag) => history.write(&mark_fragment(data, tag)),
        None => history.write(data),
    }
}

impl ProcessSupervisor for ManagedProcess {
    fn submit_command(&self, text: &str) {
        if self.cmd_tx.try_send(text.to_string()).is_err() {
            warn!("command queue full or closed, dropping command");
        }
    }

    fn history(&self) -> WconResult<String> {
        let history = self
            .history
            .lock()
            .map_err(|_| WconError::Supervisor("history lock poisoned".into()))?;
        Ok(history.snapshot())
    }
}
