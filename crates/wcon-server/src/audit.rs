//! Persistent audit trail of executed console commands.
//!
//! One line per authorized command, format `[<remote>][<username>] <text>`.
//! Writes are best-effort and must never block or fail the command path;
//! errors are logged and swallowed.

use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::error;

/// File-backed audit log.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Create an audit log writing to the given path. The parent directory
    /// is created lazily on first append.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the audit file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format the canonical audit line for one executed command.
    pub fn format_line(remote: &str, username: &str, command: &str) -> String {
        format!("[{remote}][{username}] {command}")
    }

    /// Append one line. Errors are logged but do not propagate.
    pub async fn append(&self, line: &str) {
        if let Err(e) = self.append_line(line).await {
            error!(path = %self.path.display(), error = %e, "failed to write audit log");
        }
    }

    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}
