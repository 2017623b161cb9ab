//! Server configuration: TOML file + CLI overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use wcon_core::WconResult;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub console: ConsoleSection,
    #[serde(default)]
    pub process: ProcessSection,
    #[serde(default)]
    pub auth: Option<AuthSection>,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// `[console]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleSection {
    /// Enables non-essential diagnostic logging.
    #[serde(default)]
    pub verbose: bool,
    /// Replay history cap in bytes.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Audit log path for executed commands.
    #[serde(default = "default_audit_log")]
    pub audit_log: String,
}

impl Default for ConsoleSection {
    fn default() -> Self {
        Self {
            verbose: false,
            history_limit: default_history_limit(),
            audit_log: default_audit_log(),
        }
    }
}

/// `[process]` section: the managed process to supervise.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessSection {
    /// Command line to spawn, split on whitespace.
    pub command: Option<String>,
}

/// `[auth]` section: static development credentials attached to every
/// connection. In production the session subsystem owns this; the section
/// exists so the binary is usable without one.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    pub username: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn default_port() -> u16 {
    40121
}
fn default_history_limit() -> usize {
    256 * 1024
}
fn default_audit_log() -> String {
    "~/.wcon/audit.log".to_string()
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub verbose: bool,
    pub history_limit: usize,
    pub audit_log_path: PathBuf,
    pub command: Option<String>,
    pub auth: Option<AuthSection>,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_command: Option<&str>,
        cli_verbose: bool,
    ) -> WconResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content).map_err(|e| {
                    wcon_core::WconError::Other(format!("config parse error: {e}"))
                })?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let port = cli_port.unwrap_or(file_config.server.port);
        let command = cli_command
            .map(|s| s.to_string())
            .or(file_config.process.command);

        Ok(Self {
            port,
            verbose: cli_verbose || file_config.console.verbose,
            history_limit: file_config.console.history_limit,
            audit_log_path: expand_tilde_str(&file_config.console.audit_log),
            command,
            auth: file_config.auth,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if s.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(&s[2..]);
        }
    }
    PathBuf::from(s)
}
