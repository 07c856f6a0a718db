//! Session bridge configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main session bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Terminal bridge configuration
    pub terminal: TerminalConfig,

    /// Agent streaming configuration
    pub agent: AgentConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render configuration as pretty TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values that cannot produce a working bridge
    pub fn validate(&self) -> Result<()> {
        if self.terminal.cols == 0 || self.terminal.rows == 0 {
            return Err(Error::Config(
                "terminal.cols and terminal.rows must be positive".to_string(),
            ));
        }
        if self.terminal.output_buffer == 0 {
            return Err(Error::Config(
                "terminal.output_buffer must be positive".to_string(),
            ));
        }
        if let ProducerConfig::Command { program, .. } = &self.agent.producer {
            if program.trim().is_empty() {
                return Err(Error::Config(
                    "agent.producer.program must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on (0 picks a free port)
    pub port: u16,

    /// Allowed CORS origins (empty allows any origin)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7681,
            cors_origins: Vec::new(),
        }
    }
}

/// Terminal bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell to start (defaults to `$SHELL`, then `/bin/sh`)
    pub shell: Option<String>,

    /// Initial terminal width
    pub cols: u16,

    /// Initial terminal height
    pub rows: u16,

    /// Working directory for spawned shells (defaults to the server's)
    pub cwd: Option<PathBuf>,

    /// Depth of the process output channel, in chunks
    pub output_buffer: usize,

    /// Time allowed to flush trailing output after the process exits
    pub drain_grace_ms: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: None,
            cols: 80,
            rows: 24,
            cwd: None,
            output_buffer: 64,
            drain_grace_ms: 100,
        }
    }
}

impl TerminalConfig {
    /// Grace period for draining output after process exit
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

/// Agent streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Evict sessions idle for longer than this (never, when absent)
    pub idle_timeout_secs: Option<u64>,

    /// How often the eviction sweeper runs
    pub sweep_interval_secs: u64,

    /// Directory for persisted conversation history (in-memory when absent)
    pub history_dir: Option<PathBuf>,

    /// Event producer backing each exchange
    pub producer: ProducerConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: None,
            sweep_interval_secs: 60,
            history_dir: None,
            producer: ProducerConfig::Echo,
        }
    }
}

impl AgentConfig {
    /// Idle timeout as a duration, if eviction is enabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Sweeper period (never shorter than one second)
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Which producer answers agent exchanges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProducerConfig {
    /// Built-in producer that echoes the message and recalls history
    Echo,
    /// External program speaking line-delimited JSON events on stdout
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Default directory for persisted history (`~/.session-bridge/history`)
pub fn default_history_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".session-bridge")
        .join("history")
}
