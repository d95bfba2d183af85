//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Default per-job event tail capacity.
pub const DEFAULT_MAX_EVENT_TAIL: usize = 200;

/// Default number of completed jobs retained.
pub const DEFAULT_MAX_COMPLETED: usize = 50;

/// Service configuration, read from `REEF_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Snapshot file written after every state change.
    pub state_path: PathBuf,
    /// Maximum events retained per job.
    pub max_event_tail: usize,
    /// Maximum completed jobs retained (newest first).
    pub max_completed: usize,
    /// Executable names for the built-in adapters.
    pub binaries: AgentBinaries,
    /// Optional directory for rolling JSON log files.
    pub log_dir: Option<PathBuf>,
}

/// Executables launched by the built-in adapters.
#[derive(Debug, Clone)]
pub struct AgentBinaries {
    pub claude: String,
    pub codex: String,
    pub opencode: String,
}

impl Default for AgentBinaries {
    fn default() -> Self {
        Self {
            claude: "claude".to_string(),
            codex: "codex".to_string(),
            opencode: "opencode".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            max_event_tail: DEFAULT_MAX_EVENT_TAIL,
            max_completed: DEFAULT_MAX_COMPLETED,
            binaries: AgentBinaries::default(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let state_path = lookup("REEF_STATE_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.state_path);

        let max_event_tail = parse_capacity(&lookup, "REEF_MAX_EVENT_TAIL", DEFAULT_MAX_EVENT_TAIL)?;
        let max_completed = parse_capacity(&lookup, "REEF_MAX_COMPLETED", DEFAULT_MAX_COMPLETED)?;

        let binaries = AgentBinaries {
            claude: lookup("REEF_CLAUDE_BIN").unwrap_or(defaults.binaries.claude),
            codex: lookup("REEF_CODEX_BIN").unwrap_or(defaults.binaries.codex),
            opencode: lookup("REEF_OPENCODE_BIN").unwrap_or(defaults.binaries.opencode),
        };

        let log_dir = lookup("REEF_LOG_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            state_path,
            max_event_tail,
            max_completed,
            binaries,
            log_dir,
        })
    }
}

fn parse_capacity<F>(lookup: &F, key: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value: usize = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?} is not a number: {e}"),
    })?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn default_state_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".reef").join("state.json")
}
