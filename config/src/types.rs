use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VshConfig {
    pub shell: ShellConfig,
    pub limits: LimitsConfig,
    pub logging: LoggingConfig,
}

impl VshConfig {
    /// Rejects values the shell cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.shell.cwd.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "shell.cwd must be an absolute path, got '{}'",
                self.shell.cwd
            )));
        }
        for (name, value) in [
            ("limits.max_call_depth", self.limits.max_call_depth),
            ("limits.max_command_count", self.limits.max_command_count),
            ("limits.max_loop_iterations", self.limits.max_loop_iterations),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Initial working directory inside the virtual filesystem.
    pub cwd: String,
    /// Extra environment variables, layered over the built-in defaults.
    pub env: BTreeMap<String, String>,
    /// Files seeded into the in-memory filesystem at startup.
    pub files: BTreeMap<String, String>,
    pub prompt: String,
    pub history: HistoryConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            cwd: "/home/user".to_string(),
            env: BTreeMap::new(),
            files: BTreeMap::new(),
            prompt: "vsh:{cwd}$ ".to_string(),
            history: HistoryConfig::default(),
        }
    }
}

impl ShellConfig {
    /// Prompt with `{cwd}` substituted.
    #[must_use]
    pub fn render_prompt(&self, cwd: &str) -> String {
        self.prompt.replace("{cwd}", cwd)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub file: String,
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: "~/.vsh_history".to_string(),
            max_entries: 10000,
        }
    }
}

impl HistoryConfig {
    /// History file with a leading `~` replaced by the home directory.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        if let Some(rest) = self.file.strip_prefix("~/") {
            dirs::home_dir().map(|home| home.join(rest))
        } else if self.file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.file))
        }
    }
}

/// Bounds on runaway scripts. Each breach aborts only the offending
/// construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_call_depth: usize,
    pub max_command_count: usize,
    pub max_loop_iterations: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 100,
            max_command_count: 10_000,
            max_loop_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            filter: String::new(),
        }
    }
}

impl LoggingConfig {
    /// `filter` when set, otherwise the bare level.
    #[must_use]
    pub fn directive(&self) -> String {
        if self.filter.is_empty() {
            self.level.as_str().to_string()
        } else {
            self.filter.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}
