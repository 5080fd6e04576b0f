//! vsh configuration.
//!
//! # Configuration Loading Priority
//!
//! 1. Compiled-in defaults
//! 2. `/etc/vsh/vsh.yaml` (system-wide)
//! 3. `~/.config/vsh/vsh.yaml` (user)
//! 4. `./vsh.yaml` (project-local)
//! 5. `VSH_CONFIG=/path/to/config.yaml` or `--config` (explicit, replaces 2-4)
//! 6. Environment variables (highest priority)
//!
//! # Example Configuration
//!
//! ```yaml
//! shell:
//!   cwd: /home/agent
//!   env:
//!     EDITOR: none
//!   files:
//!     /home/agent/notes.txt: "${NOTES:-empty}"
//!
//! limits:
//!   max_call_depth: 50
//!   max_loop_iterations: 1000
//!
//! logging:
//!   level: debug
//! ```

#![allow(missing_docs)]

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::*;

/// Load configuration from default locations.
///
/// Searches for config files in order and merges them.
/// Environment variables override file values.
pub fn load() -> Result<VshConfig, ConfigError> {
    ConfigLoader::new().load()
}

/// Load configuration from a specific file.
pub fn load_from_file(path: &str) -> Result<VshConfig, ConfigError> {
    ConfigLoader::new().with_file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VshConfig::default();
        assert_eq!(config.shell.cwd, "/home/user");
        assert_eq!(config.limits.max_call_depth, 100);
        assert_eq!(config.limits.max_command_count, 10_000);
        assert_eq!(config.limits.max_loop_iterations, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = r"
limits:
  max_call_depth: 20
";
        let config: VshConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.limits.max_call_depth, 20);
        assert_eq!(config.limits.max_command_count, 10_000); // default
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
shell:
  cwd: /workspace
  prompt: "agent:{cwd}> "
  env:
    LANG: C
  files:
    /workspace/a.txt: "alpha\n"
  history:
    enabled: false

limits:
  max_call_depth: 10
  max_command_count: 500
  max_loop_iterations: 50

logging:
  level: debug
  format: json
"#;
        let config: VshConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.shell.cwd, "/workspace");
        assert_eq!(config.shell.render_prompt("/tmp"), "agent:/tmp> ");
        assert_eq!(config.shell.files.len(), 1);
        assert!(!config.shell.history.enabled);
        assert_eq!(config.limits.max_command_count, 500);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.directive(), "debug");
    }

    #[test]
    fn relative_cwd_is_rejected() {
        let mut config = VshConfig::default();
        config.shell.cwd = "relative".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
