use crate::{ConfigError, VshConfig};
use regex::Regex;
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".config/vsh/vsh.yaml"));
        }
        search_paths.push(PathBuf::from("./vsh.yaml"));

        #[cfg(unix)]
        search_paths.insert(0, PathBuf::from("/etc/vsh/vsh.yaml"));

        Self {
            explicit_file: None,
            search_paths,
        }
    }

    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn load(&self) -> Result<VshConfig, ConfigError> {
        let mut config = VshConfig::default();

        let explicit = self
            .explicit_file
            .clone()
            .or_else(|| std::env::var("VSH_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            let content = read_file(&path)?;
            config = self.parse_yaml(&content)?;
        } else {
            for path in &self.search_paths {
                if path.exists() {
                    let content = read_file(path)?;
                    tracing::debug!(path = %path.display(), "merging config file");
                    config = self.merge_yaml(&config, &content)?;
                }
            }
        }

        self.apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(&self, content: &str) -> Result<VshConfig, ConfigError> {
        let expanded = self.expand_env_vars(content)?;
        if expanded.trim().is_empty() {
            return Ok(VshConfig::default());
        }
        Ok(serde_yaml::from_str(&expanded)?)
    }

    fn merge_yaml(&self, base: &VshConfig, content: &str) -> Result<VshConfig, ConfigError> {
        let overlay = self.parse_yaml(content)?;
        Ok(Self::merge_configs(base, &overlay))
    }

    /// Fields the overlay leaves at their defaults keep the base value;
    /// maps are merged key by key.
    fn merge_configs(base: &VshConfig, overlay: &VshConfig) -> VshConfig {
        let defaults = VshConfig::default();
        let mut result = base.clone();

        if overlay.shell.cwd != defaults.shell.cwd {
            result.shell.cwd.clone_from(&overlay.shell.cwd);
        }
        if overlay.shell.prompt != defaults.shell.prompt {
            result.shell.prompt.clone_from(&overlay.shell.prompt);
        }
        if overlay.shell.history != defaults.shell.history {
            result.shell.history = overlay.shell.history.clone();
        }
        result
            .shell
            .env
            .extend(overlay.shell.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        result
            .shell
            .files
            .extend(overlay.shell.files.iter().map(|(k, v)| (k.clone(), v.clone())));

        if overlay.limits.max_call_depth != defaults.limits.max_call_depth {
            result.limits.max_call_depth = overlay.limits.max_call_depth;
        }
        if overlay.limits.max_command_count != defaults.limits.max_command_count {
            result.limits.max_command_count = overlay.limits.max_command_count;
        }
        if overlay.limits.max_loop_iterations != defaults.limits.max_loop_iterations {
            result.limits.max_loop_iterations = overlay.limits.max_loop_iterations;
        }
        if overlay.logging != defaults.logging {
            result.logging = overlay.logging.clone();
        }

        result
    }

    /// Replaces `${VAR}` and `${VAR:-default}` with values from the process
    /// environment. Missing variables without a default become empty.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")?;
        Ok(re
            .replace_all(content, |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_else(|_| {
                    caps.get(2)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default()
                })
            })
            .to_string())
    }

    fn apply_env_overrides(&self, config: &mut VshConfig) {
        Self::apply_overrides_from(config, |name| std::env::var(name).ok());
    }

    fn apply_overrides_from(config: &mut VshConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(cwd) = lookup("VSH_CWD") {
            if !cwd.is_empty() {
                config.shell.cwd = cwd;
            }
        }
        for (name, slot) in [
            ("VSH_MAX_CALL_DEPTH", &mut config.limits.max_call_depth),
            ("VSH_MAX_COMMAND_COUNT", &mut config.limits.max_command_count),
            ("VSH_MAX_LOOP_ITERATIONS", &mut config.limits.max_loop_iterations),
        ] {
            if let Some(raw) = lookup(name) {
                match raw.trim().parse() {
                    Ok(value) => *slot = value,
                    Err(_) => tracing::warn!(var = name, value = %raw, "ignoring non-numeric override"),
                }
            }
        }
        if let Some(level) = lookup("VSH_LOG_LEVEL") {
            if let Ok(l) = serde_yaml::from_str(&level) {
                config.logging.level = l;
            }
        }
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogLevel;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn expand_env_vars_works() {
        std::env::set_var("VSH_TEST_VAR_123", "hello");
        let loader = ConfigLoader::new();
        let result = loader.expand_env_vars("value: ${VSH_TEST_VAR_123}").unwrap();
        assert_eq!(result, "value: hello");
        std::env::remove_var("VSH_TEST_VAR_123");
    }

    #[test]
    fn missing_env_var_uses_default_or_empty() {
        let loader = ConfigLoader::new();
        let result = loader
            .expand_env_vars("a: ${NONEXISTENT_VAR_XYZ}\nb: ${NONEXISTENT_VAR_XYZ:-/tmp}")
            .unwrap();
        assert_eq!(result, "a: \nb: /tmp");
    }

    #[test]
    fn overrides_apply_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("VSH_CWD", "/work"),
            ("VSH_MAX_CALL_DEPTH", "12"),
            ("VSH_MAX_LOOP_ITERATIONS", "many"),
            ("VSH_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = VshConfig::default();
        ConfigLoader::apply_overrides_from(&mut config, |name| {
            vars.get(name).map(ToString::to_string)
        });

        assert_eq!(config.shell.cwd, "/work");
        assert_eq!(config.limits.max_call_depth, 12);
        assert_eq!(config.limits.max_loop_iterations, 10_000);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn merge_keeps_base_when_overlay_is_default() {
        let loader = ConfigLoader::new();
        let base = loader
            .parse_yaml("limits:\n  max_call_depth: 7\nshell:\n  env:\n    A: one\n")
            .unwrap();
        let merged = loader
            .merge_yaml(&base, "shell:\n  env:\n    B: two\n")
            .unwrap();

        assert_eq!(merged.limits.max_call_depth, 7);
        assert_eq!(merged.shell.env.get("A").map(String::as_str), Some("one"));
        assert_eq!(merged.shell.env.get("B").map(String::as_str), Some("two"));
    }

    #[test]
    fn load_from_search_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "shell:\n  cwd: /srv\n  files:\n    /srv/readme: hi").unwrap();

        let config = ConfigLoader::new()
            .with_search_paths(vec![file.path().to_path_buf()])
            .load()
            .unwrap();
        assert_eq!(config.shell.cwd, "/srv");
        assert_eq!(
            config.shell.files.get("/srv/readme").map(String::as_str),
            Some("hi")
        );
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConfigLoader::new()
            .with_file("/definitely/not/here/vsh.yaml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn zero_limit_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "limits:\n  max_loop_iterations: 0").unwrap();

        let err = ConfigLoader::new().with_file(file.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }
}
