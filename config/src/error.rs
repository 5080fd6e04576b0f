use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while loading `vsh.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("bad ${{VAR}} pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}
