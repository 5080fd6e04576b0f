//! The contract leaf commands implement.
//!
//! Commands never see the interpreter directly. They get their arguments
//! (already expanded), the stdin produced for this invocation, and a
//! [`CommandContext`] exposing the filesystem, working directory, live
//! environment, and a re-entrant `exec` callback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use vsh_sdk::FileSystem;

use crate::error::ShellResult;
use crate::shell::Shell;

/// Output of one command or of a whole `exec` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: u8,
}

impl ExecResult {
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    #[must_use]
    pub fn failure(exit_code: u8, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    #[must_use]
    pub const fn with_code(exit_code: u8) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// `args` excludes the command name. Returning `Err` is reported as
    /// `<name>: <error>` with status 1.
    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult>;
}

/// What a running command may touch.
pub struct CommandContext<'a> {
    shell: &'a mut Shell,
    stdin: String,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(shell: &'a mut Shell, stdin: String) -> Self {
        Self { shell, stdin }
    }

    #[must_use]
    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.shell.fs)
    }

    #[must_use]
    pub fn cwd(&self) -> &str {
        &self.shell.state.cwd
    }

    #[must_use]
    pub fn env(&self) -> &HashMap<String, String> {
        &self.shell.state.env
    }

    pub fn env_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.shell.state.env
    }

    #[must_use]
    pub fn stdin(&self) -> &str {
        &self.stdin
    }

    /// Absolute, normalized form of `path` relative to the working directory.
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        self.shell.fs.resolve_path(&self.shell.state.cwd, path)
    }

    /// Runs `line` in the calling shell. Counts toward the current
    /// top-level command budget.
    pub async fn exec(&mut self, line: &str) -> ExecResult {
        self.shell.exec_nested(line).await
    }
}
