//! Shell state and entry points

use std::collections::HashMap;
use std::sync::Arc;

use vsh_core::MemoryFs;
use vsh_sdk::FileSystem;

use crate::ast::Script;
use crate::command::{Command, ExecResult};
use crate::eval::BoxFuture;
use crate::commands::default_commands;
use crate::guard::ExecutionLimits;

/// Interpreter state that persists across `exec` calls.
#[derive(Debug, Clone, Default)]
pub struct ShellState {
    pub cwd: String,
    pub previous_dir: Option<String>,
    pub env: HashMap<String, String>,
    pub functions: HashMap<String, Arc<Script>>,
    /// One frame per active function call: the value each `local` name had
    /// before the call, or `None` if it was unset.
    pub local_scopes: Vec<HashMap<String, Option<String>>>,
    pub call_depth: usize,
    pub command_count: usize,
    pub last_exit_code: u8,
}

/// Pending non-local control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Break(usize),
    Continue(usize),
    Return(u8),
    Exit(u8),
    /// Command budget spent; unwinds the whole top-level call.
    Abort,
}

pub struct Shell {
    pub(crate) state: ShellState,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) commands: HashMap<String, Arc<dyn Command>>,
    pub(crate) limits: ExecutionLimits,
    pub(crate) flow: Option<Flow>,
    pub(crate) loop_depth: usize,
    pub(crate) source_depth: usize,
    pub(crate) nested_depth: usize,
    exit_requested: Option<u8>,
}

impl Shell {
    #[must_use]
    pub fn builder() -> ShellBuilder {
        ShellBuilder::new()
    }

    /// Parses and runs one line (or a whole script). Never fails: syntax
    /// errors, missing commands and limit breaches all come back as a
    /// non-zero `exit_code` with a message on stderr.
    pub async fn exec(&mut self, line: &str) -> ExecResult {
        if self.state.call_depth == 0 {
            self.state.command_count = 0;
        }
        let result = self.run_line(line).await;
        match self.flow.take() {
            Some(Flow::Exit(code)) => {
                self.exit_requested = Some(code);
                self.finish(result, code)
            }
            Some(Flow::Abort) => self.finish(result, 1),
            _ => result,
        }
    }

    /// Re-entrant form used by `eval`, `source` and command callbacks;
    /// shares the command budget of the enclosing `exec`. Each level counts
    /// toward `max_call_depth` together with function calls.
    pub(crate) fn exec_nested<'a>(&'a mut self, line: &'a str) -> BoxFuture<'a, ExecResult> {
        Box::pin(async move {
            let depth = self.state.call_depth + self.nested_depth + 1;
            if let Err(breach) = self.limits.check_call_depth(depth) {
                self.state.last_exit_code = 1;
                return ExecResult::failure(1, breach.message());
            }
            self.nested_depth += 1;
            let result = self.run_line(line).await;
            self.nested_depth -= 1;
            result
        })
    }

    async fn run_line(&mut self, line: &str) -> ExecResult {
        let script = match crate::parser::parse(line) {
            Ok(script) => script,
            Err(e) => {
                let result = ExecResult::failure(e.exit_code(), format!("vsh: {e}\n"));
                self.state.last_exit_code = result.exit_code;
                return result;
            }
        };
        if script.is_empty() {
            return ExecResult::default();
        }
        let result = self.run_script(&script, "").await;
        self.state.last_exit_code = result.exit_code;
        result
    }

    fn finish(&mut self, mut result: ExecResult, code: u8) -> ExecResult {
        result.exit_code = code;
        self.state.last_exit_code = code;
        result
    }

    #[must_use]
    pub fn state(&self) -> &ShellState {
        &self.state
    }

    #[must_use]
    pub fn cwd(&self) -> &str {
        &self.state.cwd
    }

    #[must_use]
    pub const fn last_exit_code(&self) -> u8 {
        self.state.last_exit_code
    }

    /// Set once `exit` has run at top level; the REPL stops on it.
    #[must_use]
    pub const fn exit_requested(&self) -> Option<u8> {
        self.exit_requested
    }

    #[must_use]
    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    #[must_use]
    pub const fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub fn set_var(&mut self, name: &str, value: &str) {
        self.state.env.insert(name.to_string(), value.to_string());
    }

    #[must_use]
    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.state.env.get(name).map(String::as_str)
    }

    pub fn unset_var(&mut self, name: &str) {
        self.state.env.remove(name);
    }

    /// Registers (or replaces) a command.
    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.insert(command.name().to_string(), command);
    }

    /// Names of every registered command, sorted.
    #[must_use]
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Replaces `$1..$N`, `$#` and `$@`.
    pub(crate) fn set_positional(&mut self, params: &[String]) {
        self.clear_positional();
        for (idx, value) in params.iter().enumerate() {
            self.state.env.insert((idx + 1).to_string(), value.clone());
        }
        self.state.env.insert("#".to_string(), params.len().to_string());
        self.state.env.insert("@".to_string(), params.join(" "));
    }

    pub(crate) fn clear_positional(&mut self) {
        let count: usize = self
            .state
            .env
            .get("#")
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        for n in 1..=count {
            self.state.env.remove(&n.to_string());
        }
        self.state.env.remove("#");
        self.state.env.remove("@");
    }
}

/// Configures and creates a [`Shell`].
pub struct ShellBuilder {
    fs: Option<Arc<dyn FileSystem>>,
    files: Vec<(String, String)>,
    cwd: String,
    env: HashMap<String, String>,
    limits: ExecutionLimits,
    commands: Vec<Arc<dyn Command>>,
    default_commands: bool,
}

impl Default for ShellBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fs: None,
            files: Vec::new(),
            cwd: "/home/user".to_string(),
            env: HashMap::new(),
            limits: ExecutionLimits::default(),
            commands: Vec::new(),
            default_commands: true,
        }
    }

    /// Runs against `fs` instead of a fresh [`MemoryFs`]. Seed files are
    /// ignored in that case.
    #[must_use]
    pub fn filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    #[must_use]
    pub fn file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    #[must_use]
    pub fn files<I, P, C>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        self.files
            .extend(files.into_iter().map(|(p, c)| (p.into(), c.into())));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub const fn limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn command(mut self, command: Arc<dyn Command>) -> Self {
        self.commands.push(command);
        self
    }

    #[must_use]
    pub const fn without_default_commands(mut self) -> Self {
        self.default_commands = false;
        self
    }

    #[must_use]
    pub fn build(self) -> Shell {
        let cwd = vsh_sdk::path::normalize_path(&self.cwd);
        let fs = self.fs.unwrap_or_else(|| {
            let memfs = MemoryFs::new();
            memfs.seed_dir(&cwd);
            for (path, content) in &self.files {
                memfs.seed_file(&vsh_sdk::path::resolve_path(&cwd, path), content.clone());
            }
            Arc::new(memfs)
        });

        let mut env = HashMap::from([
            ("HOME".to_string(), "/home/user".to_string()),
            ("PATH".to_string(), "/bin:/usr/bin".to_string()),
            ("USER".to_string(), "user".to_string()),
        ]);
        env.extend(self.env);
        env.insert("PWD".to_string(), cwd.clone());

        let mut shell = Shell {
            state: ShellState {
                cwd,
                env,
                ..ShellState::default()
            },
            fs,
            commands: HashMap::new(),
            limits: self.limits,
            flow: None,
            loop_depth: 0,
            source_depth: 0,
            nested_depth: 0,
            exit_requested: None,
        };
        if self.default_commands {
            for command in default_commands() {
                shell.register(command);
            }
        }
        for command in self.commands {
            shell.register(command);
        }
        tracing::debug!(
            cwd = %shell.state.cwd,
            commands = shell.commands.len(),
            "shell ready"
        );
        shell
    }
}
