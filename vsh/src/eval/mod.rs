//! Evaluator for parsed scripts
//!
//! Everything here returns an [`ExecResult`]; failures that a real shell
//! reports on stderr are reported the same way. Non-local control flow
//! (`break`, `return`, `exit`, a spent command budget) travels in
//! `Shell::flow` and is consumed by the construct it targets.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;

use crate::ast::{
    ChainOperator, Command, Pipeline, PipelineStage, RedirectKind, Redirection, Script,
    SimpleCommand, Statement, Word,
};
use crate::command::{CommandContext, ExecResult};
use crate::shell::{Flow, Shell};

mod builtins_shell;
mod control_flow;
mod expansion;
mod utils;

pub use utils::is_identifier;
pub(crate) use utils::{double_quote, interpret_escape_sequences, match_glob_pattern};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const DEV_NULL: &str = "/dev/null";

impl Shell {
    /// Runs statements in order. Each statement's stdout is also the next
    /// statement's stdin.
    pub(crate) fn run_script<'a>(
        &'a mut self,
        script: &'a Script,
        stdin: &'a str,
    ) -> BoxFuture<'a, ExecResult> {
        Box::pin(async move {
            self.state.command_count += 1;
            if let Err(breach) = self.limits.check_command_count(self.state.command_count) {
                self.flow = Some(Flow::Abort);
                return ExecResult::failure(1, breach.message());
            }

            let mut out = ExecResult::default();
            let mut input = stdin.to_string();
            for statement in &script.statements {
                let result = self.run_statement(statement, &input).await;
                out.stdout.push_str(&result.stdout);
                out.stderr.push_str(&result.stderr);
                out.exit_code = result.exit_code;
                self.state.last_exit_code = result.exit_code;
                input = result.stdout;
                if self.flow.is_some() {
                    break;
                }
            }
            out
        })
    }

    pub(crate) fn run_statement<'a>(
        &'a mut self,
        statement: &'a Statement,
        stdin: &'a str,
    ) -> BoxFuture<'a, ExecResult> {
        Box::pin(async move {
            match statement {
                Statement::Pipeline(pipeline) => self.run_pipeline(pipeline, stdin).await,
                Statement::If(stmt) => self.run_if(stmt, stdin).await,
                Statement::For(stmt) => self.run_for(stmt, stdin).await,
                Statement::While(stmt) => self.run_while(stmt, stdin, false).await,
                Statement::Until(stmt) => self.run_while(stmt, stdin, true).await,
                Statement::FunctionDef(def) => {
                    tracing::debug!(function = %def.name, "defined function");
                    self.state
                        .functions
                        .insert(def.name.clone(), Arc::new(def.body.clone()));
                    ExecResult::with_code(0)
                }
            }
        })
    }

    async fn run_pipeline(&mut self, pipeline: &Pipeline, stdin: &str) -> ExecResult {
        let mut out = ExecResult::default();
        let mut last = self.state.last_exit_code;

        for run in pipe_runs(&pipeline.stages) {
            let head = &run[0];
            let gated = match head.chain {
                Some(ChainOperator::And) => last == 0,
                Some(ChainOperator::Or) => last != 0,
                Some(ChainOperator::Sequence) | None => true,
            };
            if !gated {
                continue;
            }

            let mut piped: Option<String> = None;
            let mut code = 0;
            for stage in run {
                let input = piped.take().unwrap_or_else(|| stdin.to_string());
                let result = self.run_stage(stage, &input).await;
                out.stderr.push_str(&result.stderr);
                code = result.exit_code;
                piped = Some(result.stdout);
                if self.flow.is_some() {
                    break;
                }
            }
            out.stdout.push_str(&piped.unwrap_or_default());

            if head.negation_count % 2 == 1 {
                code = u8::from(code == 0);
            }
            last = code;
            out.exit_code = code;
            self.state.last_exit_code = code;
            if self.flow.is_some() {
                break;
            }
        }
        out
    }

    async fn run_stage(&mut self, stage: &PipelineStage, stdin: &str) -> ExecResult {
        match &stage.command {
            Command::Simple(simple) => self.run_simple(simple, stdin).await,
            Command::Compound {
                statement,
                redirections,
            } => {
                let input = match self.redirected_stdin(redirections).await {
                    Ok(Some(input)) => input,
                    Ok(None) => stdin.to_string(),
                    Err(failure) => return failure,
                };
                let result = self.run_statement(statement, &input).await;
                self.apply_redirections(result, redirections).await
            }
        }
    }

    async fn run_simple(&mut self, command: &SimpleCommand, stdin: &str) -> ExecResult {
        let assignments = command
            .words
            .iter()
            .take_while(|w| assignment_parts(w).is_some())
            .count();

        if assignments == command.words.len() {
            for word in &command.words {
                if let Some((name, value)) = assignment_parts(word) {
                    let value = self.expand_word(&value);
                    self.set_var(&name, &value);
                }
            }
            let result = ExecResult::with_code(0);
            return self.apply_redirections(result, &command.redirections).await;
        }

        // `NAME=value cmd`: the assignment only lives for this command.
        let mut saved = Vec::with_capacity(assignments);
        for word in &command.words[..assignments] {
            if let Some((name, value)) = assignment_parts(word) {
                let value = self.expand_word(&value);
                saved.push((name.clone(), self.state.env.get(&name).cloned()));
                self.set_var(&name, &value);
            }
        }

        let result = self.run_command_words(command, assignments, stdin).await;

        for (name, previous) in saved.into_iter().rev() {
            match previous {
                Some(value) => self.set_var(&name, &value),
                None => self.unset_var(&name),
            }
        }
        result
    }

    async fn run_command_words(
        &mut self,
        command: &SimpleCommand,
        skip: usize,
        stdin: &str,
    ) -> ExecResult {
        let input = match self.redirected_stdin(&command.redirections).await {
            Ok(Some(input)) => input,
            Ok(None) => stdin.to_string(),
            Err(failure) => return failure,
        };

        let mut fields = self.expand_words(&command.words[skip..]).await;
        if fields.is_empty() {
            let result = ExecResult::with_code(0);
            return self.apply_redirections(result, &command.redirections).await;
        }
        let name = fields.remove(0);
        let result = self.dispatch(&name, &fields, &input).await;
        self.apply_redirections(result, &command.redirections).await
    }

    /// Builtins, then functions, then registered commands. A panic inside a
    /// registered command becomes an exit status of 1.
    pub(crate) fn dispatch<'a>(
        &'a mut self,
        name: &'a str,
        args: &'a [String],
        stdin: &'a str,
    ) -> BoxFuture<'a, ExecResult> {
        Box::pin(async move {
            tracing::debug!(command = %name, args = args.len(), "dispatching");

            if let Some(result) = self.run_builtin(name, args).await {
                return result;
            }
            if let Some(body) = self.state.functions.get(name).cloned() {
                return self.call_function(name, &body, args, stdin).await;
            }
            let Some(command) = self.commands.get(name).cloned() else {
                return ExecResult::failure(127, format!("vsh: {name}: command not found\n"));
            };

            let mut ctx = CommandContext::new(self, stdin.to_string());
            let outcome = AssertUnwindSafe(command.execute(args, &mut ctx))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tracing::debug!(command = %name, error = %e, "command failed");
                    ExecResult::failure(1, format!("{name}: {e}\n"))
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(command = %name, panic = %message, "command panicked");
                    ExecResult::failure(1, format!("{name}: {message}\n"))
                }
            }
        })
    }

    /// Reads the last `<` target, if any. A missing file fails the stage
    /// before the command runs.
    async fn redirected_stdin(
        &mut self,
        redirections: &[Redirection],
    ) -> Result<Option<String>, ExecResult> {
        let Some(target) = redirections
            .iter()
            .rev()
            .find(|r| r.kind == RedirectKind::Stdin)
            .and_then(|r| r.target.as_ref())
        else {
            return Ok(None);
        };
        let target = self.expand_word(target);
        if target == DEV_NULL {
            return Ok(Some(String::new()));
        }
        let path = self.fs.resolve_path(&self.state.cwd, &target);
        match self.fs.read_file(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) => Err(ExecResult::failure(1, format!("vsh: {target}: {}\n", e.reason()))),
        }
    }

    /// `2>&1` first, then `>`/`>>` and `2>`/`2>>`. Every output target is
    /// created or truncated; only the last of each stream gets the content.
    async fn apply_redirections(
        &mut self,
        mut result: ExecResult,
        redirections: &[Redirection],
    ) -> ExecResult {
        if redirections.is_empty() {
            return result;
        }
        if redirections.iter().any(|r| r.kind == RedirectKind::StderrToStdout) {
            let stderr = std::mem::take(&mut result.stderr);
            result.stdout.push_str(&stderr);
        }

        let last_out = redirections.iter().rposition(|r| r.kind == RedirectKind::Stdout);
        let last_err = redirections.iter().rposition(|r| r.kind == RedirectKind::Stderr);
        let mut failures = String::new();

        for (idx, redirection) in redirections.iter().enumerate() {
            let Some(target) = &redirection.target else {
                continue;
            };
            let content = match redirection.kind {
                RedirectKind::Stdout if Some(idx) == last_out => std::mem::take(&mut result.stdout),
                RedirectKind::Stderr if Some(idx) == last_err => std::mem::take(&mut result.stderr),
                RedirectKind::Stdout | RedirectKind::Stderr => String::new(),
                RedirectKind::Stdin | RedirectKind::StderrToStdout => continue,
            };
            if let Err(message) = self.write_redirect(target, &content, redirection.append).await {
                failures.push_str(&message);
            }
        }

        if !failures.is_empty() {
            result.stderr.push_str(&failures);
            result.exit_code = 1;
        }
        result
    }

    async fn write_redirect(&mut self, target: &Word, content: &str, append: bool) -> Result<(), String> {
        let target = self.expand_word(target);
        if target == DEV_NULL {
            return Ok(());
        }
        let path = self.fs.resolve_path(&self.state.cwd, &target);
        let written = if append {
            self.fs.append_file(&path, content).await
        } else {
            self.fs.write_file(&path, content).await
        };
        written.map_err(|e| {
            tracing::debug!(path = %path, error = %e, "redirect failed");
            format!("vsh: {target}: {}\n", e.reason())
        })
    }
}

/// Splits stages into pipe-connected runs.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "command panicked".to_string()
    }
}

fn pipe_runs(stages: &[PipelineStage]) -> Vec<&[PipelineStage]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for idx in 1..=stages.len() {
        if idx == stages.len() || stages[idx].chain.is_some() {
            runs.push(&stages[start..idx]);
            start = idx;
        }
    }
    runs
}

/// `NAME=rest` where the name part is unquoted text. Returns the name and
/// the value as a word so quoting inside the value is kept.
fn assignment_parts(word: &Word) -> Option<(String, Word)> {
    let first = word.fragments.first()?;
    if first.quoting != crate::ast::Quoting::Unquoted {
        return None;
    }
    let (name, head) = utils::split_assignment(&first.text)?;
    let mut fragments = Vec::with_capacity(word.fragments.len());
    if !head.is_empty() {
        fragments.push(crate::ast::Fragment::new(crate::ast::Quoting::Unquoted, head));
    }
    fragments.extend(word.fragments[1..].iter().cloned());
    Some((name.to_string(), Word::from_fragments(fragments)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ShellBuilder;

    fn shell() -> Shell {
        ShellBuilder::new().file("/data.txt", "one\ntwo\n").build()
    }

    #[tokio::test]
    async fn test_chain_and() {
        let mut sh = shell();
        let out = sh.exec("echo first && echo second").await;
        assert_eq!(out.stdout, "first\nsecond\n");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_chain_and_stops_on_failure() {
        let mut sh = shell();
        let out = sh.exec("cat /nonexistent && echo second").await;
        assert_eq!(out.stdout, "");
        assert_eq!(out.exit_code, 1);
    }

    #[tokio::test]
    async fn test_sequence_takes_last_status() {
        let mut sh = shell();
        let out = sh.exec("echo a ; cat /missing").await;
        assert_eq!(out.stdout, "a\n");
        assert_eq!(out.exit_code, 1);
    }

    #[tokio::test]
    async fn test_pipe_passes_stdout() {
        let mut sh = shell();
        let out = sh.exec("echo hi | cat | cat").await;
        assert_eq!(out.stdout, "hi\n");
    }

    #[tokio::test]
    async fn test_or_runs_after_failure() {
        let mut sh = shell();
        let out = sh.exec("false || echo recovered").await;
        assert_eq!(out.stdout, "recovered\n");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_negation_parity() {
        let mut sh = shell();
        assert_eq!(sh.exec("! true").await.exit_code, 1);
        assert_eq!(sh.exec("! false").await.exit_code, 0);
        assert_eq!(sh.exec("! ! true").await.exit_code, 0);
        assert_eq!(sh.exec("! ! ! cat /missing").await.exit_code, 0);
        assert_eq!(sh.exec("! echo x | false").await.exit_code, 0);
    }

    #[tokio::test]
    async fn test_chain_operands_do_not_share_stdin() {
        let mut sh = shell();
        let out = sh.exec("echo piped | cat && cat").await;
        assert_eq!(out.stdout, "piped\n");
    }

    #[tokio::test]
    async fn test_command_not_found() {
        let mut sh = shell();
        let out = sh.exec("nosuchcmd arg").await;
        assert_eq!(out.exit_code, 127);
        assert_eq!(out.stderr, "vsh: nosuchcmd: command not found\n");
    }

    #[tokio::test]
    async fn test_syntax_error_exit_code() {
        let mut sh = shell();
        let out = sh.exec("if true; echo x; fi").await;
        assert_eq!(out.exit_code, 2);
        assert!(out.stderr.starts_with("vsh: syntax error"));
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_overly_nested_script_is_a_syntax_error() {
        let mut sh = shell();
        let script = format!("{}echo x{}", "{ ".repeat(1000), "; }".repeat(1000));
        let out = sh.exec(&script).await;
        assert_eq!(out.exit_code, 2);
        assert!(out.stderr.contains("nested deeper than"), "{}", out.stderr);
        assert_eq!(sh.exec("{ { echo ok; }; }").await.stdout, "ok\n");
    }

    #[tokio::test]
    async fn test_empty_line() {
        let mut sh = shell();
        assert_eq!(sh.exec("   ").await, ExecResult::default());
    }

    #[tokio::test]
    async fn test_redirect_stdout_writes_file() {
        let mut sh = shell();
        let out = sh.exec("echo X > f").await;
        assert_eq!(out.stdout, "");
        let content = sh.fs().read_file("/home/user/f").await.unwrap();
        assert_eq!(content, "X\n");

        sh.exec("echo Y >> f").await;
        assert_eq!(sh.exec("cat f").await.stdout, "X\nY\n");
    }

    #[tokio::test]
    async fn test_redirect_merge_then_file() {
        let mut sh = shell();
        sh.exec("cat /missing > out 2>&1").await;
        let content = sh.fs().read_file("/home/user/out").await.unwrap();
        assert!(content.contains("No such file or directory"));

        let out = sh.exec("cat /missing &> both").await;
        assert_eq!(out.stderr, "");
    }

    #[tokio::test]
    async fn test_only_last_stdout_target_gets_content() {
        let mut sh = shell();
        sh.exec("echo hi > a > b").await;
        assert_eq!(sh.exec("cat a").await.stdout, "");
        assert_eq!(sh.exec("cat b").await.stdout, "hi\n");
    }

    #[tokio::test]
    async fn test_dev_null() {
        let mut sh = shell();
        let out = sh.exec("cat /missing 2>/dev/null").await;
        assert_eq!(out.stderr, "");
        assert_eq!(out.exit_code, 1);
        assert_eq!(sh.exec("cat < /dev/null").await.stdout, "");
    }

    #[tokio::test]
    async fn test_stdin_redirect() {
        let mut sh = shell();
        assert_eq!(sh.exec("cat < /data.txt").await.stdout, "one\ntwo\n");

        let out = sh.exec("echo never < /missing").await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stdout, "");
        assert_eq!(out.stderr, "vsh: /missing: No such file or directory\n");
    }

    #[tokio::test]
    async fn test_redirect_write_failure() {
        let mut sh = shell();
        let out = sh.exec("echo x > /no/such/dir/file").await;
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("No such file or directory"));
    }

    #[tokio::test]
    async fn test_assignments() {
        let mut sh = shell();
        let out = sh.exec("A=1 B=\"two words\"").await;
        assert_eq!(out.exit_code, 0);
        assert_eq!(sh.get_var("B"), Some("two words"));
        assert_eq!(sh.exec("echo $A $B").await.stdout, "1 two words\n");
    }

    #[tokio::test]
    async fn test_prefix_assignment_is_temporary() {
        let mut sh = shell();
        let out = sh.exec("GREETING=hey env").await;
        assert!(out.stdout.contains("GREETING=hey\n"));
        assert_eq!(sh.get_var("GREETING"), None);
    }

    #[tokio::test]
    async fn test_statement_stdout_threads_to_next_statement() {
        let mut sh = shell();
        let out = sh.exec("echo carried\ncat").await;
        assert_eq!(out.stdout, "carried\ncarried\n");
    }

    #[tokio::test]
    async fn test_compound_stage_redirect() {
        let mut sh = shell();
        sh.exec("for i in 1 2; do echo $i; done > nums").await;
        assert_eq!(sh.exec("cat nums").await.stdout, "1\n2\n");
        let out = sh.exec("if true; then echo yes; fi | cat").await;
        assert_eq!(out.stdout, "yes\n");
    }

    #[tokio::test]
    async fn test_unset_undefined_never_errors() {
        let mut sh = shell();
        let before = sh.state().env.clone();
        let out = sh.exec("unset UNDEFINED_VAR").await;
        assert_eq!(out.exit_code, 0);
        assert_eq!(sh.state().env, before);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let mut a = shell();
        let mut b = shell();
        let script = "X=3; for f in *; do echo $f; done; echo $X $$ $?";
        assert_eq!(a.exec(script).await, b.exec(script).await);
    }
}
