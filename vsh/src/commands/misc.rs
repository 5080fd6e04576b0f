use async_trait::async_trait;

use crate::command::{Command, CommandContext, ExecResult};
use crate::error::{ShellError, ShellResult};
use crate::eval::is_identifier;

pub struct True;

#[async_trait]
impl Command for True {
    fn name(&self) -> &str {
        "true"
    }

    async fn execute(&self, _args: &[String], _ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        Ok(ExecResult::with_code(0))
    }
}

pub struct False;

#[async_trait]
impl Command for False {
    fn name(&self) -> &str {
        "false"
    }

    async fn execute(&self, _args: &[String], _ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        Ok(ExecResult::with_code(1))
    }
}

/// `:` does nothing, successfully.
pub struct Colon;

#[async_trait]
impl Command for Colon {
    fn name(&self) -> &str {
        ":"
    }

    async fn execute(&self, _args: &[String], _ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        Ok(ExecResult::with_code(0))
    }
}

/// `test EXPR` and `[ EXPR ]`.
///
/// Status 0 if the expression is true, 1 if false, 2 if it is malformed.
pub struct Test {
    name: &'static str,
}

impl Test {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Command for Test {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let mut args: Vec<&str> = args.iter().map(String::as_str).collect();
        if self.name == "[" {
            if args.last() != Some(&"]") {
                return Ok(ExecResult::failure(2, "[: missing `]'\n"));
            }
            args.pop();
        }
        match evaluate(&args, ctx).await {
            Ok(true) => Ok(ExecResult::with_code(0)),
            Ok(false) => Ok(ExecResult::with_code(1)),
            Err(message) => Ok(ExecResult::failure(2, format!("{}: {message}\n", self.name))),
        }
    }
}

/// `-o` binds looser than `-a`, which binds looser than `!`.
fn evaluate<'a>(
    args: &'a [&'a str],
    ctx: &'a CommandContext<'_>,
) -> crate::eval::BoxFuture<'a, Result<bool, String>> {
    Box::pin(async move {
        if let Some(pos) = args.iter().rposition(|a| *a == "-o").filter(|&p| p > 0) {
            return Ok(evaluate(&args[..pos], ctx).await? || evaluate(&args[pos + 1..], ctx).await?);
        }
        if let Some(pos) = args.iter().rposition(|a| *a == "-a").filter(|&p| p > 0) {
            return Ok(evaluate(&args[..pos], ctx).await? && evaluate(&args[pos + 1..], ctx).await?);
        }
        match args {
            [] => Ok(false),
            ["!", rest @ ..] => Ok(!evaluate(rest, ctx).await?),
            ["(", inner @ .., ")"] => evaluate(inner, ctx).await,
            [s] => Ok(!s.is_empty()),
            ["-n", s] => Ok(!s.is_empty()),
            ["-z", s] => Ok(s.is_empty()),
            [op @ ("-e" | "-f" | "-d" | "-s" | "-r" | "-w" | "-x"), path] => {
                Ok(file_test(op, path, ctx).await)
            }
            [a, "=" | "==", b] => Ok(a == b),
            [a, "!=", b] => Ok(a != b),
            [a, op @ ("-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge"), b] => {
                let (a, b) = (integer(a)?, integer(b)?);
                Ok(match *op {
                    "-eq" => a == b,
                    "-ne" => a != b,
                    "-lt" => a < b,
                    "-le" => a <= b,
                    "-gt" => a > b,
                    _ => a >= b,
                })
            }
            [_, op, _] => Err(format!("{op}: binary operator expected")),
            [op, _] => Err(format!("{op}: unary operator expected")),
            _ => Err("too many arguments".to_string()),
        }
    })
}

fn integer(s: &str) -> Result<i64, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("{s}: integer expression expected"))
}

async fn file_test(op: &str, path: &str, ctx: &CommandContext<'_>) -> bool {
    let Ok(stat) = ctx.fs().stat(&ctx.resolve(path)).await else {
        return false;
    };
    match op {
        "-f" => stat.is_file(),
        "-d" => stat.is_dir(),
        "-s" => stat.size > 0,
        "-x" => stat.mode & 0o111 != 0,
        _ => true,
    }
}

/// Single-quotes `arg` for re-parsing.
fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// `env` lists exported variables; `env NAME=value... CMD ARGS...` runs a
/// command with extra variables set for its duration.
pub struct Env;

#[async_trait]
impl Command for Env {
    fn name(&self) -> &str {
        "env"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let split = args
            .iter()
            .take_while(|a| a.split_once('=').is_some_and(|(n, _)| is_identifier(n)))
            .count();
        let (assignments, command) = args.split_at(split);

        if command.is_empty() {
            let mut vars: Vec<(String, String)> = ctx
                .env()
                .iter()
                .filter(|(name, _)| is_identifier(name))
                .map(|(n, v)| (n.clone(), v.clone()))
                .collect();
            for assignment in assignments {
                if let Some((name, value)) = assignment.split_once('=') {
                    vars.retain(|(n, _)| n != name);
                    vars.push((name.to_string(), value.to_string()));
                }
            }
            vars.sort();
            let listing = vars
                .into_iter()
                .map(|(name, value)| format!("{name}={value}\n"))
                .collect::<String>();
            return Ok(ExecResult::success(listing));
        }

        let line = assignments
            .iter()
            .map(|a| match a.split_once('=') {
                Some((name, value)) => format!("{name}={}", quote(value)),
                None => quote(a),
            })
            .chain(command.iter().map(|a| quote(a)))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(ctx.exec(&line).await)
    }
}

/// `eval ARG...` joins its arguments and runs them as shell input.
pub struct Eval;

#[async_trait]
impl Command for Eval {
    fn name(&self) -> &str {
        "eval"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let line = args.join(" ");
        if line.trim().is_empty() {
            return Ok(ExecResult::with_code(0));
        }
        Ok(ctx.exec(&line).await)
    }
}

/// `xargs [-n N] [CMD ARGS...]` appends whitespace-separated stdin words to
/// the command (default `echo`).
pub struct Xargs;

#[async_trait]
impl Command for Xargs {
    fn name(&self) -> &str {
        "xargs"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let mut batch = usize::MAX;
        let mut rest = args;
        if let [flag, value, tail @ ..] = args {
            if flag == "-n" {
                batch = value
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ShellError::invalid_argument(format!("invalid number for -n: '{value}'")))?;
                rest = tail;
            }
        }

        let base = if rest.is_empty() {
            "echo".to_string()
        } else {
            rest.iter().map(|a| quote(a)).collect::<Vec<_>>().join(" ")
        };
        let items: Vec<String> = ctx.stdin().split_whitespace().map(quote).collect();

        let mut out = ExecResult::default();
        let mut chunks: Vec<&[String]> = items.chunks(batch).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }
        for chunk in chunks {
            let line = std::iter::once(base.clone())
                .chain(chunk.iter().cloned())
                .collect::<Vec<_>>()
                .join(" ");
            let result = ctx.exec(&line).await;
            out.stdout.push_str(&result.stdout);
            out.stderr.push_str(&result.stderr);
            if result.exit_code != 0 {
                out.exit_code = 123;
            }
        }
        Ok(out)
    }
}
