//! Embed vsh as a sandboxed scripting engine in your Rust application.
//!
//! Run:  cargo run -p vsh --example embed

use std::sync::Arc;

use async_trait::async_trait;
use vsh::{Command, CommandContext, ExecResult, ExecutionLimits, ShellBuilder, ShellResult};

fn print_result(label: &str, out: &ExecResult) {
    println!("\n== {label} ==");
    println!("exit: {}", out.exit_code);

    if out.stdout.is_empty() {
        println!("stdout: <empty>");
    } else {
        println!("stdout:\n{}", out.stdout);
    }

    if out.stderr.is_empty() {
        println!("stderr: <empty>");
    } else {
        println!("stderr:\n{}", out.stderr);
    }
}

/// `remember KEY VALUE` stores a variable from host code.
struct Remember;

#[async_trait]
impl Command for Remember {
    fn name(&self) -> &str {
        "remember"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let [key, value] = args else {
            return Ok(ExecResult::failure(2, "usage: remember KEY VALUE\n"));
        };
        ctx.env_mut().insert(key.clone(), value.clone());
        Ok(ExecResult::with_code(0))
    }
}

#[tokio::main]
async fn main() {
    let mut shell = ShellBuilder::new()
        .env("APP_NAME", "embed-demo")
        .file("/data/fruit.txt", "apple\nbanana\napricot\n")
        .limits(ExecutionLimits {
            max_loop_iterations: 100,
            ..ExecutionLimits::default()
        })
        .command(Arc::new(Remember))
        .build();

    println!("vsh embedded demo");
    println!("APP_NAME from builder env: {:?}", shell.get_var("APP_NAME"));

    let out = shell.exec("remember COLOR teal; echo $COLOR").await;
    print_result("registered command", &out);

    shell.set_var("EXPLICIT", "set_via_set_var");
    print_result("set_var/get_var", &shell.exec("echo $EXPLICIT").await);

    let out = shell.exec("for i in 1 2 3; do echo \"item $i\"; done").await;
    print_result("control flow (for loop)", &out);

    shell.exec("greet() { echo \"hello from $1\"; }").await;
    print_result("function call", &shell.exec("greet host").await);

    let out = shell.exec("grep ap /data/fruit.txt | wc -l").await;
    print_result("pipeline", &out);

    let out = shell.exec("while true; do :; done").await;
    print_result("runaway loop", &out);

    println!("\nregistered commands: {}", shell.command_names().join(" "));
}
