//! Integration tests for vsh
//!
//! This test harness:
//! 1. Discovers all .sh test scripts under tests/integration/scripts
//! 2. Runs each script in a fresh in-process shell
//! 3. Compares stdout with the expected .out file
//! 4. Reports differences
//!
//! The rest of the file checks properties that hold for any shell built
//! through the public API.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use vsh::{Command, CommandContext, ExecResult, ExecutionLimits, ShellBuilder, ShellResult};

/// Discover all .sh test scripts
fn discover_test_scripts() -> Vec<PathBuf> {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let scripts_dir = manifest_dir.join("tests/integration/scripts");

    let mut scripts = Vec::new();
    if let Ok(entries) = fs::read_dir(&scripts_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "sh") {
                scripts.push(path);
            }
        }
    }

    scripts.sort();
    scripts
}

#[derive(Debug)]
enum TestResult {
    Passed,
    Failed {
        expected: String,
        actual: String,
        stderr: String,
        exit_code: u8,
    },
    Skipped {
        reason: String,
    },
}

/// Run a single test script and compare output
async fn run_test_script(script_path: &Path) -> Result<TestResult, Box<dyn std::error::Error>> {
    let expected_path = script_path.with_extension("out");
    if !expected_path.exists() {
        return Ok(TestResult::Skipped {
            reason: format!("Missing expected output file: {}", expected_path.display()),
        });
    }
    let expected = fs::read_to_string(&expected_path)?;
    let source = fs::read_to_string(script_path)?;

    let mut shell = ShellBuilder::new().build();
    let result = shell.exec(&source).await;

    if result.stdout == expected {
        Ok(TestResult::Passed)
    } else {
        Ok(TestResult::Failed {
            expected,
            actual: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
        })
    }
}

fn indent(s: &str, prefix: &str) -> String {
    s.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn integration_scripts() {
    let scripts = discover_test_scripts();
    assert!(!scripts.is_empty(), "no test scripts found in tests/integration/scripts/");

    let mut passed = 0;
    let mut failed = 0;
    let mut skipped = 0;

    for script in &scripts {
        let name = script
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        print!("Running {name}... ");

        match run_test_script(script).await {
            Ok(TestResult::Passed) => {
                println!("PASSED");
                passed += 1;
            }
            Ok(TestResult::Failed {
                expected,
                actual,
                stderr,
                exit_code,
            }) => {
                println!("FAILED");
                println!("  Exit code: {exit_code}");
                println!("  Expected:\n{}", indent(&expected, "    "));
                println!("  Actual:\n{}", indent(&actual, "    "));
                if !stderr.is_empty() {
                    println!("  Stderr:\n{}", indent(&stderr, "    "));
                }
                failed += 1;
            }
            Ok(TestResult::Skipped { reason }) => {
                println!("SKIPPED: {reason}");
                skipped += 1;
            }
            Err(e) => {
                println!("ERROR: {e}");
                failed += 1;
            }
        }
    }

    println!();
    println!("Results: {passed} passed, {failed} failed, {skipped} skipped");
    assert_eq!(failed, 0, "{failed} script(s) failed");
}

#[tokio::test]
async fn chained_success_runs_both() {
    let mut sh = ShellBuilder::new().build();
    let out = sh.exec("echo first && echo second").await;
    assert_eq!(out.stdout, "first\nsecond\n");
    assert_eq!(out.exit_code, 0);
}

#[tokio::test]
async fn chained_failure_short_circuits() {
    let mut sh = ShellBuilder::new().build();
    let out = sh.exec("cat /nonexistent && echo second").await;
    assert_eq!(out.stdout, "");
    assert_eq!(out.exit_code, 1);
}

#[tokio::test]
async fn sequence_reports_last_status() {
    let mut sh = ShellBuilder::new().build();
    let out = sh.exec("echo a ; cat /missing").await;
    assert_eq!(out.stdout, "a\n");
    assert_eq!(out.exit_code, 1);
}

#[tokio::test]
async fn pipeline_output_is_not_duplicated() {
    let mut sh = ShellBuilder::new().build();
    assert_eq!(sh.exec("echo hi | cat | cat").await.stdout, "hi\n");
}

#[tokio::test]
async fn negation_parity() {
    let mut sh = ShellBuilder::new().build();
    for (line, code) in [
        ("true", 0),
        ("! true", 1),
        ("! ! true", 0),
        ("! ! ! true", 1),
        ("! false", 0),
        ("! ! false", 1),
    ] {
        assert_eq!(sh.exec(line).await.exit_code, code, "{line}");
    }
}

#[tokio::test]
async fn local_is_restored_after_failing_body() {
    let mut sh = ShellBuilder::new().build();
    sh.exec("X=outer\nf() {\n  local X=1\n  cat /missing\n  echo late\n}\nf")
        .await;
    assert_eq!(sh.get_var("X"), Some("outer"));
    assert!(sh.state().local_scopes.is_empty());
}

#[tokio::test]
async fn runaway_recursion_hits_call_depth() {
    let mut sh = ShellBuilder::new().build();
    let out = sh.exec("boom() { boom; }\nboom").await;
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("max_call_depth"), "{}", out.stderr);
    assert_eq!(sh.state().call_depth, 0);
}

#[tokio::test]
async fn infinite_loop_terminates() {
    let mut sh = ShellBuilder::new()
        .limits(ExecutionLimits {
            max_loop_iterations: 50,
            ..ExecutionLimits::default()
        })
        .build();
    let out = sh.exec("while true; do :; done").await;
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("max_loop_iterations"), "{}", out.stderr);

    let mut sh = ShellBuilder::new().build();
    let out = sh.exec("while true; do :; done").await;
    assert_eq!(out.exit_code, 1);
}

#[tokio::test]
async fn redirected_echo_round_trips() {
    let mut sh = ShellBuilder::new().build();
    sh.exec("echo X > f").await;
    assert_eq!(sh.fs().read_file("/home/user/f").await.unwrap(), "X\n");
    assert_eq!(sh.exec("cat f").await.stdout, "X\n");
}

#[tokio::test]
async fn unset_of_unknown_name_is_harmless() {
    let mut sh = ShellBuilder::new().build();
    let before = sh.state().env.clone();
    let out = sh.exec("unset UNDEFINED_VAR").await;
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stderr, "");
    assert_eq!(sh.state().env, before);
}

#[tokio::test]
async fn exec_is_deterministic() {
    let script = "for f in *.txt; do echo \"$f\"; done\nls\nwc a.txt b.txt";
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let mut sh = ShellBuilder::new()
            .file("a.txt", "one\n")
            .file("b.txt", "two words\n")
            .build();
        let out = sh.exec(script).await;
        outputs.push((out.stdout, out.stderr, out.exit_code));
    }
    assert_eq!(outputs[0], outputs[1]);
}

/// Uppercases its stdin.
struct Upper;

#[async_trait]
impl Command for Upper {
    fn name(&self) -> &str {
        "upper"
    }

    async fn execute(&self, _args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        Ok(ExecResult::success(ctx.stdin().to_uppercase()))
    }
}

#[tokio::test]
async fn registered_command_joins_pipelines() {
    let mut sh = ShellBuilder::new().command(Arc::new(Upper)).build();
    let out = sh.exec("echo shout | upper").await;
    assert_eq!(out.stdout, "SHOUT\n");
    assert!(sh.command_names().contains(&"upper"));
}

/// Fails the hard way.
struct Explode;

#[async_trait]
impl Command for Explode {
    fn name(&self) -> &str {
        "explode"
    }

    async fn execute(&self, args: &[String], _ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        panic!("bad input: {}", args.join(" "));
    }
}

#[tokio::test]
async fn panicking_command_becomes_a_failure() {
    let mut sh = ShellBuilder::new().command(Arc::new(Explode)).build();
    let out = sh.exec("explode now || echo recovered").await;
    assert_eq!(out.stdout, "recovered\n");
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stderr, "explode: bad input: now\n");

    let out = sh.exec("explode; echo $?").await;
    assert_eq!(out.stdout, "1\n");
    assert_eq!(sh.state().call_depth, 0);
}

#[tokio::test]
async fn nested_eval_is_bounded() {
    let mut sh = ShellBuilder::new().build();
    let out = sh.exec("X='eval \"$X\"'\neval \"$X\"\necho after $?").await;
    assert!(out.stderr.contains("max_call_depth"), "{}", out.stderr);
    assert_eq!(out.stdout, "after 1\n");
}

#[tokio::test]
async fn bare_shell_only_has_builtins() {
    let mut sh = ShellBuilder::new().without_default_commands().build();
    assert_eq!(sh.exec("echo hi").await.exit_code, 127);
    assert_eq!(sh.exec("X=1; export X").await.exit_code, 0);
}

#[tokio::test]
async fn exit_is_reported_to_the_caller() {
    let mut sh = ShellBuilder::new().build();
    let out = sh.exec("echo before\nexit 300\necho after").await;
    assert_eq!(out.stdout, "before\n");
    assert_eq!(out.exit_code, 44);
    assert_eq!(sh.exit_requested(), Some(44));
}

#[tokio::test]
async fn limits_come_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vsh.yaml");
    fs::write(&path, "limits:\n  max_call_depth: 3\n").unwrap();

    let config = vsh_config::load_from_file(path.to_str().unwrap()).unwrap();
    let limits = ExecutionLimits::from(&config.limits);
    assert_eq!(limits.max_call_depth, 3);

    let mut sh = ShellBuilder::new().limits(limits).build();
    let out = sh
        .exec("d() { echo $1; if [ $1 != xxxx ]; then d \"${1}x\"; fi; }\nd x")
        .await;
    assert_eq!(out.stdout, "x\nxx\nxxx\n");
    assert_eq!(out.exit_code, 1);
}
