use std::collections::HashMap;

use crate::ast::{ForLoop, IfStatement, Script, WhileLoop};
use crate::command::ExecResult;
use crate::eval::BoxFuture;
use crate::guard::LimitExceeded;
use crate::shell::{Flow, Shell};

impl Shell {
    pub(crate) async fn run_if(&mut self, stmt: &IfStatement, stdin: &str) -> ExecResult {
        let mut out = ExecResult::default();
        for branch in &stmt.branches {
            if let Some(condition) = &branch.condition {
                let cond = self.run_script(condition, stdin).await;
                out.stdout.push_str(&cond.stdout);
                out.stderr.push_str(&cond.stderr);
                if self.flow.is_some() {
                    out.exit_code = cond.exit_code;
                    return out;
                }
                if cond.exit_code != 0 {
                    continue;
                }
            }
            let body = self.run_script(&branch.body, stdin).await;
            out.stdout.push_str(&body.stdout);
            out.stderr.push_str(&body.stderr);
            out.exit_code = body.exit_code;
            return out;
        }
        out.exit_code = 0;
        out
    }

    pub(crate) async fn run_for(&mut self, stmt: &ForLoop, stdin: &str) -> ExecResult {
        let items = match &stmt.items {
            Some(words) => self.expand_words(words).await,
            None => self.positional_params(),
        };

        let mut out = ExecResult::default();
        let mut counter = self.limits.loop_counter();
        self.loop_depth += 1;
        for item in items {
            if let Err(breach) = counter.tick() {
                limit_breached(&mut out, &breach);
                break;
            }
            self.set_var(&stmt.variable, &item);
            let body = self.run_script(&stmt.body, stdin).await;
            out.stdout.push_str(&body.stdout);
            out.stderr.push_str(&body.stderr);
            out.exit_code = body.exit_code;
            if self.loop_should_stop() {
                break;
            }
        }
        self.loop_depth -= 1;
        self.unset_var(&stmt.variable);
        out
    }

    /// `until` is `while` with the condition inverted.
    pub(crate) async fn run_while(&mut self, stmt: &WhileLoop, stdin: &str, until: bool) -> ExecResult {
        let mut out = ExecResult::default();
        let mut counter = self.limits.loop_counter();
        self.loop_depth += 1;
        loop {
            let cond = self.run_script(&stmt.condition, stdin).await;
            out.stdout.push_str(&cond.stdout);
            out.stderr.push_str(&cond.stderr);
            if self.flow.is_some() {
                if matches!(self.flow, Some(Flow::Abort)) {
                    out.exit_code = cond.exit_code;
                }
                if self.loop_should_stop() {
                    break;
                }
                continue;
            }
            if (cond.exit_code == 0) == until {
                break;
            }
            if let Err(breach) = counter.tick() {
                limit_breached(&mut out, &breach);
                break;
            }
            let body = self.run_script(&stmt.body, stdin).await;
            out.stdout.push_str(&body.stdout);
            out.stderr.push_str(&body.stderr);
            out.exit_code = body.exit_code;
            if self.loop_should_stop() {
                break;
            }
        }
        self.loop_depth -= 1;
        out
    }

    /// Consumes a `break`/`continue` aimed at the innermost loop. True when
    /// the loop has to end, either because of `break` or because some other
    /// transfer (an outer `break N`, `return`, `exit`) is unwinding.
    fn loop_should_stop(&mut self) -> bool {
        match self.flow {
            None => false,
            Some(Flow::Continue(1)) => {
                self.flow = None;
                false
            }
            Some(Flow::Break(1)) => {
                self.flow = None;
                true
            }
            Some(Flow::Break(n)) => {
                self.flow = Some(Flow::Break(n - 1));
                true
            }
            Some(Flow::Continue(n)) => {
                self.flow = Some(Flow::Continue(n - 1));
                true
            }
            Some(Flow::Return(_) | Flow::Exit(_) | Flow::Abort) => true,
        }
    }

    /// Runs a user function with its own positional parameters and local
    /// scope. Depth, scope and parameters are restored on every path.
    pub(crate) fn call_function<'a>(
        &'a mut self,
        name: &'a str,
        body: &'a Script,
        args: &'a [String],
        stdin: &'a str,
    ) -> BoxFuture<'a, ExecResult> {
        Box::pin(async move {
            self.state.call_depth += 1;
            let depth = self.state.call_depth + self.nested_depth;
            if let Err(breach) = self.limits.check_call_depth(depth) {
                self.state.call_depth -= 1;
                return ExecResult::failure(1, breach.message());
            }
            tracing::trace!(function = %name, depth = self.state.call_depth, "calling function");

            let caller_params = self
                .state
                .env
                .contains_key("#")
                .then(|| self.positional_params());
            self.state.local_scopes.push(HashMap::new());
            self.set_positional(args);
            let caller_loop_depth = std::mem::replace(&mut self.loop_depth, 0);

            let mut result = self.run_script(body, stdin).await;
            match self.flow {
                Some(Flow::Return(code)) => {
                    result.exit_code = code;
                    self.flow = None;
                }
                Some(Flow::Break(_) | Flow::Continue(_)) => self.flow = None,
                _ => {}
            }

            self.loop_depth = caller_loop_depth;
            if let Some(frame) = self.state.local_scopes.pop() {
                for (var, previous) in frame {
                    match previous {
                        Some(value) => self.set_var(&var, &value),
                        None => self.unset_var(&var),
                    }
                }
            }
            match caller_params {
                Some(params) => self.set_positional(&params),
                None => self.clear_positional(),
            }
            self.state.call_depth -= 1;
            self.state.last_exit_code = result.exit_code;
            result
        })
    }
}

fn limit_breached(out: &mut ExecResult, breach: &LimitExceeded) {
    out.stderr.push_str(&breach.message());
    out.exit_code = 1;
}

#[cfg(test)]
mod tests {
    use crate::guard::ExecutionLimits;
    use crate::shell::ShellBuilder;

    #[tokio::test]
    async fn test_if_elif_else() {
        let mut sh = ShellBuilder::new().build();
        let script = "for n in 1 2 3; do\n\
                      if test $n = 1; then echo one\n\
                      elif test $n = 2; then echo two\n\
                      else echo many; fi\n\
                      done";
        assert_eq!(sh.exec(script).await.stdout, "one\ntwo\nmany\n");
    }

    #[tokio::test]
    async fn test_if_without_matching_branch_is_zero() {
        let mut sh = ShellBuilder::new().build();
        let out = sh.exec("if false; then echo no; fi").await;
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "");
    }

    #[tokio::test]
    async fn test_for_variable_removed_afterwards() {
        let mut sh = ShellBuilder::new().build();
        let out = sh.exec("for x in a b; do echo $x; done; echo \"[$x]\"").await;
        assert_eq!(out.stdout, "a\nb\n[]\n");
    }

    #[tokio::test]
    async fn test_for_splits_unquoted_items() {
        let mut sh = ShellBuilder::new().build();
        let out = sh
            .exec("L=\"1 2\"; for i in $L \"3 4\"; do echo \"<$i>\"; done")
            .await;
        assert_eq!(out.stdout, "<1>\n<2>\n<3 4>\n");
    }

    #[tokio::test]
    async fn test_while_and_until() {
        let mut sh = ShellBuilder::new().build();
        sh.exec("echo > flag").await;
        let out = sh
            .exec("while test -f flag; do echo tick; rm flag; done")
            .await;
        assert_eq!(out.stdout, "tick\n");

        let out = sh.exec("until test -f flag; do echo tock; touch flag; done").await;
        assert_eq!(out.stdout, "tock\n");
    }

    #[tokio::test]
    async fn test_break_and_continue() {
        let mut sh = ShellBuilder::new().build();
        let out = sh
            .exec("for i in 1 2 3 4; do if test $i = 2; then continue; fi; if test $i = 4; then break; fi; echo $i; done")
            .await;
        assert_eq!(out.stdout, "1\n3\n");
    }

    #[tokio::test]
    async fn test_break_outer_loop() {
        let mut sh = ShellBuilder::new().build();
        let out = sh
            .exec("for a in x y; do for b in 1 2; do echo $a$b; break 2; done; done; echo after")
            .await;
        assert_eq!(out.stdout, "x1\nafter\n");
    }

    #[tokio::test]
    async fn test_loop_limit_is_per_instance() {
        let limits = ExecutionLimits {
            max_loop_iterations: 3,
            ..ExecutionLimits::default()
        };
        let mut sh = ShellBuilder::new().limits(limits).build();
        let out = sh.exec("for i in 1 2 3 4 5; do echo $i; done").await;
        assert_eq!(out.stdout, "1\n2\n3\n");
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("max_loop_iterations"));

        let out = sh
            .exec("for a in 1 2 3; do for b in 1 2 3; do :; done; done; echo ok")
            .await;
        assert_eq!(out.stdout, "ok\n");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_infinite_while_terminates() {
        let mut sh = ShellBuilder::new().build();
        let out = sh.exec("while true; do :; done").await;
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("exceeded"));
    }

    #[tokio::test]
    async fn test_while_and_until_hit_iteration_cap() {
        let limits = ExecutionLimits {
            max_loop_iterations: 5,
            ..ExecutionLimits::default()
        };
        let mut sh = ShellBuilder::new().limits(limits).build();
        for script in ["while true; do :; done", "until false; do :; done"] {
            let out = sh.exec(script).await;
            assert_eq!(out.exit_code, 1, "{script}");
            assert!(out.stderr.contains("max_loop_iterations"), "{script}: {}", out.stderr);
        }
    }

    #[tokio::test]
    async fn test_command_budget_aborts_whole_exec() {
        let limits = ExecutionLimits {
            max_command_count: 20,
            ..ExecutionLimits::default()
        };
        let mut sh = ShellBuilder::new().limits(limits).build();
        let out = sh.exec("while true; do :; done\necho after").await;
        assert_eq!(out.exit_code, 1);
        assert!(!out.stdout.contains("after"));
        assert!(out.stderr.contains("max_command_count"), "{}", out.stderr);

        let out = sh
            .exec("spin() { local N=1; while true; do :; done; }\nspin\necho after")
            .await;
        assert_eq!(out.exit_code, 1);
        assert!(!out.stdout.contains("after"));
        assert!(out.stderr.contains("max_command_count"), "{}", out.stderr);
        assert_eq!(sh.state().call_depth, 0);
        assert!(sh.state().local_scopes.is_empty());

        assert_eq!(sh.exec("echo fresh budget").await.stdout, "fresh budget\n");
    }

    #[tokio::test]
    async fn test_function_positional_params() {
        let mut sh = ShellBuilder::new().build();
        let out = sh
            .exec("greet() { echo \"hi $1 ($#)\"; }\ngreet bob extra; echo \"[$1]\"")
            .await;
        assert_eq!(out.stdout, "hi bob (2)\n[]\n");
    }

    #[tokio::test]
    async fn test_nested_call_restores_caller_params() {
        let mut sh = ShellBuilder::new().build();
        let out = sh
            .exec("inner() { echo in:$1; }\nouter() { inner z; echo out:$1; }\nouter a")
            .await;
        assert_eq!(out.stdout, "in:z\nout:a\n");
    }

    #[tokio::test]
    async fn test_return_sets_status() {
        let mut sh = ShellBuilder::new().build();
        let out = sh
            .exec("f() { echo before; return 3; echo after; }\nf; echo $?")
            .await;
        assert_eq!(out.stdout, "before\n3\n");
    }

    #[tokio::test]
    async fn test_local_restored_after_failure() {
        let mut sh = ShellBuilder::new().build();
        let out = sh
            .exec("X=outer\nf() { local X=1; echo $X; cat /missing; echo unreachable-not; }\nf; echo $X")
            .await;
        assert!(out.stdout.ends_with("outer\n"));
        assert_eq!(sh.get_var("X"), Some("outer"));
    }

    #[tokio::test]
    async fn test_local_unset_before_call_is_removed() {
        let mut sh = ShellBuilder::new().build();
        sh.exec("f() { local Y=inside; }\nf").await;
        assert_eq!(sh.get_var("Y"), None);
        assert_eq!(sh.state().call_depth, 0);
        assert!(sh.state().local_scopes.is_empty());
    }

    #[tokio::test]
    async fn test_runaway_recursion_stops() {
        let mut sh = ShellBuilder::new().build();
        let out = sh.exec("f() { f; }\nf").await;
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("max_call_depth"));
        assert_eq!(sh.state().call_depth, 0);
    }
}
