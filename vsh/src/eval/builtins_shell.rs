use crate::command::ExecResult;
use crate::shell::{Flow, Shell};
use super::utils::{double_quote, is_identifier, split_assignment};

impl Shell {
    /// Builtins change interpreter state, so they never go through the
    /// command registry. `None` means `name` is not a builtin.
    pub(crate) async fn run_builtin(&mut self, name: &str, args: &[String]) -> Option<ExecResult> {
        let result = match name {
            "cd" => self.cmd_cd(args).await,
            "export" => self.cmd_export(args),
            "unset" => self.cmd_unset(args),
            "exit" => self.cmd_exit(args),
            "local" => self.cmd_local(args),
            "return" => self.cmd_return(args),
            "break" => self.cmd_loop_control(name, args, Flow::Break),
            "continue" => self.cmd_loop_control(name, args, Flow::Continue),
            "shift" => self.cmd_shift(args),
            "source" | "." => self.cmd_source(name, args).await,
            "set" => self.cmd_set(args),
            _ => return None,
        };
        Some(result)
    }

    async fn cmd_cd(&mut self, args: &[String]) -> ExecResult {
        let (target, announce) = match args.first().map(String::as_str) {
            None => match self.get_var("HOME") {
                Some(home) => (home.to_string(), false),
                None => return ExecResult::failure(1, "vsh: cd: HOME not set\n"),
            },
            Some("-") => match &self.state.previous_dir {
                Some(previous) => (previous.clone(), true),
                None => return ExecResult::failure(1, "vsh: cd: OLDPWD not set\n"),
            },
            Some(dir) => (dir.to_string(), false),
        };

        let path = self.fs.resolve_path(&self.state.cwd, &target);
        match self.fs.stat(&path).await {
            Ok(stat) if stat.is_dir() => {}
            Ok(_) => return ExecResult::failure(1, format!("vsh: cd: {target}: Not a directory\n")),
            Err(e) => return ExecResult::failure(1, format!("vsh: cd: {target}: {}\n", e.reason())),
        }

        let previous = std::mem::replace(&mut self.state.cwd, path.clone());
        self.set_var("OLDPWD", &previous);
        self.set_var("PWD", &path);
        self.state.previous_dir = Some(previous);
        tracing::debug!(cwd = %path, "changed directory");

        if announce {
            ExecResult::success(format!("{path}\n"))
        } else {
            ExecResult::with_code(0)
        }
    }

    fn cmd_export(&mut self, args: &[String]) -> ExecResult {
        if args.is_empty() {
            return ExecResult::success(self.declarations());
        }

        let mut out = ExecResult::default();
        let mut remove = false;
        for arg in args {
            if arg == "-n" {
                remove = true;
                continue;
            }
            if arg == "-p" {
                out.stdout.push_str(&self.declarations());
                continue;
            }
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            if !is_identifier(name) {
                out.stderr
                    .push_str(&format!("vsh: export: `{arg}': not a valid identifier\n"));
                out.exit_code = 1;
                continue;
            }
            match (remove, value) {
                (true, _) => self.unset_var(name),
                (false, Some(value)) => self.set_var(name, value),
                (false, None) => {
                    self.state.env.entry(name.to_string()).or_default();
                }
            }
        }
        out
    }

    /// `declare -x NAME="value"` lines, sorted by name.
    fn declarations(&self) -> String {
        self.sorted_variables()
            .into_iter()
            .map(|(name, value)| format!("declare -x {name}={}\n", double_quote(value)))
            .collect()
    }

    fn sorted_variables(&self) -> Vec<(&str, &str)> {
        let mut vars: Vec<(&str, &str)> = self
            .state
            .env
            .iter()
            .filter(|(name, _)| is_identifier(name))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        vars.sort_unstable();
        vars
    }

    fn cmd_unset(&mut self, args: &[String]) -> ExecResult {
        let mut functions = false;
        for arg in args {
            match arg.as_str() {
                "-f" => functions = true,
                "-v" => functions = false,
                name if functions => {
                    self.state.functions.remove(name);
                }
                name => self.unset_var(name),
            }
        }
        ExecResult::with_code(0)
    }

    fn cmd_exit(&mut self, args: &[String]) -> ExecResult {
        let (code, stderr) = match args.first() {
            None => (self.state.last_exit_code, String::new()),
            Some(arg) => match arg.parse::<i64>() {
                Ok(n) => (u8::try_from(n.rem_euclid(256)).unwrap_or(0), String::new()),
                Err(_) => (1, format!("vsh: exit: {arg}: numeric argument required\n")),
            },
        };
        tracing::debug!(code, "exit requested");
        self.flow = Some(Flow::Exit(code));
        ExecResult::failure(code, stderr)
    }

    fn cmd_local(&mut self, args: &[String]) -> ExecResult {
        if self.state.local_scopes.is_empty() {
            return ExecResult::failure(1, "vsh: local: can only be used in a function\n");
        }

        let mut out = ExecResult::default();
        for arg in args {
            let (name, value) = match split_assignment(arg) {
                Some((name, value)) => (name, value),
                None if is_identifier(arg) => (arg.as_str(), ""),
                None => {
                    out.stderr
                        .push_str(&format!("vsh: local: `{arg}': not a valid identifier\n"));
                    out.exit_code = 1;
                    continue;
                }
            };
            let previous = self.state.env.get(name).cloned();
            if let Some(frame) = self.state.local_scopes.last_mut() {
                frame.entry(name.to_string()).or_insert(previous);
            }
            self.set_var(name, value);
        }
        out
    }

    fn cmd_return(&mut self, args: &[String]) -> ExecResult {
        if self.state.call_depth == 0 && self.source_depth == 0 {
            return ExecResult::failure(
                1,
                "vsh: return: can only `return' from a function or sourced script\n",
            );
        }
        let code = match args.first() {
            None => self.state.last_exit_code,
            Some(arg) => match arg.parse::<i64>() {
                Ok(n) => u8::try_from(n.rem_euclid(256)).unwrap_or(0),
                Err(_) => {
                    return ExecResult::failure(
                        1,
                        format!("vsh: return: {arg}: numeric argument required\n"),
                    )
                }
            },
        };
        self.flow = Some(Flow::Return(code));
        ExecResult::with_code(code)
    }

    /// `break [n]` / `continue [n]`; a no-op outside loops.
    fn cmd_loop_control(
        &mut self,
        name: &str,
        args: &[String],
        flow: fn(usize) -> Flow,
    ) -> ExecResult {
        let levels = match args.first().map(|a| a.parse::<usize>()) {
            None => 1,
            Some(Ok(n)) if n > 0 => n,
            Some(_) => {
                return ExecResult::failure(
                    1,
                    format!("vsh: {name}: {}: loop count out of range\n", args[0]),
                )
            }
        };
        if self.loop_depth == 0 {
            return ExecResult::with_code(0);
        }
        self.flow = Some(flow(levels.min(self.loop_depth)));
        ExecResult::with_code(0)
    }

    fn cmd_shift(&mut self, args: &[String]) -> ExecResult {
        let count = match args.first().map(|a| a.parse::<usize>()) {
            None => 1,
            Some(Ok(n)) => n,
            Some(Err(_)) => {
                return ExecResult::failure(
                    1,
                    format!("vsh: shift: {}: numeric argument required\n", args[0]),
                )
            }
        };
        let params = self.positional_params();
        if count > params.len() {
            return ExecResult::with_code(1);
        }
        self.set_positional(&params[count..]);
        ExecResult::with_code(0)
    }

    /// Runs a file from the virtual filesystem in this shell. Extra
    /// arguments become the positional parameters while it runs.
    async fn cmd_source(&mut self, name: &str, args: &[String]) -> ExecResult {
        let Some(file) = args.first() else {
            return ExecResult::failure(2, format!("vsh: {name}: filename argument required\n"));
        };
        let path = self.fs.resolve_path(&self.state.cwd, file);
        let content = match self.fs.read_file(&path).await {
            Ok(content) => content,
            Err(e) => return ExecResult::failure(1, format!("vsh: {file}: {}\n", e.reason())),
        };

        let caller_params = (args.len() > 1).then(|| {
            let saved = self
                .state
                .env
                .contains_key("#")
                .then(|| self.positional_params());
            self.set_positional(&args[1..]);
            saved
        });

        self.source_depth += 1;
        let mut result = self.exec_nested(&content).await;
        self.source_depth -= 1;

        if let Some(Flow::Return(code)) = self.flow {
            result.exit_code = code;
            self.flow = None;
        }
        match caller_params {
            Some(Some(params)) => self.set_positional(&params),
            Some(None) => self.clear_positional(),
            None => {}
        }
        result
    }

    /// Lists variables; `set -- args` replaces the positional parameters.
    fn cmd_set(&mut self, args: &[String]) -> ExecResult {
        if let Some(idx) = args.iter().position(|a| a == "--") {
            self.set_positional(&args[idx + 1..]);
            return ExecResult::with_code(0);
        }
        if !args.is_empty() {
            return ExecResult::with_code(0);
        }
        let listing = self
            .sorted_variables()
            .into_iter()
            .map(|(name, value)| format!("{name}={value}\n"))
            .collect::<String>();
        ExecResult::success(listing)
    }
}

#[cfg(test)]
mod tests {
    use crate::shell::ShellBuilder;

    #[tokio::test]
    async fn test_cd_variants() {
        let mut sh = ShellBuilder::new().file("/srv/app/readme", "x").build();
        assert_eq!(sh.exec("cd /srv").await.exit_code, 0);
        assert_eq!(sh.cwd(), "/srv");
        assert_eq!(sh.exec("cd app").await.exit_code, 0);
        assert_eq!(sh.cwd(), "/srv/app");
        assert_eq!(sh.get_var("OLDPWD"), Some("/srv"));

        let out = sh.exec("cd -").await;
        assert_eq!(out.stdout, "/srv\n");
        assert_eq!(sh.get_var("PWD"), Some("/srv"));

        sh.exec("cd").await;
        assert_eq!(sh.cwd(), "/home/user");
    }

    #[tokio::test]
    async fn test_cd_failures() {
        let mut sh = ShellBuilder::new().file("/etc/motd", "hi").build();
        let out = sh.exec("cd /nowhere").await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "vsh: cd: /nowhere: No such file or directory\n");

        let out = sh.exec("cd /etc/motd").await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "vsh: cd: /etc/motd: Not a directory\n");
        assert_eq!(sh.cwd(), "/home/user");
    }

    #[tokio::test]
    async fn test_export_listing_and_removal() {
        let mut sh = ShellBuilder::new().without_default_commands().build();
        sh.exec("export GREETING=\"say \\\"hi\\\"\" EMPTY").await;
        assert_eq!(sh.get_var("EMPTY"), Some(""));

        let listing = sh.exec("export").await.stdout;
        assert!(listing.contains("declare -x EMPTY=\"\"\n"));
        assert!(listing.contains("declare -x GREETING=\"say \\\"hi\\\"\"\n"));
        let names: Vec<&str> = listing.lines().collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);

        sh.exec("export -n GREETING").await;
        assert_eq!(sh.get_var("GREETING"), None);
    }

    #[tokio::test]
    async fn test_export_keeps_existing_value() {
        let mut sh = ShellBuilder::new().build();
        sh.exec("X=kept; export X").await;
        assert_eq!(sh.get_var("X"), Some("kept"));
        assert_eq!(sh.exec("export 1bad=x").await.exit_code, 1);
    }

    #[tokio::test]
    async fn test_exit_codes() {
        let mut sh = ShellBuilder::new().build();
        let out = sh.exec("echo before; exit 300; echo after").await;
        assert_eq!(out.stdout, "before\n");
        assert_eq!(out.exit_code, 44);
        assert_eq!(sh.exit_requested(), Some(44));

        let mut sh = ShellBuilder::new().build();
        let out = sh.exec("exit nope").await;
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("numeric argument required"));
    }

    #[tokio::test]
    async fn test_exit_inside_function_ends_exec() {
        let mut sh = ShellBuilder::new().build();
        let out = sh.exec("f() { exit 7; }\nf; echo unreachable").await;
        assert_eq!(out.exit_code, 7);
        assert_eq!(out.stdout, "");
        assert_eq!(sh.state().call_depth, 0);
    }

    #[tokio::test]
    async fn test_local_outside_function() {
        let mut sh = ShellBuilder::new().build();
        let out = sh.exec("local X=1").await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "vsh: local: can only be used in a function\n");
    }

    #[tokio::test]
    async fn test_local_records_first_value_only() {
        let mut sh = ShellBuilder::new().build();
        sh.exec("V=orig\nf() { local V=a; local V=b; echo $V; }\nf").await;
        assert_eq!(sh.get_var("V"), Some("orig"));
    }

    #[tokio::test]
    async fn test_return_outside_function() {
        let mut sh = ShellBuilder::new().build();
        assert_eq!(sh.exec("return 3").await.exit_code, 1);
    }

    #[tokio::test]
    async fn test_break_outside_loop_is_noop() {
        let mut sh = ShellBuilder::new().build();
        let out = sh.exec("break; echo still").await;
        assert_eq!(out.stdout, "still\n");
    }

    #[tokio::test]
    async fn test_shift() {
        let mut sh = ShellBuilder::new().build();
        let out = sh
            .exec("f() { shift; echo $1 $#; shift 5; echo $?; }\nf a b c")
            .await;
        assert_eq!(out.stdout, "b 2\n1\n");
    }

    #[tokio::test]
    async fn test_source() {
        let mut sh = ShellBuilder::new()
            .file("lib.sh", "LOADED=yes\nhello() { echo hello $1; }\nreturn 4\necho skipped\n")
            .build();
        let out = sh.exec("source lib.sh; echo $?; hello world").await;
        assert_eq!(out.stdout, "4\nhello world\n");
        assert_eq!(sh.get_var("LOADED"), Some("yes"));

        let out = sh.exec(". missing.sh").await;
        assert_eq!(out.exit_code, 1);
        assert_eq!(out.stderr, "vsh: missing.sh: No such file or directory\n");
    }

    #[tokio::test]
    async fn test_self_sourcing_is_bounded() {
        let mut sh = ShellBuilder::new().file("loop.sh", "source loop.sh").build();
        let out = sh.exec("source loop.sh").await;
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("max_call_depth"));
    }

    #[tokio::test]
    async fn test_set_lists_and_sets_params() {
        let mut sh = ShellBuilder::new().build();
        sh.exec("Z_LAST=1").await;
        let listing = sh.exec("set").await.stdout;
        assert!(listing.ends_with("Z_LAST=1\n"));

        let out = sh.exec("set -- x y; echo $2 $#").await;
        assert_eq!(out.stdout, "y 2\n");
    }
}
