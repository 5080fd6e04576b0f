use async_trait::async_trait;
use regex::RegexBuilder;

use crate::command::{Command, CommandContext, ExecResult};
use crate::error::{ShellError, ShellResult};
use crate::eval::interpret_escape_sequences;
use super::fs_error;

/// `echo [-n] [-e] [-E] ARG...`
pub struct Echo;

#[async_trait]
impl Command for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, args: &[String], _ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let mut interpret = false;
        let mut newline = true;
        let mut idx = 0;

        // Only clusters made entirely of n/e/E are options.
        while let Some(flags) = args.get(idx).and_then(|a| a.strip_prefix('-')) {
            if flags.is_empty() || !flags.chars().all(|c| matches!(c, 'n' | 'e' | 'E')) {
                break;
            }
            for flag in flags.chars() {
                match flag {
                    'n' => newline = false,
                    'e' => interpret = true,
                    _ => interpret = false,
                }
            }
            idx += 1;
        }

        let mut output = args[idx..].join(" ");
        if interpret {
            output = interpret_escape_sequences(&output);
        }
        if newline {
            output.push('\n');
        }
        Ok(ExecResult::success(output))
    }
}

/// Input for text filters: the named files concatenated, or stdin.
async fn read_inputs(
    name: &str,
    files: &[&str],
    ctx: &CommandContext<'_>,
    out: &mut ExecResult,
) -> Vec<(String, String)> {
    if files.is_empty() {
        return vec![(String::new(), ctx.stdin().to_string())];
    }
    let fs = ctx.fs();
    let mut inputs = Vec::new();
    for file in files {
        if *file == "-" {
            inputs.push(((*file).to_string(), ctx.stdin().to_string()));
            continue;
        }
        match fs.read_file(&ctx.resolve(file)).await {
            Ok(content) => inputs.push(((*file).to_string(), content)),
            Err(e) => {
                out.stderr.push_str(&fs_error(name, file, &e));
                out.exit_code = 2;
            }
        }
    }
    inputs
}

/// `grep [-i] [-v] [-n] [-c] [-q] [-E|-F] PATTERN [FILE...]`
///
/// Patterns are regular expressions; `-F` matches a fixed string.
/// Exit status is 0 when a line matched, 1 when none did, 2 on error.
pub struct Grep;

#[derive(Default)]
struct GrepOptions {
    ignore_case: bool,
    invert: bool,
    line_numbers: bool,
    count: bool,
    quiet: bool,
    fixed: bool,
}

#[async_trait]
impl Command for Grep {
    fn name(&self) -> &str {
        "grep"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let mut opts = GrepOptions::default();
        let mut operands = Vec::new();
        let mut flags_done = false;
        for arg in args {
            match arg.strip_prefix('-') {
                Some("-") if !flags_done => flags_done = true,
                Some(cluster) if !flags_done && !cluster.is_empty() => {
                    for c in cluster.chars() {
                        match c {
                            'i' => opts.ignore_case = true,
                            'v' => opts.invert = true,
                            'n' => opts.line_numbers = true,
                            'c' => opts.count = true,
                            'q' => opts.quiet = true,
                            'F' => opts.fixed = true,
                            'E' => opts.fixed = false,
                            other => {
                                return Err(ShellError::invalid_argument(format!(
                                    "invalid option -- '{other}'"
                                )))
                            }
                        }
                    }
                }
                _ => operands.push(arg.as_str()),
            }
        }
        let Some((pattern, files)) = operands.split_first() else {
            return Ok(ExecResult::failure(2, "usage: grep [OPTION]... PATTERN [FILE]...\n"));
        };

        let source = if opts.fixed {
            regex::escape(pattern)
        } else {
            (*pattern).to_string()
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(opts.ignore_case)
            .build()
            .map_err(|e| ShellError::invalid_argument(format!("invalid pattern: {e}")))?;

        let mut out = ExecResult::default();
        let inputs = read_inputs("grep", files, ctx, &mut out).await;
        let label = files.len() > 1;
        let mut matched = false;

        for (file, content) in inputs {
            let mut count = 0usize;
            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) == opts.invert {
                    continue;
                }
                matched = true;
                count += 1;
                if opts.quiet || opts.count {
                    continue;
                }
                if label {
                    out.stdout.push_str(&format!("{file}:"));
                }
                if opts.line_numbers {
                    out.stdout.push_str(&format!("{}:", idx + 1));
                }
                out.stdout.push_str(line);
                out.stdout.push('\n');
            }
            if opts.count && !opts.quiet {
                if label {
                    out.stdout.push_str(&format!("{file}:"));
                }
                out.stdout.push_str(&format!("{count}\n"));
            }
        }

        if opts.quiet {
            out.stdout.clear();
        }
        if out.exit_code == 0 && !matched {
            out.exit_code = 1;
        }
        Ok(out)
    }
}

fn parse_count(value: &str) -> ShellResult<usize> {
    value
        .parse()
        .map_err(|_| ShellError::invalid_argument(format!("invalid number of lines: '{value}'")))
}

/// `head [-n N | -N] [FILE...]`
pub struct Head;

#[async_trait]
impl Command for Head {
    fn name(&self) -> &str {
        "head"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let mut lines = 10;
        let mut files = Vec::new();
        let mut idx = 0;
        while idx < args.len() {
            let arg = args[idx].as_str();
            if arg == "-n" {
                let value = args
                    .get(idx + 1)
                    .ok_or_else(|| ShellError::invalid_argument("option requires an argument -- 'n'"))?;
                lines = parse_count(value)?;
                idx += 2;
                continue;
            }
            if let Some(value) = arg.strip_prefix("-n") {
                lines = parse_count(value)?;
            } else if let Some(value) = arg.strip_prefix('-').filter(|v| !v.is_empty()) {
                lines = parse_count(value)?;
            } else {
                files.push(arg);
            }
            idx += 1;
        }

        let mut out = ExecResult::default();
        let inputs = read_inputs("head", &files, ctx, &mut out).await;
        let headers = inputs.len() > 1;
        for (n, (file, content)) in inputs.iter().enumerate() {
            if headers {
                if n > 0 {
                    out.stdout.push('\n');
                }
                out.stdout.push_str(&format!("==> {file} <==\n"));
            }
            for line in content.lines().take(lines) {
                out.stdout.push_str(line);
                out.stdout.push('\n');
            }
        }
        if out.exit_code != 0 {
            out.exit_code = 1;
        }
        Ok(out)
    }
}

/// `wc [-l] [-w] [-c] [FILE...]`
pub struct Wc;

#[async_trait]
impl Command for Wc {
    fn name(&self) -> &str {
        "wc"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let opts = super::Options::parse(args);
        let any = opts.has('l') || opts.has('w') || opts.has('c');
        let (show_lines, show_words, show_bytes) = if any {
            (opts.has('l'), opts.has('w'), opts.has('c'))
        } else {
            (true, true, true)
        };

        let mut out = ExecResult::default();
        let inputs = read_inputs("wc", &opts.operands, ctx, &mut out).await;
        let mut totals = [0usize; 3];
        let render = |counts: [usize; 3], label: &str| {
            let mut fields = Vec::new();
            if show_lines {
                fields.push(counts[0].to_string());
            }
            if show_words {
                fields.push(counts[1].to_string());
            }
            if show_bytes {
                fields.push(counts[2].to_string());
            }
            if !label.is_empty() {
                fields.push(label.to_string());
            }
            format!("{}\n", fields.join(" "))
        };

        for (file, content) in &inputs {
            let counts = [
                content.matches('\n').count(),
                content.split_whitespace().count(),
                content.len(),
            ];
            for (total, n) in totals.iter_mut().zip(counts) {
                *total += n;
            }
            out.stdout.push_str(&render(counts, file));
        }
        if inputs.len() > 1 {
            out.stdout.push_str(&render(totals, "total"));
        }
        if out.exit_code != 0 {
            out.exit_code = 1;
        }
        Ok(out)
    }
}
