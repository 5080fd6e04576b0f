use async_trait::async_trait;
use vsh_sdk::{path, FileStat};

use crate::command::{Command, CommandContext, ExecResult};
use crate::error::ShellResult;
use super::{fs_error, Options};

/// `cat [FILE...]`; no operands or `-` reads stdin.
pub struct Cat;

#[async_trait]
impl Command for Cat {
    fn name(&self) -> &str {
        "cat"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        if args.is_empty() {
            return Ok(ExecResult::success(ctx.stdin()));
        }
        let fs = ctx.fs();
        let mut out = ExecResult::default();
        for arg in args {
            if arg == "-" {
                out.stdout.push_str(ctx.stdin());
                continue;
            }
            match fs.read_file(&ctx.resolve(arg)).await {
                Ok(content) => out.stdout.push_str(&content),
                Err(e) => {
                    out.stderr.push_str(&fs_error("cat", arg, &e));
                    out.exit_code = 1;
                }
            }
        }
        Ok(out)
    }
}

pub struct Pwd;

#[async_trait]
impl Command for Pwd {
    fn name(&self) -> &str {
        "pwd"
    }

    async fn execute(&self, _args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        Ok(ExecResult::success(format!("{}\n", ctx.cwd())))
    }
}

/// `ls [-a] [-l] [PATH...]`
pub struct Ls;

fn format_mode(stat: &FileStat) -> String {
    let type_char = if stat.is_dir() { 'd' } else { '-' };
    let bits: String = (0..9)
        .map(|i| {
            let mask = 0o400 >> i;
            if stat.mode & mask == 0 {
                '-'
            } else {
                ['r', 'w', 'x'][i % 3]
            }
        })
        .collect();
    format!("{type_char}{bits}")
}

#[async_trait]
impl Command for Ls {
    fn name(&self) -> &str {
        "ls"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let opts = Options::parse(args);
        let show_hidden = opts.has('a');
        let long = opts.has('l');
        let targets = if opts.operands.is_empty() {
            vec!["."]
        } else {
            opts.operands.clone()
        };

        let fs = ctx.fs();
        let mut out = ExecResult::default();
        let headers = targets.len() > 1;
        for (idx, target) in targets.iter().enumerate() {
            let full = ctx.resolve(target);
            let stat = match fs.stat(&full).await {
                Ok(stat) => stat,
                Err(e) => {
                    out.stderr.push_str(&fs_error("ls", target, &e));
                    out.exit_code = 1;
                    continue;
                }
            };

            let mut entries = Vec::new();
            if stat.is_dir() {
                for name in fs.readdir(&full).await? {
                    if !show_hidden && name.starts_with('.') {
                        continue;
                    }
                    let child = fs.stat(&path::join_path(&full, &name)).await?;
                    entries.push((name, child));
                }
                if headers {
                    if idx > 0 {
                        out.stdout.push('\n');
                    }
                    out.stdout.push_str(&format!("{target}:\n"));
                }
            } else {
                entries.push(((*target).to_string(), stat));
            }

            for (name, stat) in entries {
                if long {
                    out.stdout.push_str(&format!(
                        "{} {:>8} {name}\n",
                        format_mode(&stat),
                        stat.size
                    ));
                } else {
                    out.stdout.push_str(&format!("{name}\n"));
                }
            }
        }
        Ok(out)
    }
}

/// `mkdir [-p] DIR...`
pub struct Mkdir;

#[async_trait]
impl Command for Mkdir {
    fn name(&self) -> &str {
        "mkdir"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let opts = Options::parse(args);
        if opts.operands.is_empty() {
            return Ok(ExecResult::failure(1, "mkdir: missing operand\n"));
        }
        let fs = ctx.fs();
        let mut out = ExecResult::default();
        for dir in &opts.operands {
            if let Err(e) = fs.mkdir(&ctx.resolve(dir), opts.has('p')).await {
                out.stderr.push_str(&fs_error("mkdir", dir, &e));
                out.exit_code = 1;
            }
        }
        Ok(out)
    }
}

/// `touch FILE...`: creates missing files, leaves content alone.
pub struct Touch;

#[async_trait]
impl Command for Touch {
    fn name(&self) -> &str {
        "touch"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let opts = Options::parse(args);
        if opts.operands.is_empty() {
            return Ok(ExecResult::failure(1, "touch: missing file operand\n"));
        }
        let fs = ctx.fs();
        let mut out = ExecResult::default();
        for file in &opts.operands {
            if let Err(e) = fs.append_file(&ctx.resolve(file), "").await {
                out.stderr.push_str(&fs_error("touch", file, &e));
                out.exit_code = 1;
            }
        }
        Ok(out)
    }
}

/// `rm [-r] [-f] PATH...`
pub struct Rm;

#[async_trait]
impl Command for Rm {
    fn name(&self) -> &str {
        "rm"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let opts = Options::parse(args);
        let recursive = opts.has('r') || opts.has('R');
        let force = opts.has('f');
        if opts.operands.is_empty() {
            return Ok(if force {
                ExecResult::default()
            } else {
                ExecResult::failure(1, "rm: missing operand\n")
            });
        }
        let fs = ctx.fs();
        let mut out = ExecResult::default();
        for target in &opts.operands {
            if let Err(e) = fs.rm(&ctx.resolve(target), recursive, force).await {
                out.stderr.push_str(&fs_error("rm", target, &e));
                out.exit_code = 1;
            }
        }
        Ok(out)
    }
}

/// Destination for `src` when `dest` names an existing directory.
async fn into_directory(ctx: &CommandContext<'_>, src: &str, dest: &str) -> String {
    let full = ctx.resolve(dest);
    match ctx.fs().stat(&full).await {
        Ok(stat) if stat.is_dir() => path::join_path(&full, &path::file_name(&ctx.resolve(src))),
        _ => full,
    }
}

fn split_sources<'a>(name: &str, operands: &'a [&'a str]) -> Result<(&'a [&'a str], &'a str), ExecResult> {
    match operands {
        [] => Err(ExecResult::failure(1, format!("{name}: missing file operand\n"))),
        [only] => Err(ExecResult::failure(
            1,
            format!("{name}: missing destination file operand after '{only}'\n"),
        )),
        [sources @ .., dest] => Ok((sources, dest)),
    }
}

/// `cp [-r] SRC... DEST`
pub struct Cp;

#[async_trait]
impl Command for Cp {
    fn name(&self) -> &str {
        "cp"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let opts = Options::parse(args);
        let recursive = opts.has('r') || opts.has('R');
        let (sources, dest) = match split_sources("cp", &opts.operands) {
            Ok(parts) => parts,
            Err(failure) => return Ok(failure),
        };

        let fs = ctx.fs();
        let mut out = ExecResult::default();
        for src in sources {
            let target = into_directory(ctx, src, dest).await;
            if let Err(e) = fs.cp(&ctx.resolve(src), &target, recursive).await {
                let message = if e.is_directory_error() && !recursive {
                    format!("cp: -r not specified; omitting directory '{src}'\n")
                } else {
                    fs_error("cp", src, &e)
                };
                out.stderr.push_str(&message);
                out.exit_code = 1;
            }
        }
        Ok(out)
    }
}

/// `mv SRC... DEST`
pub struct Mv;

#[async_trait]
impl Command for Mv {
    fn name(&self) -> &str {
        "mv"
    }

    async fn execute(&self, args: &[String], ctx: &mut CommandContext<'_>) -> ShellResult<ExecResult> {
        let opts = Options::parse(args);
        let (sources, dest) = match split_sources("mv", &opts.operands) {
            Ok(parts) => parts,
            Err(failure) => return Ok(failure),
        };

        let fs = ctx.fs();
        let mut out = ExecResult::default();
        for src in sources {
            let target = into_directory(ctx, src, dest).await;
            if let Err(e) = fs.mv(&ctx.resolve(src), &target).await {
                out.stderr.push_str(&fs_error("mv", src, &e));
                out.exit_code = 1;
            }
        }
        Ok(out)
    }
}
