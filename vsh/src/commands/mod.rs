//! Default leaf commands.
//!
//! Each command is a unit struct implementing [`Command`]; none of them see
//! interpreter internals beyond what [`CommandContext`](crate::CommandContext)
//! exposes.

use std::sync::Arc;

use vsh_sdk::FsError;

use crate::command::Command;

mod fs;
mod misc;
mod text;

pub use fs::{Cat, Cp, Ls, Mkdir, Mv, Pwd, Rm, Touch};
pub use misc::{Colon, Env, Eval, False, Test, True, Xargs};
pub use text::{Echo, Grep, Head, Wc};

/// Every command a shell gets unless built with
/// [`ShellBuilder::without_default_commands`](crate::ShellBuilder::without_default_commands).
#[must_use]
pub fn default_commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(Echo),
        Arc::new(Cat),
        Arc::new(Pwd),
        Arc::new(True),
        Arc::new(False),
        Arc::new(Colon),
        Arc::new(Test::new("test")),
        Arc::new(Test::new("[")),
        Arc::new(Ls),
        Arc::new(Mkdir),
        Arc::new(Touch),
        Arc::new(Rm),
        Arc::new(Cp),
        Arc::new(Mv),
        Arc::new(Head),
        Arc::new(Wc),
        Arc::new(Grep),
        Arc::new(Env),
        Arc::new(Eval),
        Arc::new(Xargs),
    ]
}

/// `name: operand: reason`, newline-terminated.
fn fs_error(name: &str, operand: &str, err: &FsError) -> String {
    format!("{name}: {operand}: {}\n", err.reason())
}

/// Leading `-xyz` clusters, stopping at `--` or the first operand. A lone
/// `-` counts as an operand.
struct Options<'a> {
    flags: Vec<char>,
    operands: Vec<&'a str>,
}

impl<'a> Options<'a> {
    fn parse(args: &'a [String]) -> Self {
        let mut flags = Vec::new();
        let mut operands = Vec::new();
        let mut rest = args.iter();
        for arg in rest.by_ref() {
            if arg == "--" {
                break;
            }
            match arg.strip_prefix('-') {
                Some(cluster) if !cluster.is_empty() && operands.is_empty() => {
                    flags.extend(cluster.chars());
                }
                _ => operands.push(arg.as_str()),
            }
        }
        operands.extend(rest.map(String::as_str));
        Self { flags, operands }
    }

    fn has(&self, flag: char) -> bool {
        self.flags.contains(&flag)
    }
}
