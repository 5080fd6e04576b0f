//! vsh - a sandboxed POSIX-style shell over a virtual filesystem
//!
//! This crate provides:
//! - A lexer and parser for a bash-like command language
//! - An evaluator with variables, functions, loops and redirections
//! - Built-in commands (ls, cat, grep, etc.) that only touch the
//!   [`vsh_sdk::FileSystem`] the shell was built with
//! - Resource limits so untrusted scripts always terminate
//!
//! ```no_run
//! # async fn demo() {
//! let mut shell = vsh::ShellBuilder::new()
//!     .file("/data/greeting.txt", "hello\n")
//!     .build();
//! let result = shell.exec("cat /data/greeting.txt | wc -l").await;
//! assert_eq!(result.stdout, "1\n");
//! # }
//! ```

pub mod ast;
pub mod command;
pub mod commands;
pub mod error;
pub(crate) mod eval;
pub mod guard;
pub mod lexer;
pub mod parser;
pub mod shell;

pub use command::{Command, CommandContext, ExecResult};
pub use error::{ShellError, ShellResult};
pub use eval::is_identifier;
pub use guard::ExecutionLimits;
pub use parser::parse;
pub use shell::{Shell, ShellBuilder, ShellState};
