use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;
use std::collections::HashSet;

use vsh::Shell;
use vsh_sdk::path::{parent_path, resolve_path};

const BUILTINS: &[&str] = &[
    ".", "break", "cd", "continue", "exit", "export", "local", "return", "set", "shift",
    "source", "unset",
];

/// Tab completion for the REPL.
///
/// Holds a snapshot of the shell taken before each prompt, so completion
/// never needs to reach into the async filesystem.
#[derive(Default)]
pub struct VshHelper {
    commands: Vec<String>,
    paths: Vec<String>,
    dirs: HashSet<String>,
    cwd: String,
}

impl VshHelper {
    pub async fn refresh(&mut self, shell: &Shell) {
        let mut commands: Vec<String> = BUILTINS.iter().map(ToString::to_string).collect();
        commands.extend(shell.command_names().into_iter().map(ToString::to_string));
        commands.extend(shell.state().functions.keys().cloned());
        commands.sort();
        commands.dedup();

        let fs = shell.fs();
        let paths = fs.get_all_paths().await;
        let mut dirs = HashSet::new();
        for path in &paths {
            if fs.stat(path).await.is_ok_and(|s| s.is_dir()) {
                dirs.insert(path.clone());
            }
        }

        self.commands = commands;
        self.paths = paths;
        self.dirs = dirs;
        self.cwd = shell.cwd().to_string();
    }

    /// Entries of `dir` whose name starts with `partial`; directories get a
    /// trailing `/`.
    fn complete_path(&self, dir: &str, partial: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .paths
            .iter()
            .filter(|p| p.as_str() != "/" && parent_path(p).as_deref() == Some(dir))
            .filter_map(|p| {
                let name = p.rsplit('/').next()?;
                if !name.starts_with(partial) || (name.starts_with('.') && !partial.starts_with('.')) {
                    return None;
                }
                Some(if self.dirs.contains(p) {
                    format!("{name}/")
                } else {
                    name.to_string()
                })
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl Completer for VshHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_to_cursor = &line[..pos];
        let (start, word) = find_word_start(line_to_cursor);
        let is_first_word = !line_to_cursor[..start].contains(|c: char| !c.is_whitespace());

        let mut completions = Vec::new();

        if is_first_word && !word.contains('/') {
            completions.extend(
                self.commands
                    .iter()
                    .filter(|c| c.starts_with(word))
                    .map(|c| Pair {
                        display: c.clone(),
                        replacement: c.clone(),
                    }),
            );
        }

        if !is_first_word || word.contains('/') {
            let (dir_part, partial) = word
                .rfind('/')
                .map_or(("", word), |idx| (&word[..=idx], &word[idx + 1..]));
            let dir = if dir_part.is_empty() {
                self.cwd.clone()
            } else {
                resolve_path(&self.cwd, dir_part)
            };
            completions.extend(self.complete_path(&dir, partial).into_iter().map(|name| Pair {
                replacement: format!("{dir_part}{name}"),
                display: name,
            }));
        }

        Ok((start, completions))
    }
}

fn find_word_start(line: &str) -> (usize, &str) {
    let mut start = line.len();
    for (i, c) in line.char_indices().rev() {
        if c.is_whitespace() || matches!(c, ';' | '|' | '&' | '>' | '<') {
            break;
        }
        start = i;
    }
    (start, &line[start..])
}

impl Hinter for VshHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for VshHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Borrowed(hint)
    }
}

impl Validator for VshHelper {}

impl Helper for VshHelper {}

#[cfg(test)]
mod tests {
    use super::*;

    fn helper() -> VshHelper {
        VshHelper {
            commands: vec!["cat".into(), "cd".into(), "echo".into()],
            paths: vec![
                "/".into(),
                "/home".into(),
                "/home/user".into(),
                "/home/user/notes.txt".into(),
                "/home/user/.hidden".into(),
                "/home/user/src".into(),
                "/home/user/src/main.sh".into(),
            ],
            dirs: ["/", "/home", "/home/user", "/home/user/src"]
                .into_iter()
                .map(String::from)
                .collect(),
            cwd: "/home/user".into(),
        }
    }

    #[test]
    fn test_find_word_start() {
        assert_eq!(find_word_start("echo hi | ca"), (10, "ca"));
        assert_eq!(find_word_start("ls "), (3, ""));
    }

    #[test]
    fn test_complete_path_relative() {
        let h = helper();
        assert_eq!(h.complete_path("/home/user", ""), vec!["notes.txt", "src/"]);
        assert_eq!(h.complete_path("/home/user", "."), vec![".hidden"]);
        assert_eq!(h.complete_path("/home/user/src", "m"), vec!["main.sh"]);
    }
}
