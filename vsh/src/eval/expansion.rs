use crate::ast::{Quoting, Word};
use crate::shell::Shell;
use super::utils::{contains_glob_chars, is_identifier, match_glob_pattern, remove_prefix, remove_suffix};

/// Text produced while scanning for `$`.
enum Piece {
    /// Source text; never split.
    Literal(String),
    /// Result of a parameter expansion; split when unquoted.
    Expanded(String),
}

/// Accumulates the argument list for one word.
#[derive(Default)]
struct Fields {
    done: Vec<String>,
    current: String,
    open: bool,
}

impl Fields {
    fn push_literal(&mut self, text: &str) {
        self.current.push_str(text);
        self.open = true;
    }

    /// Whitespace in `text` ends the current field.
    fn push_split(&mut self, text: &str) {
        for c in text.chars() {
            if c.is_whitespace() {
                if self.open {
                    self.done.push(std::mem::take(&mut self.current));
                    self.open = false;
                }
            } else {
                self.current.push(c);
                self.open = true;
            }
        }
    }

    fn finish(mut self) -> Vec<String> {
        if self.open {
            self.done.push(self.current);
        }
        self.done
    }
}

impl Shell {
    /// Full expansion of command arguments: parameters, tilde, field
    /// splitting and globbing.
    pub(crate) async fn expand_words(&mut self, words: &[Word]) -> Vec<String> {
        let mut args = Vec::new();
        for word in words {
            if is_quoted_at(word) {
                args.extend(self.positional_params());
                continue;
            }
            let fields = self.expand_fields(word);
            if word.is_quoted() {
                args.extend(fields);
                continue;
            }
            for field in fields {
                if contains_glob_chars(&field) {
                    args.extend(self.expand_glob(&field).await);
                } else {
                    args.push(field);
                }
            }
        }
        args
    }

    /// Expansion without splitting or globbing, for assignment values and
    /// redirection targets.
    pub(crate) fn expand_word(&mut self, word: &Word) -> String {
        let mut out = String::new();
        for (idx, fragment) in word.fragments.iter().enumerate() {
            match fragment.quoting {
                Quoting::Single => out.push_str(&fragment.text),
                Quoting::Double => {
                    for piece in self.expand_text(&fragment.text) {
                        match piece {
                            Piece::Literal(s) | Piece::Expanded(s) => out.push_str(&s),
                        }
                    }
                }
                Quoting::Unquoted => {
                    let text = self.expand_tilde(idx, &fragment.text);
                    for piece in self.expand_text(&text) {
                        match piece {
                            Piece::Literal(s) | Piece::Expanded(s) => out.push_str(&s),
                        }
                    }
                }
            }
        }
        out
    }

    fn expand_fields(&mut self, word: &Word) -> Vec<String> {
        let mut fields = Fields::default();
        for (idx, fragment) in word.fragments.iter().enumerate() {
            match fragment.quoting {
                Quoting::Single => fields.push_literal(&fragment.text),
                Quoting::Double => {
                    fields.push_literal("");
                    for piece in self.expand_text(&fragment.text) {
                        match piece {
                            Piece::Literal(s) | Piece::Expanded(s) => fields.push_literal(&s),
                        }
                    }
                }
                Quoting::Unquoted => {
                    let text = self.expand_tilde(idx, &fragment.text);
                    for piece in self.expand_text(&text) {
                        match piece {
                            Piece::Literal(s) => fields.push_literal(&s),
                            Piece::Expanded(s) => fields.push_split(&s),
                        }
                    }
                }
            }
        }
        fields.finish()
    }

    /// `~` or a leading `~/` in the first fragment becomes `$HOME`.
    fn expand_tilde(&self, idx: usize, text: &str) -> String {
        if idx != 0 {
            return text.to_string();
        }
        let home = || self.get_var("HOME").unwrap_or("/").to_string();
        if text == "~" {
            return home();
        }
        match text.strip_prefix("~/") {
            Some(rest) => format!("{}/{rest}", home().trim_end_matches('/')),
            None => text.to_string(),
        }
    }

    fn expand_text(&mut self, text: &str) -> Vec<Piece> {
        let chars: Vec<char> = text.chars().collect();
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] != '$' {
                literal.push(chars[i]);
                i += 1;
                continue;
            }
            let (value, consumed) = match chars.get(i + 1) {
                Some('{') => match chars[i + 2..].iter().position(|&c| c == '}') {
                    Some(len) => {
                        let inner: String = chars[i + 2..i + 2 + len].iter().collect();
                        (Some(self.expand_braced_param(&inner)), len + 3)
                    }
                    None => (None, 1),
                },
                Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
                    let len = chars[i + 1..]
                        .iter()
                        .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                        .count();
                    let name: String = chars[i + 1..i + 1 + len].iter().collect();
                    (Some(self.get_variable_value(&name)), len + 1)
                }
                Some(c) if c.is_ascii_digit() || matches!(c, '?' | '$' | '!' | '@' | '*' | '#') => {
                    (Some(self.get_variable_value(&c.to_string())), 2)
                }
                _ => (None, 1),
            };
            match value {
                Some(value) => {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Expanded(value));
                }
                None => literal.extend(&chars[i..i + consumed]),
            }
            i += consumed;
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        pieces
    }

    /// Operand text of `${...}` operators is itself expanded, without
    /// splitting.
    fn expand_operand(&mut self, operand: &str) -> String {
        self.expand_text(operand)
            .into_iter()
            .map(|piece| match piece {
                Piece::Literal(s) | Piece::Expanded(s) => s,
            })
            .collect()
    }

    fn expand_braced_param(&mut self, content: &str) -> String {
        // ${#var}; a bare ${#} is the positional count.
        if let Some(name) = content.strip_prefix('#') {
            if !name.is_empty() {
                return self.get_variable_value(name).chars().count().to_string();
            }
        }

        let name_len = if content.starts_with(|c: char| c.is_ascii_digit() || "?$!@*#".contains(c)) {
            content.chars().next().map_or(0, char::len_utf8)
        } else {
            content
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(content.len())
        };
        let (name, rest) = content.split_at(name_len);
        if rest.is_empty() {
            return self.get_variable_value(name);
        }

        let is_set = self.has_variable(name);
        let value = self.get_variable_value(name);

        // A variable holding "" is set; only an absent name takes the
        // default, with or without the colon.
        let operators = [":-", ":=", ":+", "##", "%%", "-", "=", "+", "#", "%"];
        let Some(op) = operators.iter().find(|op| rest.starts_with(**op)) else {
            return value;
        };
        let operand = &rest[op.len()..];

        match *op {
            ":-" | "-" => {
                if is_set {
                    value
                } else {
                    self.expand_operand(operand)
                }
            }
            ":=" | "=" => {
                if is_set {
                    value
                } else {
                    let default = self.expand_operand(operand);
                    if is_identifier(name) {
                        self.set_var(name, &default);
                    }
                    default
                }
            }
            ":+" | "+" => {
                if is_set {
                    self.expand_operand(operand)
                } else {
                    String::new()
                }
            }
            "##" => remove_prefix(&value, &self.expand_operand(operand), true),
            "#" => remove_prefix(&value, &self.expand_operand(operand), false),
            "%%" => remove_suffix(&value, &self.expand_operand(operand), true),
            _ => remove_suffix(&value, &self.expand_operand(operand), false),
        }
    }

    fn has_variable(&self, name: &str) -> bool {
        match name {
            "?" | "$" | "!" | "0" | "#" | "@" | "*" => true,
            _ => self.state.env.contains_key(name),
        }
    }

    pub(crate) fn get_variable_value(&self, name: &str) -> String {
        let env = &self.state.env;
        match name {
            "?" => self.state.last_exit_code.to_string(),
            "$" => "1".to_string(),
            "!" => String::new(),
            "0" => env.get("0").cloned().unwrap_or_else(|| "vsh".to_string()),
            "@" | "*" => env.get("@").cloned().unwrap_or_default(),
            "#" => env.get("#").cloned().unwrap_or_else(|| "0".to_string()),
            _ => env.get(name).cloned().unwrap_or_default(),
        }
    }

    pub(crate) fn positional_params(&self) -> Vec<String> {
        let count: usize = self
            .state
            .env
            .get("#")
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        (1..=count).map(|n| self.get_variable_value(&n.to_string())).collect()
    }

    /// Matches `pattern` one path component at a time against every path the
    /// filesystem knows. No match leaves the pattern as a literal argument.
    pub(crate) async fn expand_glob(&self, pattern: &str) -> Vec<String> {
        let absolute = pattern.starts_with('/');
        let resolved = self.fs.resolve_path(&self.state.cwd, pattern);
        let wanted: Vec<&str> = resolved.split('/').filter(|c| !c.is_empty()).collect();

        let mut matches: Vec<String> = self
            .fs
            .get_all_paths()
            .await
            .into_iter()
            .filter(|path| {
                let parts: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
                parts.len() == wanted.len()
                    && parts.iter().zip(&wanted).all(|(name, pat)| match_component(pat, name))
            })
            .collect();

        if matches.is_empty() {
            tracing::trace!(pattern, "glob matched nothing");
            return vec![pattern.to_string()];
        }
        matches.sort();

        if absolute {
            return matches;
        }
        // Results keep the directory part the pattern was written with,
        // so `../*.txt` yields `../a.txt`.
        let components: Vec<&str> = pattern.split('/').collect();
        let first_glob = components
            .iter()
            .position(|c| contains_glob_chars(c))
            .unwrap_or(components.len());
        let written: String = components[..first_glob].iter().map(|c| format!("{c}/")).collect();
        let base = self.fs.resolve_path(&self.state.cwd, &written);
        let base_prefix = format!("{}/", base.trim_end_matches('/'));
        matches
            .into_iter()
            .map(|path| match path.strip_prefix(&base_prefix) {
                Some(rest) => format!("{written}{rest}"),
                None => path,
            })
            .collect()
    }
}

/// A component pattern; a leading dot must be matched literally.
fn match_component(pattern: &str, name: &str) -> bool {
    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }
    match_glob_pattern(pattern, name)
}

/// `"$@"` on its own expands to one argument per positional parameter.
fn is_quoted_at(word: &Word) -> bool {
    matches!(word.fragments.as_slice(), [f] if f.quoting == Quoting::Double && f.text == "$@")
}

#[cfg(test)]
mod tests {
    use crate::ast::Fragment;
    use crate::shell::ShellBuilder;

    use super::*;

    fn shell() -> Shell {
        ShellBuilder::new()
            .file("/home/user/a.txt", "a")
            .file("/home/user/b.txt", "b")
            .file("/home/user/.hidden.txt", "h")
            .file("/home/user/sub/c.txt", "c")
            .build()
    }

    fn bare(s: &str) -> Word {
        Word::unquoted(s)
    }

    #[tokio::test]
    async fn test_simple_variables() {
        let mut sh = shell();
        sh.set_var("NAME", "world");
        assert_eq!(sh.expand_word(&bare("hi_$NAME")), "hi_world");
        assert_eq!(sh.expand_word(&bare("${NAME}s")), "worlds");
        assert_eq!(sh.expand_word(&bare("$UNSET.")), ".");
        assert_eq!(sh.expand_word(&bare("cost $")), "cost $");
    }

    #[tokio::test]
    async fn test_default_treats_empty_as_set() {
        let mut sh = shell();
        sh.set_var("EMPTY", "");
        assert_eq!(sh.expand_word(&bare("[${EMPTY:-d}]")), "[]");
        assert_eq!(sh.expand_word(&bare("[${MISSING:-d}]")), "[d]");
        assert_eq!(sh.expand_word(&bare("[${EMPTY:+alt}]")), "[alt]");
        assert_eq!(sh.expand_word(&bare("[${MISSING+alt}]")), "[]");
    }

    #[tokio::test]
    async fn test_braced_parameter_inside_word() {
        let mut sh = shell();
        assert_eq!(sh.exec("echo pre${X:-a b}").await.stdout, "prea b\n");
        assert_eq!(sh.exec("X=v; echo pre${X}post-${X%v}.").await.stdout, "prevpost-.\n");
    }

    #[tokio::test]
    async fn test_assign_default() {
        let mut sh = shell();
        assert_eq!(sh.expand_word(&bare("${X:=fallback}")), "fallback");
        assert_eq!(sh.get_var("X"), Some("fallback"));
        assert_eq!(sh.expand_word(&bare("${X:=other}")), "fallback");
    }

    #[tokio::test]
    async fn test_length_and_trimming() {
        let mut sh = shell();
        sh.set_var("F", "archive.tar.gz");
        assert_eq!(sh.expand_word(&bare("${#F}")), "14");
        assert_eq!(sh.expand_word(&bare("${F%.*}")), "archive.tar");
        assert_eq!(sh.expand_word(&bare("${F%%.*}")), "archive");
        assert_eq!(sh.expand_word(&bare("${F#*.}")), "tar.gz");
        assert_eq!(sh.expand_word(&bare("${F##*.}")), "gz");
    }

    #[tokio::test]
    async fn test_single_quotes_are_literal() {
        let mut sh = shell();
        sh.set_var("X", "1");
        let word = Word::from_fragments([Fragment::new(Quoting::Single, "$X")]);
        assert_eq!(sh.expand_words(&[word]).await, vec!["$X"]);
    }

    #[tokio::test]
    async fn test_field_splitting() {
        let mut sh = shell();
        sh.set_var("LIST", " a  b ");
        assert_eq!(sh.expand_words(&[bare("$LIST")]).await, vec!["a", "b"]);

        let quoted = Word::from_fragments([Fragment::new(Quoting::Double, "$LIST")]);
        assert_eq!(sh.expand_words(&[quoted]).await, vec![" a  b "]);

        assert!(sh.expand_words(&[bare("$NOTHING")]).await.is_empty());
        let empty = Word::from_fragments([Fragment::new(Quoting::Double, "")]);
        assert_eq!(sh.expand_words(&[empty]).await, vec![""]);
    }

    #[tokio::test]
    async fn test_tilde() {
        let mut sh = shell();
        assert_eq!(sh.expand_words(&[bare("~")]).await, vec!["/home/user"]);
        assert_eq!(sh.expand_words(&[bare("~/x")]).await, vec!["/home/user/x"]);
        assert_eq!(sh.expand_words(&[bare("a~")]).await, vec!["a~"]);
    }

    #[tokio::test]
    async fn test_glob_relative_and_absolute() {
        let mut sh = shell();
        assert_eq!(sh.expand_words(&[bare("*.txt")]).await, vec!["a.txt", "b.txt"]);
        assert_eq!(
            sh.expand_words(&[bare("/home/user/*/c.txt")]).await,
            vec!["/home/user/sub/c.txt"]
        );
        assert_eq!(sh.expand_words(&[bare(".h*")]).await, vec![".hidden.txt"]);
        assert_eq!(sh.expand_words(&[bare("./?.txt")]).await, vec!["./a.txt", "./b.txt"]);
    }

    #[tokio::test]
    async fn test_glob_keeps_written_relative_prefix() {
        let mut sh = shell();
        let out = sh.exec("cd sub\necho ../*.txt\necho ./*.txt ../sub/*").await;
        assert_eq!(out.stdout, "../a.txt ../b.txt\n./c.txt ../sub/c.txt\n");
    }

    #[tokio::test]
    async fn test_glob_without_match_stays_literal() {
        let mut sh = shell();
        assert_eq!(sh.expand_words(&[bare("*.rs")]).await, vec!["*.rs"]);
        let quoted = Word::from_fragments([Fragment::new(Quoting::Double, "*.txt")]);
        assert_eq!(sh.expand_words(&[quoted]).await, vec!["*.txt"]);
    }

    #[tokio::test]
    async fn test_quoted_at_keeps_fields() {
        let mut sh = shell();
        sh.set_positional(&["a b".to_string(), "c".to_string()]);
        let word = Word::from_fragments([Fragment::new(Quoting::Double, "$@")]);
        assert_eq!(sh.expand_words(&[word]).await, vec!["a b", "c"]);
        assert_eq!(sh.expand_word(&bare("$#:$1")), "2:a b");
    }
}
