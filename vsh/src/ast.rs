//! Abstract syntax tree for vsh scripts.
//!
//! The parser resolves every line once into these types; the evaluator never
//! looks at raw text again except when expanding words.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Newline-separated statements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub statements: Vec<Statement>,
}

impl Script {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    Pipeline(Pipeline),
    If(IfStatement),
    For(ForLoop),
    While(WhileLoop),
    Until(WhileLoop),
    FunctionDef(FunctionDef),
}

/// Stages joined by `|`, `&&`, `||` and `;`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub stages: Vec<PipelineStage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub command: Command,
    /// Operator preceding this stage. `None` for the first stage and for
    /// stages fed by `|`.
    pub chain: Option<ChainOperator>,
    /// Leading `!` count; only ever non-zero on the first stage of a
    /// pipe-connected run.
    pub negation_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainOperator {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `;`
    Sequence,
}

impl fmt::Display for ChainOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
            Self::Sequence => write!(f, ";"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Simple(SimpleCommand),
    Compound {
        statement: Box<Statement>,
        redirections: Vec<Redirection>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleCommand {
    pub words: Vec<Word>,
    pub redirections: Vec<Redirection>,
}

/// How a fragment of a word was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quoting {
    Unquoted,
    /// Single quotes or a backslash escape: taken literally.
    Single,
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fragment {
    pub quoting: Quoting,
    pub text: String,
}

impl Fragment {
    pub fn new(quoting: Quoting, text: impl Into<String>) -> Self {
        Self {
            quoting,
            text: text.into(),
        }
    }
}

/// One shell word: adjacent fragments with no whitespace between them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Word {
    pub fragments: Vec<Fragment>,
}

impl Word {
    /// Merges neighbouring fragments that share a quoting class.
    #[must_use]
    pub fn from_fragments(fragments: impl IntoIterator<Item = Fragment>) -> Self {
        let mut merged: Vec<Fragment> = Vec::new();
        for fragment in fragments {
            match merged.last_mut() {
                Some(last) if last.quoting == fragment.quoting => {
                    last.text.push_str(&fragment.text);
                }
                _ => merged.push(fragment),
            }
        }
        Self { fragments: merged }
    }

    pub fn unquoted(text: impl Into<String>) -> Self {
        Self {
            fragments: vec![Fragment::new(Quoting::Unquoted, text)],
        }
    }

    /// True when any part was quoted or escaped; such words are never
    /// glob-expanded.
    #[must_use]
    pub fn is_quoted(&self) -> bool {
        self.fragments.iter().any(|f| f.quoting != Quoting::Unquoted)
    }

    /// The text if the word is a single unquoted fragment. Keywords and
    /// identifiers are only recognised in this form.
    #[must_use]
    pub fn as_bare(&self) -> Option<&str> {
        match self.fragments.as_slice() {
            [Fragment {
                quoting: Quoting::Unquoted,
                text,
            }] => Some(text),
            _ => None,
        }
    }

    /// Source-like text with quoting removed.
    #[must_use]
    pub fn raw_text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fragment in &self.fragments {
            match fragment.quoting {
                Quoting::Unquoted => write!(f, "{}", fragment.text)?,
                Quoting::Single => write!(f, "'{}'", fragment.text)?,
                Quoting::Double => write!(f, "\"{}\"", fragment.text)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirection {
    pub kind: RedirectKind,
    /// Absent only for `2>&1`.
    pub target: Option<Word>,
    pub append: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectKind {
    /// `>` / `>>`
    Stdout,
    /// `2>` / `2>>`
    Stderr,
    /// `<`
    Stdin,
    /// `2>&1`
    StderrToStdout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfStatement {
    pub branches: Vec<IfBranch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfBranch {
    /// `None` only for the `else` branch.
    pub condition: Option<Script>,
    pub body: Script,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForLoop {
    pub variable: String,
    /// `None` when the `in` clause is omitted (iterate positional parameters).
    pub items: Option<Vec<Word>>,
    pub body: Script,
}

/// Shared by `while` and `until`; the statement variant decides the polarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhileLoop {
    pub condition: Script,
    pub body: Script,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub body: Script,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_merges_same_quoting() {
        let word = Word::from_fragments([
            Fragment::new(Quoting::Double, "a"),
            Fragment::new(Quoting::Double, "b"),
            Fragment::new(Quoting::Single, "c"),
        ]);
        assert_eq!(word.fragments.len(), 2);
        assert_eq!(word.raw_text(), "abc");
        assert!(word.is_quoted());
        assert_eq!(word.as_bare(), None);
    }

    #[test]
    fn test_word_display_restores_quotes() {
        let word = Word::from_fragments([
            Fragment::new(Quoting::Unquoted, "x="),
            Fragment::new(Quoting::Single, "$y"),
        ]);
        assert_eq!(word.to_string(), "x='$y'");
        assert_eq!(Word::unquoted("fi").as_bare(), Some("fi"));
    }
}
