//! Lexer for vsh
//!
//! Splits a line into words and operators. Quoting is resolved here: each
//! word keeps its fragments tagged with how they were quoted, so expansion
//! can later tell literal text from text that still needs `$` handling.
//!
//! The lexer accepts every input. An unterminated quote runs to the end of
//! the input and a trailing backslash is a literal `\`.

use chumsky::prelude::*;
use std::fmt;

use crate::ast::{Fragment, Quoting, Word};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    Word(Word),

    // Operators
    Pipe,      // |
    AndAnd,    // &&
    OrOr,      // ||
    Semicolon, // ;
    Newline,   // \n
    Ampersand, // &

    // Redirections
    RedirectOut,       // >
    RedirectAppend,    // >>
    RedirectIn,        // <
    RedirectErr,       // 2>
    RedirectErrAppend, // 2>>
    RedirectErrToOut,  // 2>&1
    RedirectBoth,      // &>

    LeftParen,  // (
    RightParen, // )
}

impl Token {
    /// Unquoted word text, used to spot keywords.
    #[must_use]
    pub fn bare_word(&self) -> Option<&str> {
        match self {
            Self::Word(word) => word.as_bare(),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "{w}"),
            Self::Pipe => write!(f, "|"),
            Self::AndAnd => write!(f, "&&"),
            Self::OrOr => write!(f, "||"),
            Self::Semicolon => write!(f, ";"),
            Self::Newline => write!(f, "newline"),
            Self::Ampersand => write!(f, "&"),
            Self::RedirectOut => write!(f, ">"),
            Self::RedirectAppend => write!(f, ">>"),
            Self::RedirectIn => write!(f, "<"),
            Self::RedirectErr => write!(f, "2>"),
            Self::RedirectErrAppend => write!(f, "2>>"),
            Self::RedirectErrToOut => write!(f, "2>&1"),
            Self::RedirectBoth => write!(f, "&>"),
            Self::LeftParen => write!(f, "("),
            Self::RightParen => write!(f, ")"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '|' | '&' | ';' | '<' | '>' | '(' | ')' | '\'' | '"' | '\\')
}

pub fn lexer() -> impl Parser<char, Vec<Token>, Error = Simple<char>> {
    let comment = just('#')
        .then(filter(|c: &char| *c != '\n').repeated())
        .ignored();

    // Whitespace other than newline, plus backslash-newline continuations.
    let blank = filter(|c: &char| c.is_whitespace() && *c != '\n')
        .ignored()
        .or(just("\\\n").ignored());

    let skip = blank.or(comment).repeated();

    // 'text': no escapes at all.
    let single_quoted = just('\'')
        .ignore_then(filter(|c: &char| *c != '\'').repeated().collect::<String>())
        .then_ignore(just('\'').ignored().or(end()))
        .map(|s| vec![Fragment::new(Quoting::Single, s)]);

    // "text": only \" \\ \$ \` are escapes; they become literal fragments so
    // the escaped `$` is never expanded.
    let dq_escape = just('\\')
        .ignore_then(any().or_not())
        .map(|c: Option<char>| match c {
            Some(c @ ('"' | '\\' | '$' | '`')) => Fragment::new(Quoting::Single, c.to_string()),
            Some('\n') => Fragment::new(Quoting::Double, ""),
            Some(c) => Fragment::new(Quoting::Double, format!("\\{c}")),
            None => Fragment::new(Quoting::Double, "\\"),
        });
    let dq_text = filter(|c: &char| *c != '"' && *c != '\\')
        .repeated()
        .at_least(1)
        .collect::<String>()
        .map(|s| Fragment::new(Quoting::Double, s));
    let double_quoted = just('"')
        .ignore_then(dq_escape.or(dq_text).repeated())
        .then_ignore(just('"').ignored().or(end()))
        .map(|parts: Vec<Fragment>| {
            if parts.is_empty() {
                vec![Fragment::new(Quoting::Double, "")]
            } else {
                parts
            }
        });

    // ${...} is one unit so defaults may contain blanks and operators.
    let braced = just("${")
        .ignore_then(filter(|c: &char| *c != '}').repeated().collect::<String>())
        .then_ignore(just('}').ignored().or(end()))
        .map(|inner| vec![Fragment::new(Quoting::Unquoted, format!("${{{inner}}}"))]);

    // \X outside quotes is a literal X; a trailing backslash stays literal.
    let escaped = just('\\')
        .ignore_then(any().or_not())
        .map(|c: Option<char>| match c {
            Some('\n') => vec![],
            Some(c) => vec![Fragment::new(Quoting::Single, c.to_string())],
            None => vec![Fragment::new(Quoting::Single, "\\")],
        });

    // `$` is its own piece so a `${` later in the word still reaches `braced`.
    let bare = filter(|c: &char| is_word_char(*c) && *c != '$')
        .repeated()
        .at_least(1)
        .collect::<String>()
        .or(just('$').map(String::from))
        .map(|s| vec![Fragment::new(Quoting::Unquoted, s)]);

    let word = choice((braced, single_quoted, double_quoted, escaped, bare))
        .repeated()
        .at_least(1)
        .map(|parts: Vec<Vec<Fragment>>| Token::Word(Word::from_fragments(parts.into_iter().flatten())));

    // Longest operators first so `||` is never read as two pipes.
    let operator = choice((
        just("2>&1").to(Token::RedirectErrToOut),
        just("2>>").to(Token::RedirectErrAppend),
        just("2>").to(Token::RedirectErr),
        just("&>").to(Token::RedirectBoth),
        just("&&").to(Token::AndAnd),
        just("||").to(Token::OrOr),
        just(">>").to(Token::RedirectAppend),
        just('|').to(Token::Pipe),
        just('&').to(Token::Ampersand),
        just(';').to(Token::Semicolon),
        just('\n').to(Token::Newline),
        just('>').to(Token::RedirectOut),
        just('<').to(Token::RedirectIn),
        just('(').to(Token::LeftParen),
        just(')').to(Token::RightParen),
    ));

    operator
        .or(word)
        .padded_by(skip)
        .repeated()
        .then_ignore(end())
}
