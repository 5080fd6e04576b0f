/// `[A-Za-z_][A-Za-z0-9_]*`
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits `NAME=value` when NAME is an identifier.
pub(crate) fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let (name, value) = text.split_once('=')?;
    is_identifier(name).then_some((name, value))
}

pub(crate) fn contains_glob_chars(s: &str) -> bool {
    s.chars().any(|c| c == '*' || c == '?' || c == '[')
}

/// Shell pattern match over whole strings: `*`, `?`, and `[...]` classes
/// with ranges and `!`/`^` negation. An unclosed `[` matches literally.
pub(crate) fn match_glob_pattern(pattern: &str, name: &str) -> bool {
    let tokens = compile_pattern(pattern);
    let name: Vec<char> = name.chars().collect();

    // Single-star backtracking: on a mismatch, retry from the most recent
    // `*` with one more character swallowed. Worst case O(pattern * name).
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        match tokens.get(p) {
            Some(PatternToken::Star) => {
                star = Some((p, n));
                p += 1;
                continue;
            }
            Some(token) if token.matches(name[n]) => {
                p += 1;
                n += 1;
                continue;
            }
            _ => {}
        }
        let Some((star_p, star_n)) = star else {
            return false;
        };
        star = Some((star_p, star_n + 1));
        p = star_p + 1;
        n = star_n + 1;
    }
    tokens[p..].iter().all(|t| matches!(t, PatternToken::Star))
}

enum PatternToken {
    Star,
    Any,
    Class(CharClass),
    Literal(char),
}

impl PatternToken {
    fn matches(&self, c: char) -> bool {
        match self {
            Self::Star | Self::Any => true,
            Self::Class(class) => class.matches(c),
            Self::Literal(l) => *l == c,
        }
    }
}

fn compile_pattern(pattern: &str) -> Vec<PatternToken> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut rest = chars.as_slice();
    while let Some((&first, tail)) = rest.split_first() {
        rest = tail;
        let token = match first {
            // Runs of stars match the same as one.
            '*' if matches!(tokens.last(), Some(PatternToken::Star)) => continue,
            '*' => PatternToken::Star,
            '?' => PatternToken::Any,
            '[' => match parse_class(tail) {
                Some((class, after)) => {
                    rest = after;
                    PatternToken::Class(class)
                }
                None => PatternToken::Literal('['),
            },
            c => PatternToken::Literal(c),
        };
        tokens.push(token);
    }
    tokens
}

struct CharClass {
    negated: bool,
    ranges: Vec<(char, char)>,
}

impl CharClass {
    fn matches(&self, c: char) -> bool {
        let hit = self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
        hit != self.negated
    }
}

/// Parses the body of a `[...]` class; returns it and the pattern after `]`.
fn parse_class(pattern: &[char]) -> Option<(CharClass, &[char])> {
    let mut idx = 0;
    let negated = matches!(pattern.first(), Some('!' | '^'));
    if negated {
        idx += 1;
    }
    let mut ranges = Vec::new();
    let start = idx;
    while idx < pattern.len() {
        let c = pattern[idx];
        if c == ']' && idx > start {
            return Some((CharClass { negated, ranges }, &pattern[idx + 1..]));
        }
        if pattern.get(idx + 1) == Some(&'-') && pattern.get(idx + 2).is_some_and(|&e| e != ']') {
            ranges.push((c, pattern[idx + 2]));
            idx += 3;
        } else {
            ranges.push((c, c));
            idx += 1;
        }
    }
    None
}

/// Char boundaries of `s`, including the end.
fn boundaries(s: &str) -> Vec<usize> {
    s.char_indices().map(|(i, _)| i).chain([s.len()]).collect()
}

/// `${var#pat}` / `${var##pat}`
pub(crate) fn remove_prefix(value: &str, pattern: &str, longest: bool) -> String {
    let cuts = boundaries(value);
    let found = if longest {
        cuts.iter().rev().find(|&&i| match_glob_pattern(pattern, &value[..i]))
    } else {
        cuts.iter().find(|&&i| match_glob_pattern(pattern, &value[..i]))
    };
    found.map_or_else(|| value.to_string(), |&i| value[i..].to_string())
}

/// `${var%pat}` / `${var%%pat}`
pub(crate) fn remove_suffix(value: &str, pattern: &str, longest: bool) -> String {
    let cuts = boundaries(value);
    let found = if longest {
        cuts.iter().find(|&&i| match_glob_pattern(pattern, &value[i..]))
    } else {
        cuts.iter().rev().find(|&&i| match_glob_pattern(pattern, &value[i..]))
    };
    found.map_or_else(|| value.to_string(), |&i| value[..i].to_string())
}

/// Escapes for display inside double quotes.
pub(crate) fn double_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub(crate) fn interpret_escape_sequences(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('0') => result.push('\0'),
            Some('a') => result.push('\x07'),
            Some('b') => result.push('\x08'),
            Some('f') => result.push('\x0C'),
            Some('v') => result.push('\x0B'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}
