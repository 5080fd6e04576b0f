//! Parser for vsh
//!
//! Turns the token stream into a [`Script`]. Keywords are ordinary unquoted
//! words that only become structural in command position, so `echo fi` is a
//! plain command while a `fi` starting a command closes the enclosing `if`.

use chumsky::prelude::*;

use crate::ast::{
    ChainOperator, Command, ForLoop, FunctionDef, IfBranch, IfStatement, Pipeline, PipelineStage,
    RedirectKind, Redirection, Script, SimpleCommand, Statement, WhileLoop, Word,
};
use crate::error::{ShellError, ShellResult};
use crate::lexer::{lexer, Token};

/// Words that cannot start a simple command.
const RESERVED: &[&str] = &[
    "if", "then", "elif", "else", "fi", "for", "while", "until", "do", "done", "function", "{",
    "}", "!",
];

/// Deepest compound-command nesting accepted before parsing.
pub const MAX_NESTING: usize = 32;

/// Parse a token stream into a Script AST
pub fn parser() -> impl Parser<Token, Script, Error = Simple<Token>> {
    newlines()
        .ignore_then(
            statement()
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing(),
        )
        .then_ignore(end())
        .map(|statements| Script { statements })
}

/// Lex and parse a line (or a whole multi-line script).
pub fn parse(input: &str) -> ShellResult<Script> {
    let tokens = lexer()
        .parse(input)
        .map_err(|errs| ShellError::Syntax(describe_lex_errors(&errs)))?;
    if nesting_depth(&tokens) > MAX_NESTING {
        return Err(ShellError::Syntax(format!(
            "syntax error: compound commands nested deeper than {MAX_NESTING} levels"
        )));
    }
    let script = parser()
        .parse(tokens)
        .map_err(|errs| ShellError::Syntax(describe_errors(&errs)))?;
    tracing::trace!(statements = script.statements.len(), "parsed script");
    Ok(script)
}

/// Upper bound on how deep the parser will recurse: openers and closers
/// are counted in command position, parentheses anywhere.
fn nesting_depth(tokens: &[Token]) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut command_start = true;
    for token in tokens {
        match token {
            Token::Word(_) => {
                let keyword = token.bare_word().filter(|w| RESERVED.contains(w));
                match keyword {
                    Some(kw) if command_start => match kw {
                        "if" | "for" | "while" | "until" | "{" => depth += 1,
                        "fi" | "done" | "}" => depth = depth.saturating_sub(1),
                        _ => {}
                    },
                    _ => command_start = false,
                }
            }
            Token::LeftParen => {
                depth += 1;
                command_start = true;
            }
            Token::RightParen => {
                depth = depth.saturating_sub(1);
                command_start = true;
            }
            Token::Pipe
            | Token::AndAnd
            | Token::OrOr
            | Token::Semicolon
            | Token::Newline
            | Token::Ampersand => command_start = true,
            _ => command_start = false,
        }
        deepest = deepest.max(depth);
    }
    deepest
}

fn describe_errors(errs: &[Simple<Token>]) -> String {
    match errs.first().and_then(Simple::found) {
        Some(token) => format!("syntax error near unexpected token `{token}'"),
        None => "syntax error: unexpected end of file".to_string(),
    }
}

fn describe_lex_errors(errs: &[Simple<char>]) -> String {
    match errs.first().and_then(Simple::found) {
        Some(c) => format!("syntax error near unexpected character `{c}'"),
        None => "syntax error: unexpected end of file".to_string(),
    }
}

/// A pipeline, unwrapped to the bare compound statement when it is nothing
/// more than that.
fn statement() -> impl Parser<Token, Statement, Error = Simple<Token>> + Clone {
    recursive(|stmt| {
        let command = compound_command(stmt).or(simple_command());

        let run = negations().then(
            command
                .separated_by(just(Token::Pipe).then_ignore(newlines()))
                .at_least(1),
        );

        let chain = choice((
            just(Token::AndAnd)
                .then_ignore(newlines())
                .to(ChainOperator::And),
            just(Token::OrOr)
                .then_ignore(newlines())
                .to(ChainOperator::Or),
            just(Token::Semicolon).to(ChainOperator::Sequence),
        ));

        run.clone()
            .then(chain.then(run).repeated())
            .then_ignore(just(Token::Semicolon).or_not())
            .map(|(first, rest)| into_statement(build_pipeline(first, rest)))
    })
}

type Run = (usize, Vec<Command>);

fn build_pipeline(first: Run, rest: Vec<(ChainOperator, Run)>) -> Pipeline {
    let mut stages = Vec::new();
    let runs = std::iter::once((None, first)).chain(rest.into_iter().map(|(op, run)| (Some(op), run)));
    for (chain, (negation_count, commands)) in runs {
        for (idx, command) in commands.into_iter().enumerate() {
            let (chain, negation_count) = if idx == 0 {
                (chain, negation_count)
            } else {
                (None, 0)
            };
            stages.push(PipelineStage {
                command,
                chain,
                negation_count,
            });
        }
    }
    Pipeline { stages }
}

fn into_statement(mut pipeline: Pipeline) -> Statement {
    let bare_compound = matches!(
        pipeline.stages.as_slice(),
        [PipelineStage {
            command: Command::Compound { redirections, .. },
            negation_count: 0,
            ..
        }] if redirections.is_empty()
    );
    if bare_compound {
        if let Some(PipelineStage {
            command: Command::Compound { statement, .. },
            ..
        }) = pipeline.stages.pop()
        {
            return *statement;
        }
    }
    Statement::Pipeline(pipeline)
}

/// Newline-separated statements inside a compound command.
fn list(
    stmt: impl Parser<Token, Statement, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Script, Error = Simple<Token>> + Clone {
    newlines()
        .ignore_then(
            stmt.separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .at_least(1),
        )
        .map(|statements| Script { statements })
}

fn compound_command(
    stmt: impl Parser<Token, Statement, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Command, Error = Simple<Token>> + Clone {
    choice((
        if_statement(stmt.clone()),
        for_statement(stmt.clone()),
        while_statement(stmt.clone(), "while"),
        while_statement(stmt.clone(), "until"),
        function_def(stmt),
    ))
    .then(
        redirection()
            .repeated()
            .map(|groups| groups.into_iter().flatten().collect()),
    )
    .map(|(statement, redirections)| Command::Compound {
        statement: Box::new(statement),
        redirections,
    })
}

/// Parse an if statement
fn if_statement(
    stmt: impl Parser<Token, Statement, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Statement, Error = Simple<Token>> + Clone {
    // if cond; then body; [elif cond; then body;]... [else body;] fi
    let branch = |opener: &'static str| {
        keyword(opener)
            .ignore_then(list(stmt.clone()))
            .then_ignore(keyword("then"))
            .then(list(stmt.clone()))
            .map(|(condition, body)| IfBranch {
                condition: Some(condition),
                body,
            })
    };

    branch("if")
        .then(branch("elif").repeated())
        .then(
            keyword("else")
                .ignore_then(list(stmt.clone()))
                .map(|body| IfBranch {
                    condition: None,
                    body,
                })
                .or_not(),
        )
        .then_ignore(keyword("fi"))
        .map(|((first, elifs), otherwise)| {
            let mut branches = vec![first];
            branches.extend(elifs);
            branches.extend(otherwise);
            Statement::If(IfStatement { branches })
        })
}

/// Parse a for loop
fn for_statement(
    stmt: impl Parser<Token, Statement, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Statement, Error = Simple<Token>> + Clone {
    // for var [in items]; do body; done
    keyword("for")
        .ignore_then(identifier())
        .then(keyword("in").ignore_then(word().repeated()).or_not())
        .then_ignore(separators())
        .then_ignore(keyword("do"))
        .then(list(stmt))
        .then_ignore(keyword("done"))
        .map(|((variable, items), body)| {
            Statement::For(ForLoop {
                variable,
                items,
                body,
            })
        })
}

/// Parse a while or until loop
fn while_statement(
    stmt: impl Parser<Token, Statement, Error = Simple<Token>> + Clone,
    opener: &'static str,
) -> impl Parser<Token, Statement, Error = Simple<Token>> + Clone {
    // while condition; do body; done
    keyword(opener)
        .ignore_then(list(stmt.clone()))
        .then_ignore(separators())
        .then_ignore(keyword("do"))
        .then(list(stmt))
        .then_ignore(keyword("done"))
        .map(move |(condition, body)| {
            let lp = WhileLoop { condition, body };
            if opener == "until" {
                Statement::Until(lp)
            } else {
                Statement::While(lp)
            }
        })
}

/// Parse a function definition
fn function_def(
    stmt: impl Parser<Token, Statement, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Statement, Error = Simple<Token>> + Clone {
    // name() { body } or function name [()] { body }
    let parens = just(Token::LeftParen)
        .then(just(Token::RightParen))
        .ignored();

    let body = newlines()
        .ignore_then(keyword("{"))
        .ignore_then(list(stmt))
        .then_ignore(keyword("}"));

    let paren_style = function_name().then_ignore(parens.clone());
    let keyword_style = keyword("function")
        .ignore_then(function_name())
        .then_ignore(parens.or_not());

    paren_style
        .or(keyword_style)
        .then(body)
        .map(|(name, body)| Statement::FunctionDef(FunctionDef { name, body }))
}

/// Words and redirections in any order; the first word may not be reserved.
fn simple_command() -> impl Parser<Token, Command, Error = Simple<Token>> + Clone {
    #[derive(Clone)]
    enum Part {
        Word(Word),
        Redirects(Vec<Redirection>),
    }

    let first = redirection()
        .map(Part::Redirects)
        .or(command_word().map(Part::Word));
    let rest = redirection().map(Part::Redirects).or(word().map(Part::Word));

    first.then(rest.repeated()).map(|(first, rest)| {
        let mut command = SimpleCommand::default();
        for part in std::iter::once(first).chain(rest) {
            match part {
                Part::Word(w) => command.words.push(w),
                Part::Redirects(r) => command.redirections.extend(r),
            }
        }
        Command::Simple(command)
    })
}

/// Parse a redirection; `&>` expands to two.
fn redirection() -> impl Parser<Token, Vec<Redirection>, Error = Simple<Token>> + Clone {
    let to_file = |token: Token, kind: RedirectKind, append: bool| {
        just(token).ignore_then(word()).map(move |target| {
            vec![Redirection {
                kind,
                target: Some(target),
                append,
            }]
        })
    };

    let merge = Redirection {
        kind: RedirectKind::StderrToStdout,
        target: None,
        append: false,
    };

    choice((
        to_file(Token::RedirectOut, RedirectKind::Stdout, false),
        to_file(Token::RedirectAppend, RedirectKind::Stdout, true),
        to_file(Token::RedirectIn, RedirectKind::Stdin, false),
        to_file(Token::RedirectErr, RedirectKind::Stderr, false),
        to_file(Token::RedirectErrAppend, RedirectKind::Stderr, true),
        just(Token::RedirectErrToOut).to(vec![merge.clone()]),
        just(Token::RedirectBoth).ignore_then(word()).map(move |target| {
            vec![
                merge.clone(),
                Redirection {
                    kind: RedirectKind::Stdout,
                    target: Some(target),
                    append: false,
                },
            ]
        }),
    ))
}

fn negations() -> impl Parser<Token, usize, Error = Simple<Token>> + Clone {
    keyword("!").repeated().map(|bangs| bangs.len())
}

fn keyword(kw: &'static str) -> impl Parser<Token, (), Error = Simple<Token>> + Clone {
    filter(move |t: &Token| t.bare_word() == Some(kw)).ignored()
}

fn newlines() -> impl Parser<Token, Vec<Token>, Error = Simple<Token>> + Clone {
    just(Token::Newline).repeated()
}

fn separators() -> impl Parser<Token, Vec<Token>, Error = Simple<Token>> + Clone {
    filter(|t: &Token| matches!(t, Token::Semicolon | Token::Newline)).repeated()
}

fn word() -> impl Parser<Token, Word, Error = Simple<Token>> + Clone {
    filter_map(|span, tok| match tok {
        Token::Word(w) => Ok(w),
        _ => Err(Simple::expected_input_found(span, None, Some(tok))),
    })
}

fn command_word() -> impl Parser<Token, Word, Error = Simple<Token>> + Clone {
    filter_map(|span, tok: Token| match tok {
        Token::Word(w) if !w.as_bare().is_some_and(|s| RESERVED.contains(&s)) => Ok(w),
        _ => Err(Simple::expected_input_found(span, None, Some(tok))),
    })
}

fn function_name() -> impl Parser<Token, String, Error = Simple<Token>> + Clone {
    command_word().try_map(|w, span| match w.as_bare() {
        Some(name) => Ok(name.to_string()),
        None => Err(Simple::custom(span, "function name must be unquoted")),
    })
}

fn identifier() -> impl Parser<Token, String, Error = Simple<Token>> + Clone {
    word().try_map(|w, span| match w.as_bare() {
        Some(name) if crate::eval::is_identifier(name) => Ok(name.to_string()),
        _ => Err(Simple::custom(span, format!("`{w}': not a valid identifier"))),
    })
}
