use crate::command::{Command, CommandType, RedirectMode, Redirection, SimpleCommand};
use crate::list::List;
use std::iter::Peekable;
use std::os::unix::io::RawFd;
use std::str::Chars;
use thiserror::Error;

pub const MAXARGS: usize = 128;

/// Why a line could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line is malformed; the user can simply try again.
    #[error("syntax error: {0}")]
    Syntax(String),
    /// The line contains something the shell cannot represent at all.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ParseError {
    /// Numeric code reported alongside the message: 1 for syntax errors,
    /// 2 for invalid input.
    pub fn code(&self) -> i32 {
        match self {
            ParseError::Syntax(_) => 1,
            ParseError::InvalidInput(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    /// `|`, `;`, `&&` or `||`.
    Join(CommandType),
    /// Trailing `&`.
    Background,
    /// `<`, `>` or `>>` followed by a file name.
    Redirect(RedirectMode),
    /// `<&N`, `>&N` or `>>&N`.
    RedirectFd(RedirectMode, RawFd),
}

fn join_symbol(kind: CommandType) -> &'static str {
    kind.operator().unwrap_or("?")
}

/// Parses one input line into a command.
///
/// Handles:
///
/// - Words, with `"..."` kept verbatim (the executor strips the quotes) and
///   `'...'` stripped here
/// - Input redirection (`<`), output redirection (`>` or `>>`), and
///   descriptor redirection (`<&N`, `>&N`)
/// - Commands joined by `;`, `|`, `&&` or `||` (one kind of operator per line)
/// - Background execution using a trailing `&`
///
/// A blank line yields `Command::empty()`.
pub fn parse_command_line(cmdline: &str) -> Result<Command, ParseError> {
    if cmdline.contains('\0') {
        return Err(ParseError::InvalidInput("line contains a NUL byte".into()));
    }
    let tokens = tokenize(cmdline)?;
    if tokens.is_empty() {
        return Ok(Command::empty());
    }

    let mut elements: Vec<SimpleCommand> = Vec::new();
    let mut current = SimpleCommand::new(Vec::new(), List::new(), false);
    let mut joined_by: Option<CommandType> = None;
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        match token {
            Token::Word(word) => {
                if current.tokens.len() >= MAXARGS - 1 {
                    return Err(ParseError::Syntax("too many arguments".into()));
                }
                current.tokens.push(word);
            }
            Token::Redirect(mode) => match iter.next() {
                Some(Token::Word(file)) => current.redirections.push(Redirection::file(mode, file)),
                _ => {
                    return Err(ParseError::Syntax(format!(
                        "missing file name after `{}`",
                        mode.token()
                    )))
                }
            },
            Token::RedirectFd(mode, fd) => current.redirections.push(Redirection::fd(mode, fd)),
            Token::Background => {
                if iter.peek().is_some() {
                    return Err(ParseError::Syntax("`&` is only allowed at the end".into()));
                }
                current.background = true;
            }
            Token::Join(kind) => {
                if let Some(previous) = joined_by {
                    if previous != kind {
                        return Err(ParseError::Syntax(format!(
                            "cannot mix `{}` and `{}` in one line",
                            join_symbol(previous),
                            join_symbol(kind)
                        )));
                    }
                }
                if current.tokens.is_empty() {
                    return Err(ParseError::Syntax(format!(
                        "missing command before `{}`",
                        join_symbol(kind)
                    )));
                }
                joined_by = Some(kind);
                elements.push(current);
                current = SimpleCommand::new(Vec::new(), List::new(), false);
            }
        }
    }

    if current.tokens.is_empty() {
        // `ls ;` is fine; a dangling `|`, `&&` or `||` is not.
        let trailing_semicolon = joined_by == Some(CommandType::Sequence)
            && current.redirections.is_empty()
            && !current.background;
        if !trailing_semicolon {
            return Err(ParseError::Syntax(match joined_by {
                Some(kind) => format!("missing command after `{}`", join_symbol(kind)),
                None => "missing command".into(),
            }));
        }
    } else {
        elements.push(current);
    }

    Ok(build_command(joined_by.unwrap_or(CommandType::Simple), elements))
}

/// Builds the command the way a right-recursive grammar would: the last two
/// elements form the initial command, the rest are prepended.
fn build_command(kind: CommandType, mut elements: Vec<SimpleCommand>) -> Command {
    let last = elements.pop();
    let second_last = elements.pop();
    let mut command = match (second_last, last) {
        (Some(first), second) => Command::new(kind, first, second),
        (None, Some(only)) => Command::new(kind, only, None),
        (None, None) => return Command::empty(),
    };
    while let Some(simple) = elements.pop() {
        command = command.prepend(simple);
    }
    command
}

/// Splits the input command line into tokens. This function handles:
///
/// - Quoted strings (double quotes are kept, single quotes are removed)
/// - Special tokens: `<`, `>`, `>>`, `<&N`, `>&N`, `|`, `||`, `&`, `&&`, `;`
fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        match ch {
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_some() {
                    tokens.push(Token::Join(CommandType::Or));
                } else {
                    tokens.push(Token::Join(CommandType::Pipe));
                }
            }
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_some() {
                    tokens.push(Token::Join(CommandType::And));
                } else {
                    tokens.push(Token::Background);
                }
            }
            ';' => {
                chars.next();
                tokens.push(Token::Join(CommandType::Sequence));
            }
            '<' => {
                chars.next();
                tokens.push(redirect_token(RedirectMode::Read, &mut chars)?);
            }
            '>' => {
                chars.next();
                let mode = if chars.next_if_eq(&'>').is_some() {
                    RedirectMode::Append
                } else {
                    RedirectMode::Write
                };
                tokens.push(redirect_token(mode, &mut chars)?);
            }
            _ => tokens.push(Token::Word(read_word(&mut chars))),
        }
    }
    Ok(tokens)
}

fn is_special(c: char) -> bool {
    c.is_whitespace() || matches!(c, '<' | '>' | '|' | '&' | ';')
}

/// Reads the `&N` part of a descriptor redirection, if present.
fn redirect_token(
    mode: RedirectMode,
    chars: &mut Peekable<Chars<'_>>,
) -> Result<Token, ParseError> {
    if chars.next_if_eq(&'&').is_none() {
        return Ok(Token::Redirect(mode));
    }
    let mut digits = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        digits.push(c);
    }
    digits
        .parse()
        .map(|fd| Token::RedirectFd(mode, fd))
        .map_err(|_| ParseError::Syntax(format!("expected a descriptor after `{}&`", mode.token())))
}

/// Reads one word. Double-quoted sections are copied with their quotes,
/// single-quoted sections without them; an unterminated quote runs to the
/// end of the line.
fn read_word(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        match c {
            '"' => {
                word.push(c);
                chars.next();
                for c in chars.by_ref() {
                    word.push(c);
                    if c == '"' {
                        break;
                    }
                }
            }
            '\'' => {
                chars.next();
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    word.push(c);
                }
            }
            c if is_special(c) => break,
            _ => {
                word.push(c);
                chars.next();
            }
        }
    }
    word
}
