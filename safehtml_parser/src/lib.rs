#![deny(unreachable_pub)]
#![deny(elided_lifetimes_in_paths)]

use std::borrow::Cow;
use std::cell::Cell;
use std::{fmt, str};

use nom::branch::alt;
use nom::bytes::complete::{escaped, is_not, tag, take_till, take_while};
use nom::character::complete::{anychar, char, one_of, satisfy};
use nom::combinator::{cut, eof, not, opt, recognize};
use nom::error::{ErrorKind, FromExternalError};
use nom::multi::many0_count;
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::error_position;

pub mod expr;
pub use expr::Expr;
pub mod node;
pub use node::{CallBlock, Case, Clause, For, If, Node, Pattern, PatternLit};


/// Words that can never be used as variable or function names.
pub const RESERVED: &[&str] = &[
    "nil", "true", "false", "and", "or", "not", "in", "if", "unless", "for", "case", "do", "else",
    "end", "when", "fn",
];

#[derive(Debug, Default)]
pub struct Ast<'a> {
    nodes: Vec<Node<'a>>,
}

impl<'a> Ast<'a> {
    /// If `name` is `None`, the source is an anonymous template. Therefore, if
    /// a parsing error occurs, only the position is reported.
    pub fn from_str(
        src: &'a str,
        name: Option<&str>,
        syntax: &Syntax<'_>,
    ) -> Result<Self, ParseError> {
        let state = State::new(syntax);
        let parse = |i: &'a str| Node::many(i, &state);
        let (input, message) = match terminated(parse, cut(eof))(src) {
            Ok((rest, nodes)) if rest.is_empty() => return Ok(Self { nodes }),
            Ok(_) => unreachable!("eof() is not eof?"),
            Err(
                nom::Err::Error(ErrorContext { input, message, .. })
                | nom::Err::Failure(ErrorContext { input, message, .. }),
            ) => (input, message),
            Err(nom::Err::Incomplete(_)) => return Err(ParseError("parsing incomplete".into())),
        };

        let offset = src.len() - input.len();
        let (source_before, source_after) = src.split_at(offset);

        let source_after = match source_after.char_indices().enumerate().take(41).last() {
            Some((40, (i, _))) => format!("{:?}...", &source_after[..i]),
            _ => format!("{source_after:?}"),
        };

        let (row, last_line) = source_before.lines().enumerate().last().unwrap_or_default();
        let column = if source_before.ends_with('\n') {
            0
        } else {
            last_line.chars().count()
        };
        let row = if source_before.ends_with('\n') {
            row + 1
        } else {
            row
        };

        let message = message
            .map(|message| format!("{message}\n"))
            .unwrap_or_default();
        let error_msg = match name {
            Some(name) => format!(
                "{message}failed to parse template source\n  --> {name}:{row}:{column}\n{source_after}",
                row = row + 1,
            ),
            None => format!(
                "{message}failed to parse template source at row {}, column {column} near:\n{source_after}",
                row + 1,
            ),
        };

        Err(ParseError(error_msg))
    }

    pub fn nodes(&self) -> &[Node<'a>] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node<'a>> {
        self.nodes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub(crate) type ParseErr<'a> = nom::Err<ErrorContext<'a>>;
pub(crate) type ParseResult<'a, T = &'a str> = Result<(&'a str, T), ParseErr<'a>>;

/// This type is used to handle `nom` errors and in particular to add custom error messages.
/// It is turned into a `ParseError` once parsing stops.
#[derive(Debug)]
pub(crate) struct ErrorContext<'a> {
    pub(crate) input: &'a str,
    pub(crate) message: Option<Cow<'static, str>>,
}

impl<'a> ErrorContext<'a> {
    pub(crate) fn failure(input: &'a str, message: impl Into<Cow<'static, str>>) -> ParseErr<'a> {
        nom::Err::Failure(Self {
            input,
            message: Some(message.into()),
        })
    }
}

impl<'a> nom::error::ParseError<&'a str> for ErrorContext<'a> {
    fn from_error_kind(input: &'a str, _code: ErrorKind) -> Self {
        Self {
            input,
            message: None,
        }
    }

    fn append(_: &'a str, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<'a, E: std::fmt::Display> FromExternalError<&'a str, E> for ErrorContext<'a> {
    fn from_external_error(input: &'a str, _kind: ErrorKind, e: E) -> Self {
        Self {
            input,
            message: Some(Cow::Owned(e.to_string())),
        }
    }
}

fn is_ws(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn not_ws(c: char) -> bool {
    !is_ws(c)
}

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> ParseResult<'a, O>,
) -> impl FnMut(&'a str) -> ParseResult<'a, O> {
    delimited(take_till(not_ws), inner, take_till(not_ws))
}

fn keyword<'a>(k: &'static str) -> impl FnMut(&'a str) -> ParseResult<'a> {
    move |i: &'a str| -> ParseResult<'a> {
        let (j, v) = identifier(i)?;
        if v == k {
            Ok((j, v))
        } else {
            Err(nom::Err::Error(error_position!(i, ErrorKind::Tag)))
        }
    }
}

fn identifier(input: &str) -> ParseResult<'_> {
    let start = satisfy(|c| c.is_alphabetic() || c == '_');
    let tail = take_while(|c: char| c.is_alphanumeric() || c == '_');
    recognize(tuple((start, tail, opt(terminated(char('?'), not(char('=')))))))(input)
}

/// An identifier that may be used as a variable or function name.
fn name(i: &str) -> ParseResult<'_> {
    let (j, name) = identifier(i)?;
    if RESERVED.contains(&name) {
        return Err(nom::Err::Error(error_position!(i, ErrorKind::Tag)));
    }
    Ok((j, name))
}

fn bool_lit(i: &str) -> ParseResult<'_> {
    alt((keyword("false"), keyword("true")))(i)
}

fn num_lit(i: &str) -> ParseResult<'_> {
    recognize(tuple((
        separated_digits(10, true),
        opt(pair(char('.'), separated_digits(10, true))),
        opt(tuple((
            one_of("eE"),
            opt(one_of("+-")),
            separated_digits(10, false),
        ))),
    )))(i)
}

/// Underscore separated digits of the given base, unless `start` is true this may start
/// with an underscore.
fn separated_digits<'a>(radix: u32, start: bool) -> impl Fn(&'a str) -> ParseResult<'a> {
    move |i| {
        recognize(tuple((
            |i| match start {
                true => Ok((i, 0)),
                false => many0_count(char('_'))(i),
            },
            satisfy(|ch| ch.is_digit(radix)),
            many0_count(satisfy(|ch| ch == '_' || ch.is_digit(radix))),
        )))(i)
    }
}

fn str_lit(i: &str) -> ParseResult<'_> {
    let (i, s) = delimited(
        char('"'),
        opt(escaped(is_not("\\\""), '\\', anychar)),
        char('"'),
    )(i)?;
    Ok((i, s.unwrap_or_default()))
}

fn atom_lit(i: &str) -> ParseResult<'_> {
    preceded(char(':'), identifier)(i)
}

struct State<'a> {
    syntax: &'a Syntax<'a>,
    level: Cell<Level>,
}

impl State<'_> {
    fn new<'a>(syntax: &'a Syntax<'a>) -> State<'a> {
        State {
            syntax,
            level: Cell::new(Level::default()),
        }
    }

    fn nest<'i>(&self, i: &'i str) -> ParseResult<'i, ()> {
        let (_, level) = self.level.get().nest(i)?;
        self.level.set(level);
        Ok((i, ()))
    }

    fn leave(&self) {
        self.level.set(self.level.get().leave());
    }

    fn tag_block_start<'i>(&self, i: &'i str) -> ParseResult<'i> {
        tag(self.syntax.block_start)(i)
    }

    fn tag_block_end<'i>(&self, i: &'i str) -> ParseResult<'i> {
        tag(self.syntax.block_end)(i)
    }
}

/// Tag delimiters. `<%=` prints, `<%` evaluates silently and `<%#`
/// comments; the markers after the opening delimiter are fixed.
#[derive(Debug, Clone)]
pub struct Syntax<'a> {
    pub block_start: &'a str,
    pub block_end: &'a str,
}

impl Default for Syntax<'static> {
    fn default() -> Self {
        Self {
            block_start: "<%",
            block_end: "%>",
        }
    }
}

#[derive(Clone, Copy, Default)]
pub(crate) struct Level(u8);

impl Level {
    fn nest(self, i: &str) -> ParseResult<'_, Level> {
        if self.0 >= Self::MAX_DEPTH {
            return Err(ErrorContext::failure(i, "template is nested too deeply"));
        }

        Ok((i, Level(self.0 + 1)))
    }

    /// Nests once for each of `count` wrappers built around one expression.
    fn nest_by(self, i: &str, count: usize) -> ParseResult<'_, Level> {
        let mut level = self;
        for _ in 0..count {
            level = level.nest(i)?.1;
        }
        Ok((i, level))
    }

    fn leave(&self) -> Self {
        Level(self.0 - 1)
    }

    const MAX_DEPTH: u8 = 128;
}
