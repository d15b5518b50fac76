use nom::branch::alt;
use nom::bytes::complete::{tag, take_till};
use nom::character::complete::{char, one_of};
use nom::combinator::{cut, map, not, opt, recognize};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated};

use super::node::{CallBlock, Case, For, If};
use super::{
    atom_lit, bool_lit, identifier, keyword, name, not_ws, num_lit, str_lit, ws, ErrorContext,
    Level, ParseResult,
};

macro_rules! expr_prec_layer {
    ( $name:ident, $inner:ident, $op:expr ) => {
        fn $name(i: &'a str, level: Level) -> ParseResult<'a, Self> {
            let (i, left) = Self::$inner(i, level)?;
            let (i, right) = many0(pair(ws($op), move |i| Self::$inner(i, level)))(i)?;
            level.nest_by(i, right.len())?;
            Ok((
                i,
                right.into_iter().fold(left, |left, (op, right)| {
                    Self::BinOp(op, Box::new(left), Box::new(right))
                }),
            ))
        }
    };
    ( $name:ident, $inner:ident, $( $op:expr ),+ ) => {
        fn $name(i: &'a str, level: Level) -> ParseResult<'a, Self> {
            let (i, left) = Self::$inner(i, level)?;
            let (i, right) = many0(pair(
                ws(alt(($( $op ),+,))),
                move |i| Self::$inner(i, level),
            ))(i)?;
            level.nest_by(i, right.len())?;
            Ok((
                i,
                right.into_iter().fold(left, |left, (op, right)| {
                    Self::BinOp(op, Box::new(left), Box::new(right))
                }),
            ))
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Expr<'a> {
    Nil,
    BoolLit(&'a str),
    NumLit(&'a str),
    /// Raw contents between the quotes, escape sequences still in place.
    StrLit(&'a str),
    Atom(&'a str),
    /// `@name`: a lookup into the template's assigns.
    Assign(&'a str),
    Var(&'a str),
    List(Vec<Expr<'a>>),
    Tuple(Vec<Expr<'a>>),
    Attr(Box<Expr<'a>>, &'a str),
    Index(Box<Expr<'a>>, Box<Expr<'a>>),
    Call(&'a str, Vec<Expr<'a>>),
    Unary(&'a str, Box<Expr<'a>>),
    BinOp(&'a str, Box<Expr<'a>>, Box<Expr<'a>>),
    Group(Box<Expr<'a>>),
    If(Box<If<'a>>),
    For(Box<For<'a>>),
    Case(Box<Case<'a>>),
    CallBlock(Box<CallBlock<'a>>),
}

enum Arg<'a> {
    Positional(Expr<'a>),
    Keyword(&'a str, Expr<'a>),
}

impl<'a> Expr<'a> {
    /// Parses call arguments. Trailing `key: value` pairs are collected into
    /// a single keyword list passed as the last argument.
    pub(super) fn arguments(i: &'a str, level: Level) -> ParseResult<'a, Vec<Self>> {
        let (_, level) = level.nest(i)?;
        let start = i;
        let (i, items) = preceded(
            char('('),
            cut(terminated(
                separated_list0(char(','), ws(move |i| Self::arg(i, level))),
                preceded(take_till(not_ws), char(')')),
            )),
        )(i)?;

        let mut args = Vec::with_capacity(items.len());
        let mut keywords = Vec::new();
        for item in items {
            match item {
                Arg::Positional(expr) if keywords.is_empty() => args.push(expr),
                Arg::Positional(_) => {
                    return Err(ErrorContext::failure(
                        start,
                        "keyword arguments must come after positional arguments",
                    ))
                }
                Arg::Keyword(key, value) => keywords.push(Self::keyword_pair(key, value)),
            }
        }
        if !keywords.is_empty() {
            args.push(Self::List(keywords));
        }
        Ok((i, args))
    }

    pub(super) fn parse(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        Self::or(i, level)
    }

    fn keyword_pair(key: &'a str, value: Self) -> Self {
        Self::Tuple(vec![Self::Atom(key), value])
    }

    fn arg(i: &'a str, level: Level) -> ParseResult<'a, Arg<'a>> {
        alt((
            map(
                pair(Self::keyword_key, ws(move |i| Self::parse(i, level))),
                |(key, value)| Arg::Keyword(key, value),
            ),
            map(move |i| Self::parse(i, level), Arg::Positional),
        ))(i)
    }

    /// `key:` in a keyword pair; the colon must directly follow the name.
    fn keyword_key(i: &'a str) -> ParseResult<'a> {
        terminated(identifier, pair(char(':'), not(char(':'))))(i)
    }

    expr_prec_layer!(or, and, tag("||"), keyword("or"));
    expr_prec_layer!(and, equality, tag("&&"), keyword("and"));
    expr_prec_layer!(equality, relational, tag("=="), tag("!="));
    expr_prec_layer!(
        relational,
        concat,
        tag("<="),
        tag(">="),
        terminated(tag("<"), not(one_of("<>-="))),
        tag(">")
    );
    expr_prec_layer!(
        concat,
        addsub,
        tag("<>"),
        terminated(tag(".."), not(char('.')))
    );
    expr_prec_layer!(
        addsub,
        muldiv,
        tag("+"),
        terminated(tag("-"), not(char('>')))
    );
    expr_prec_layer!(muldiv, prefix, tag("*"), tag("/"));

    fn prefix(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        let (i, ops) = many0(ws(alt((
            terminated(tag("!"), not(char('='))),
            keyword("not"),
            tag("-"),
        ))))(i)?;
        let (_, level) = level.nest_by(i, ops.len())?;
        let (i, mut expr) = Suffix::parse(i, level)?;
        for op in ops.into_iter().rev() {
            expr = Self::Unary(op, Box::new(expr));
        }
        Ok((i, expr))
    }

    fn single(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        alt((
            Self::nil,
            Self::bool,
            Self::num,
            Self::str,
            Self::atom,
            Self::assign,
            move |i| Self::call(i, level),
            Self::var,
            move |i| Self::list(i, level),
            move |i| Self::tuple(i, level),
            move |i| Self::group(i, level),
        ))(i)
    }

    fn group(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        let (_, level) = level.nest(i)?;
        map(
            delimited(
                char('('),
                cut(ws(move |i| Self::parse(i, level))),
                cut(char(')')),
            ),
            |expr| Self::Group(Box::new(expr)),
        )(i)
    }

    fn list(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        let (_, level) = level.nest(i)?;
        let item = move |i: &'a str| {
            alt((
                map(
                    pair(Self::keyword_key, ws(move |i| Self::parse(i, level))),
                    |(key, value)| Self::keyword_pair(key, value),
                ),
                move |i| Self::parse(i, level),
            ))(i)
        };
        map(
            delimited(
                ws(char('[')),
                cut(terminated(
                    separated_list0(char(','), ws(item)),
                    opt(char(',')),
                )),
                cut(ws(char(']'))),
            ),
            Self::List,
        )(i)
    }

    fn tuple(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        let (_, level) = level.nest(i)?;
        map(
            delimited(
                char('{'),
                cut(separated_list0(char(','), ws(move |i| Self::parse(i, level)))),
                cut(ws(char('}'))),
            ),
            Self::Tuple,
        )(i)
    }

    fn call(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        let (i, (fname, args)) = pair(name, move |i| Self::arguments(i, level))(i)?;
        Ok((i, Self::Call(fname, args)))
    }

    fn var(i: &'a str) -> ParseResult<'a, Self> {
        map(name, Self::Var)(i)
    }

    fn assign(i: &'a str) -> ParseResult<'a, Self> {
        map(preceded(char('@'), cut(identifier)), Self::Assign)(i)
    }

    fn atom(i: &'a str) -> ParseResult<'a, Self> {
        map(atom_lit, Self::Atom)(i)
    }

    fn str(i: &'a str) -> ParseResult<'a, Self> {
        map(str_lit, Self::StrLit)(i)
    }

    fn num(i: &'a str) -> ParseResult<'a, Self> {
        map(num_lit, Self::NumLit)(i)
    }

    fn bool(i: &'a str) -> ParseResult<'a, Self> {
        map(bool_lit, Self::BoolLit)(i)
    }

    fn nil(i: &'a str) -> ParseResult<'a, Self> {
        map(keyword("nil"), |_| Self::Nil)(i)
    }
}

enum Suffix<'a> {
    Attr(&'a str),
    Index(Expr<'a>),
}

impl<'a> Suffix<'a> {
    fn parse(i: &'a str, mut level: Level) -> ParseResult<'a, Expr<'a>> {
        let (mut i, mut expr) = Expr::single(i, level)?;
        loop {
            let (j, suffix) = opt(alt((Self::attr, move |i| Self::index(i, level))))(i)?;
            if suffix.is_some() {
                // every suffix wraps the expression once more
                level = level.nest(i)?.1;
            }

            match suffix {
                Some(Self::Attr(attr)) => expr = Expr::Attr(expr.into(), attr),
                Some(Self::Index(index)) => expr = Expr::Index(expr.into(), index.into()),
                None => break,
            }

            i = j;
        }
        Ok((i, expr))
    }

    fn attr(i: &'a str) -> ParseResult<'a, Self> {
        map(
            preceded(pair(char('.'), not(char('.'))), cut(identifier)),
            Self::Attr,
        )(i)
    }

    fn index(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        let (_, level) = level.nest(i)?;
        map(
            preceded(
                char('['),
                cut(terminated(ws(move |i| Expr::parse(i, level)), char(']'))),
            ),
            Self::Index,
        )(i)
    }
}

/// A negative number literal, as allowed in patterns.
pub(super) fn signed_num_lit(i: &str) -> ParseResult<'_> {
    recognize(pair(opt(char('-')), num_lit))(i)
}

#[cfg(test)]
pub(super) fn parse_expr(src: &str) -> ParseResult<'_, Expr<'_>> {
    terminated(ws(|i| Expr::parse(i, Level::default())), nom::combinator::eof)(src)
}
