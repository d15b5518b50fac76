use nom::branch::alt;
use nom::bytes::complete::{tag, take_till};
use nom::character::complete::{char, one_of};
use nom::combinator::{map, not, opt, recognize};
use nom::error::ErrorKind;
use nom::error_position;
use nom::multi::{many0, many1, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};

use super::expr::signed_num_lit;
use super::{
    atom_lit, bool_lit, identifier, is_ws, keyword, not_ws, str_lit, ws, ErrorContext, Expr,
    Level, ParseResult, State, RESERVED,
};

#[derive(Debug, PartialEq)]
pub enum Node<'a> {
    Lit(&'a str),
    Comment(&'a str),
    /// `<%= expr %>`, including printed blocks.
    Expr(Expr<'a>),
    /// `<% expr %>`, evaluated for its effects only.
    Silent(Expr<'a>),
    Let(Pattern<'a>, Expr<'a>),
}

impl<'a> Node<'a> {
    pub(super) fn many(i: &'a str, s: &State<'_>) -> ParseResult<'a, Vec<Self>> {
        many0(alt((
            |i| Self::lit(i, s),
            |i| Self::comment(i, s),
            |i| Self::tag(i, s),
        )))(i)
    }

    fn lit(i: &'a str, s: &State<'_>) -> ParseResult<'a, Self> {
        let start = s.syntax.block_start;
        match i.find(start) {
            _ if i.is_empty() => Err(nom::Err::Error(error_position!(i, ErrorKind::TakeUntil))),
            // `<%%` is the opening delimiter written out literally
            Some(0) if i[start.len()..].starts_with('%') => {
                Ok((&i[start.len() + 1..], Self::Lit(&i[..start.len()])))
            }
            Some(0) => Err(nom::Err::Error(error_position!(i, ErrorKind::TakeUntil))),
            Some(pos) => Ok((&i[pos..], Self::Lit(&i[..pos]))),
            None => Ok(("", Self::Lit(i))),
        }
    }

    fn comment(i: &'a str, s: &State<'_>) -> ParseResult<'a, Self> {
        let (j, _) = pair(|i| s.tag_block_start(i), char('#'))(i)?;
        match j.find(s.syntax.block_end) {
            Some(end) => Ok((
                &j[end + s.syntax.block_end.len()..],
                Self::Comment(&j[..end]),
            )),
            None => Err(ErrorContext::failure(i, "unclosed comment")),
        }
    }

    fn tag(i: &'a str, s: &State<'_>) -> ParseResult<'a, Self> {
        let (j, (_, print)) = pair(|i| s.tag_block_start(i), opt(char('=')))(i)?;
        // `end`, `else` and clause heads belong to the enclosing block
        let (j, _) = not(move |i| terminator(i, s.level.get()))(j)?;

        s.nest(i)?;
        let result = Self::statement(j, s, print.is_some());
        s.leave();
        result
    }

    fn statement(i: &'a str, s: &State<'_>, print: bool) -> ParseResult<'a, Self> {
        let level = s.level.get();
        if !print {
            let (j, binding) = opt(move |i| binding(i, level))(i)?;
            if let Some(pattern) = binding {
                let (j, expr) = ws(move |i| Expr::parse(i, level))(j)?;
                let (j, _) = close_tag(j, s)?;
                return Ok((j, Self::Let(pattern, expr)));
            }
        }

        let (i, expr) = preceded(take_till(not_ws), |i| head(i, s))(i)?;
        Ok((i, if print { Self::Expr(expr) } else { Self::Silent(expr) }))
    }
}

/// Block openers (`if`, `unless`, `for`, `case`, `call(...) do`) or a plain
/// expression, up to and including the closing delimiter.
fn head<'a>(i: &'a str, s: &State<'_>) -> ParseResult<'a, Expr<'a>> {
    let level = s.level.get();
    if let Ok((j, kw)) = alt((keyword("if"), keyword("unless")))(i) {
        let (j, cond) = ws(move |i| Expr::parse(i, level))(j)?;
        let (j, _) = open_block(j, s)?;
        return If::body(j, s, kw == "unless", cond);
    }
    if let Ok((j, _)) = keyword("for")(i) {
        let (j, pattern) = ws(move |i| Pattern::parse(i, level))(j)?;
        let arrow: ParseResult<'_> = tag("<-")(j);
        let (j, _) = match arrow {
            Ok(ok) => ok,
            Err(_) => return Err(ErrorContext::failure(j, "expected `<-` in `for`")),
        };
        let (j, iter) = ws(move |i| Expr::parse(i, level))(j)?;
        let (j, _) = open_block(j, s)?;
        let (j, body) = Node::many(j, s)?;
        let (j, _) = close_block(j, s, "for")?;
        return Ok((j, Expr::For(Box::new(For { pattern, iter, body }))));
    }
    if let Ok((j, _)) = keyword("case")(i) {
        let (j, expr) = ws(move |i| Expr::parse(i, level))(j)?;
        let (j, _) = open_block(j, s)?;
        return Case::body(j, s, expr);
    }

    let (j, expr) = Expr::parse(i, level)?;
    let (j, block) = opt(ws(keyword("do")))(j)?;
    if block.is_none() {
        let (j, _) = close_tag(j, s)?;
        return Ok((j, expr));
    }

    let (name, args) = match expr {
        Expr::Call(name, args) => (name, args),
        _ => {
            return Err(ErrorContext::failure(
                i,
                "only function calls can take a `do` block",
            ))
        }
    };
    let (j, _) = close_tag(j, s)?;
    let (j, body) = Node::many(j, s)?;
    let (j, _) = close_block(j, s, name)?;
    Ok((j, Expr::CallBlock(Box::new(CallBlock { name, args, body }))))
}

#[derive(Debug, PartialEq)]
pub struct If<'a> {
    /// Set for `unless`.
    pub negated: bool,
    pub cond: Expr<'a>,
    pub then: Vec<Node<'a>>,
    pub otherwise: Vec<Node<'a>>,
}

impl<'a> If<'a> {
    fn body(
        i: &'a str,
        s: &State<'_>,
        negated: bool,
        cond: Expr<'a>,
    ) -> ParseResult<'a, Expr<'a>> {
        let (i, then) = Node::many(i, s)?;
        let (i, otherwise) = match block_tag(i, s, "else") {
            Ok((i, _)) => Node::many(i, s)?,
            Err(nom::Err::Error(_)) => (i, Vec::new()),
            Err(err) => return Err(err),
        };
        let (i, _) = close_block(i, s, if negated { "unless" } else { "if" })?;
        Ok((
            i,
            Expr::If(Box::new(Self {
                negated,
                cond,
                then,
                otherwise,
            })),
        ))
    }
}

#[derive(Debug, PartialEq)]
pub struct For<'a> {
    pub pattern: Pattern<'a>,
    pub iter: Expr<'a>,
    pub body: Vec<Node<'a>>,
}

#[derive(Debug, PartialEq)]
pub struct Case<'a> {
    pub expr: Expr<'a>,
    pub clauses: Vec<Clause<'a>>,
}

impl<'a> Case<'a> {
    fn body(i: &'a str, s: &State<'_>, expr: Expr<'a>) -> ParseResult<'a, Expr<'a>> {
        let i = i.trim_start_matches(is_ws);
        let (i, clauses) = match many1(|i| Clause::parse(i, s))(i) {
            Ok(ok) => ok,
            Err(nom::Err::Error(_)) => {
                return Err(ErrorContext::failure(
                    i,
                    "expected a `pattern ->` clause after `case ... do`",
                ))
            }
            Err(err) => return Err(err),
        };
        let (i, _) = close_block(i, s, "case")?;
        Ok((i, Expr::Case(Box::new(Self { expr, clauses }))))
    }
}

#[derive(Debug, PartialEq)]
pub struct Clause<'a> {
    pub pattern: Pattern<'a>,
    pub nodes: Vec<Node<'a>>,
}

impl<'a> Clause<'a> {
    fn parse(i: &'a str, s: &State<'_>) -> ParseResult<'a, Self> {
        let (i, (_, pattern, _)) = tuple((
            |i| s.tag_block_start(i),
            ws(move |i| Pattern::parse(i, s.level.get())),
            tag("->"),
        ))(i)?;
        let (i, _) = close_tag(i, s)?;
        let (i, nodes) = Node::many(i, s)?;
        Ok((i, Self { pattern, nodes }))
    }
}

#[derive(Debug, PartialEq)]
pub struct CallBlock<'a> {
    pub name: &'a str,
    pub args: Vec<Expr<'a>>,
    pub body: Vec<Node<'a>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern<'a> {
    /// `_` or any name starting with an underscore.
    Wildcard,
    Name(&'a str),
    Lit(PatternLit<'a>),
    Tuple(Vec<Pattern<'a>>),
    List(Vec<Pattern<'a>>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatternLit<'a> {
    Nil,
    Bool(&'a str),
    /// May carry a leading `-`.
    Num(&'a str),
    Str(&'a str),
    Atom(&'a str),
}

impl<'a> Pattern<'a> {
    pub(super) fn parse(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        alt((
            map(Self::lit, Self::Lit),
            Self::name,
            move |i| Self::tuple(i, level),
            move |i| Self::list(i, level),
        ))(i)
    }

    /// Names bound by this pattern, in source order.
    pub fn bindings(&self) -> Vec<&'a str> {
        let mut names = Vec::new();
        self.collect_bindings(&mut names);
        names
    }

    fn collect_bindings(&self, names: &mut Vec<&'a str>) {
        match self {
            Self::Name(name) => names.push(name),
            Self::Tuple(items) | Self::List(items) => {
                for item in items {
                    item.collect_bindings(names);
                }
            }
            Self::Wildcard | Self::Lit(_) => {}
        }
    }

    fn lit(i: &'a str) -> ParseResult<'a, PatternLit<'a>> {
        alt((
            map(keyword("nil"), |_| PatternLit::Nil),
            map(bool_lit, PatternLit::Bool),
            map(signed_num_lit, PatternLit::Num),
            map(str_lit, PatternLit::Str),
            map(atom_lit, PatternLit::Atom),
        ))(i)
    }

    fn name(i: &'a str) -> ParseResult<'a, Self> {
        let (j, name) = identifier(i)?;
        if name.starts_with('_') {
            Ok((j, Self::Wildcard))
        } else if RESERVED.contains(&name) {
            Err(nom::Err::Error(error_position!(i, ErrorKind::Tag)))
        } else {
            Ok((j, Self::Name(name)))
        }
    }

    fn tuple(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        let (_, level) = level.nest(i)?;
        map(
            delimited(
                char('{'),
                separated_list0(char(','), ws(move |i| Self::parse(i, level))),
                preceded(take_till(not_ws), char('}')),
            ),
            Self::Tuple,
        )(i)
    }

    fn list(i: &'a str, level: Level) -> ParseResult<'a, Self> {
        let (_, level) = level.nest(i)?;
        map(
            delimited(
                char('['),
                separated_list0(char(','), ws(move |i| Self::parse(i, level))),
                preceded(take_till(not_ws), char(']')),
            ),
            Self::List,
        )(i)
    }
}

/// `pattern =` at the start of a silent tag.
fn binding(i: &str, level: Level) -> ParseResult<'_, Pattern<'_>> {
    terminated(
        ws(move |i| Pattern::parse(i, level)),
        pair(char('='), not(one_of("=~>"))),
    )(i)
}

/// Words that close or continue an enclosing block rather than open a tag.
fn terminator(i: &str, level: Level) -> ParseResult<'_> {
    preceded(
        take_till(not_ws),
        alt((
            keyword("end"),
            keyword("else"),
            recognize(pair(ws(move |i| Pattern::parse(i, level)), tag("->"))),
        )),
    )(i)
}

fn close_tag<'a>(i: &'a str, s: &State<'_>) -> ParseResult<'a> {
    match preceded(take_till(not_ws), |i| s.tag_block_end(i))(i) {
        Err(nom::Err::Error(err)) => Err(nom::Err::Failure(err)),
        res => res,
    }
}

fn open_block<'a>(i: &'a str, s: &State<'_>) -> ParseResult<'a> {
    match ws(keyword("do"))(i) {
        Ok((i, _)) => close_tag(i, s),
        Err(nom::Err::Error(_)) => Err(ErrorContext::failure(i, "expected `do`")),
        Err(err) => Err(err),
    }
}

fn block_tag<'a>(i: &'a str, s: &State<'_>, word: &'static str) -> ParseResult<'a> {
    recognize(tuple((
        |i| s.tag_block_start(i),
        ws(keyword(word)),
        |i| s.tag_block_end(i),
    )))(i)
}

fn close_block<'a>(i: &'a str, s: &State<'_>, block: &str) -> ParseResult<'a> {
    match block_tag(i, s, "end") {
        Err(nom::Err::Error(_)) => Err(ErrorContext::failure(
            i,
            format!("expected `end` to close `{block}` block"),
        )),
        res => res,
    }
}
