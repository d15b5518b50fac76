//! Turning printed values into safe HTML.
//!
//! [`escape_value`] is what a rendered `<%= expr %>` goes through. When the
//! expression is a literal, [`literal`] does the same work while the
//! template is compiled, so the result can be stored as static text.

use std::borrow::Cow;

use safehtml_escape::{escape, Safe};
use safehtml_parser::Expr;

use crate::safe::ToSafe;
use crate::unescape::unescape;
use crate::value::Value;
use crate::Result;

/// Escapes the result of a printed expression.
///
/// Safe content passes through and strings are escaped directly; anything
/// else goes through [`ToSafe`]. The output is byte-identical to calling
/// `value.to_safe()`.
pub fn escape_value(value: Value) -> Result<Safe> {
    match value {
        Value::Safe(safe) => Ok(safe),
        Value::Str(s) => Ok(escape_string(s)),
        other => other.to_safe(),
    }
}

/// Escapes an owned string, reusing its buffer when nothing needs escaping.
pub fn escape_string(s: String) -> Safe {
    let escaped = match escape(&s) {
        Cow::Owned(escaped) => Some(escaped),
        Cow::Borrowed(_) => None,
    };
    Safe::raw(escaped.unwrap_or(s))
}

/// Returns the escaped text of `expr` if it is a literal whose output is
/// known before rendering: strings, numbers (optionally negated), atoms,
/// booleans and `nil`.
pub fn literal(expr: &Expr<'_>) -> Option<String> {
    let value = literal_value(expr)?;
    let safe = value.to_safe().ok()?;
    Some(safe.into_string())
}

/// Evaluates literal expressions, the ones [`literal`] can inline.
pub(crate) fn literal_value(expr: &Expr<'_>) -> Option<Value> {
    match expr {
        Expr::Nil => Some(Value::Nil),
        Expr::BoolLit(b) => Some(Value::Bool(*b == "true")),
        Expr::NumLit(n) => num_value(n).ok(),
        Expr::StrLit(s) => unescape(s).ok().map(Value::Str),
        Expr::Atom(a) => Some(Value::atom(*a)),
        Expr::Unary("-", inner) => match literal_value(inner)? {
            Value::Int(i) => i.checked_neg().map(Value::Int),
            Value::Float(f) => Some(Value::Float(-f)),
            _ => None,
        },
        Expr::Group(inner) => literal_value(inner),
        _ => None,
    }
}

/// Parses a number literal; `_` separators are ignored.
pub(crate) fn num_value(lit: &str) -> std::result::Result<Value, String> {
    let digits: String = lit.chars().filter(|&c| c != '_').collect();
    if digits.contains(&['.', 'e', 'E'][..]) {
        digits
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("invalid float literal `{lit}`: {e}"))
    } else {
        digits
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| format!("invalid integer literal `{lit}`: {e}"))
    }
}
