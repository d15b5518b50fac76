//! Built-in helpers.
//!
//! Each helper is a plain Rust function and is also registered under the
//! same name in every new [`Environment`], where options are passed as a
//! trailing keyword list:
//!
//! ```text
//! <%= link("Delete", to: "/posts/1", method: :delete) %>
//! <%= form_tag("/posts", method: :put) do %>...<% end %>
//! ```

use std::ops::RangeInclusive;

use crate::environment::Environment;
use crate::value::Value;
use crate::{Error, Result};

mod escape;
mod form;
mod format;
mod link;
mod tag;

pub use escape::{escape_javascript, html_escape, javascript_escape, raw, safe_to_string};
pub use form::{csrf_meta_tag, csrf_token_value, form_tag};
pub use format::text_to_html;
pub use link::{button, link};
pub use tag::{attributes_escape, content_tag, img_tag, tag};

pub(crate) fn register(env: &mut Environment) {
    escape::register(env);
    tag::register(env);
    link::register(env);
    form::register(env);
    format::register(env);
}

/// The key of an option or attribute. Atom keys are dasherized when they
/// become attribute names, string keys are used as given.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Key {
    Atom(String),
    Str(String),
}

impl Key {
    fn is(&self, name: &str) -> bool {
        matches!(self, Self::Atom(key) if key == name)
    }

    fn into_value(self) -> Value {
        match self {
            Self::Atom(key) => Value::Atom(key),
            Self::Str(key) => Value::Str(key),
        }
    }
}

/// An ordered list of options, read from a keyword list or a map.
#[derive(Clone, Debug, Default)]
pub(crate) struct Options {
    pairs: Vec<(Key, Value)>,
}

impl Options {
    pub(crate) fn parse(helper: &str, value: &Value) -> Result<Self> {
        let invalid = || Error::function(helper, format!("expected a keyword list, got: {value}"));
        let pairs = match value {
            Value::Nil => Vec::new(),
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| (Key::Atom(k.clone()), v.clone()))
                .collect(),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::Tuple(pair) => match pair.as_slice() {
                        [Value::Atom(k), v] => Ok((Key::Atom(k.clone()), v.clone())),
                        [Value::Str(k), v] => Ok((Key::Str(k.clone()), v.clone())),
                        _ => Err(invalid()),
                    },
                    _ => Err(invalid()),
                })
                .collect::<Result<_>>()?,
            _ => return Err(invalid()),
        };
        Ok(Self { pairs })
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.pairs.iter().find(|(k, _)| k.is(key)).map(|(_, v)| v)
    }

    /// Removes every `key` entry, returning the first.
    pub(crate) fn take(&mut self, key: &str) -> Option<Value> {
        let mut found = None;
        self.pairs.retain_mut(|(k, v)| {
            if !k.is(key) {
                return true;
            }
            if found.is_none() {
                found = Some(std::mem::take(v));
            }
            false
        });
        found
    }

    pub(crate) fn push(&mut self, key: &str, value: impl Into<Value>) {
        self.pairs.push((Key::Atom(key.to_owned()), value.into()));
    }

    /// Inserts `key` in front unless it is already present.
    pub(crate) fn put_new(&mut self, key: &str, value: impl Into<Value>) {
        if self.get(key).is_none() {
            self.pairs.insert(0, (Key::Atom(key.to_owned()), value.into()));
        }
    }

    pub(crate) fn extend(&mut self, other: Options) {
        self.pairs.extend(other.pairs);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub(crate) fn into_pairs(self) -> Vec<(Key, Value)> {
        self.pairs
    }

    pub(crate) fn into_value(self) -> Value {
        Value::List(
            self.pairs
                .into_iter()
                .map(|(k, v)| Value::Tuple(vec![k.into_value(), v]))
                .collect(),
        )
    }
}

/// Removes the `do:` option from a trailing keyword list, dropping the
/// list if nothing else is left in it.
pub(crate) fn take_do(args: &mut Vec<Value>) -> Option<Value> {
    let has_do = match args.last().and_then(Value::as_keywords) {
        Some(pairs) => pairs.iter().any(|(k, _)| *k == "do"),
        None => false,
    };
    if !has_do {
        return None;
    }

    let mut opts = Options::parse("do", args.pop().as_ref()?).ok()?;
    let body = opts.take("do");
    if !opts.is_empty() {
        args.push(opts.into_value());
    }
    body
}

pub(crate) fn arity(helper: &str, args: &[Value], expected: RangeInclusive<usize>) -> Result<()> {
    if expected.contains(&args.len()) {
        return Ok(());
    }
    let expected = match expected.start() == expected.end() {
        true => expected.start().to_string(),
        false => format!("{} to {}", expected.start(), expected.end()),
    };
    Err(Error::function(
        helper,
        format!("expected {expected} argument(s), got {}", args.len()),
    ))
}

/// Text of a string, atom or safe argument.
pub(crate) fn string_arg(helper: &str, value: &Value) -> Result<String> {
    match value {
        Value::Str(s) | Value::Atom(s) => Ok(s.clone()),
        Value::Safe(safe) => Ok(safe.to_string()),
        other => Err(Error::function(
            helper,
            format!("expected a string, got: {other}"),
        )),
    }
}

fn dasherize(name: &str) -> String {
    name.replace('_', "-")
}

#[cfg(test)]
mod tests {
    use safehtml_escape::Safe;

    use super::*;

    #[test]
    fn test_options() {
        let value = Value::List(vec![
            Value::Tuple(vec![Value::atom("to"), Value::str("/")]),
            Value::Tuple(vec![Value::str("data-x"), Value::Int(1)]),
            Value::Tuple(vec![Value::atom("to"), Value::str("/other")]),
        ]);
        let mut opts = Options::parse("link", &value).unwrap();
        assert_eq!(opts.get("data-x"), None);
        assert_eq!(opts.take("to"), Some(Value::str("/")));
        assert_eq!(opts.take("to"), None);
        opts.put_new("rel", "nofollow");
        assert_eq!(
            opts.into_value(),
            Value::List(vec![
                Value::Tuple(vec![Value::atom("rel"), Value::str("nofollow")]),
                Value::Tuple(vec![Value::str("data-x"), Value::Int(1)]),
            ])
        );

        assert_eq!(
            Options::parse("tag", &Value::Int(1)).unwrap_err().to_string(),
            "tag: expected a keyword list, got: 1",
        );
    }

    #[test]
    fn test_take_do() {
        let body = Value::Safe(Safe::raw("<p>"));
        let mut args = vec![
            Value::str("/"),
            Value::keywords([("method", Value::atom("put")), ("do", body.clone())]),
        ];
        assert_eq!(take_do(&mut args), Some(body.clone()));
        assert_eq!(args[1], Value::keywords([("method", Value::atom("put"))]));

        let mut args = vec![Value::keywords([("do", body.clone())])];
        assert_eq!(take_do(&mut args), Some(body));
        assert!(args.is_empty());

        let mut args = vec![Value::str("x")];
        assert_eq!(take_do(&mut args), None);
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_arity() {
        assert!(arity("tag", &[Value::Nil], 1..=2).is_ok());
        assert_eq!(
            arity("raw", &[], 1..=1).unwrap_err().to_string(),
            "raw: expected 1 argument(s), got 0",
        );
    }
}
