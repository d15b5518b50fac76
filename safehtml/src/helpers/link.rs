use safehtml_escape::Safe;

use super::tag::content_tag;
use super::{arity, take_do, Options};
use crate::environment::{Environment, State};
use crate::value::Value;
use crate::{Error, Result};

pub(super) fn register(env: &mut Environment) {
    env.add_function("link", link_fn)
        .add_function("button", button_fn);
}

/// An `<a>` tag pointing at the `to:` option.
///
/// Any `method:` other than `get` turns the link into one that a script
/// submits: the method, destination and a CSRF token are rendered as
/// `data-*` attributes and `rel="nofollow"` is added. The token comes from
/// the render's [`CsrfTokenSource`](crate::CsrfTokenSource) unless
/// `csrf_token:` is a string or `false`.
///
/// Destinations starting with `javascript:` are rejected; pass
/// `{:javascript, "..."}` to opt in.
pub fn link(state: &State<'_>, text: Value, opts: &Value) -> Result<Safe> {
    let mut opts = Options::parse("link", opts)?;
    let to = required_to("link", &mut opts, "expected non-nil value for :to in link/2")?;
    let method = method("link", &mut opts, "get")?;
    let csrf = opts.take("csrf_token");

    let mut attrs = Options::default();
    if method != "get" {
        attrs.push("data", link_data(state, &to, &method, csrf)?);
    }
    attrs.push("href", to);
    if method != "get" && opts.get("rel").is_none() {
        attrs.push("rel", "nofollow");
    }
    attrs.extend(opts);
    content_tag("a", text, &attrs.into_value())
}

/// A `<button>` that submits to the `to:` option with `method:` (default
/// `post`) through `data-*` attributes, like [`link`].
pub fn button(state: &State<'_>, text: Value, opts: &Value) -> Result<Safe> {
    let mut opts = Options::parse("button", opts)?;
    let to = required_to("button", &mut opts, "option :to is required in button/2")?;
    let method = method("button", &mut opts, "post")?;
    let csrf = opts.take("csrf_token");

    let mut attrs = Options::default();
    attrs.push("data", link_data(state, &to, &method, csrf)?);
    attrs.extend(opts);
    content_tag("button", text, &attrs.into_value())
}

/// `[csrf: token, method: method, to: to]`, without the token for `get`.
fn link_data(state: &State<'_>, to: &Value, method: &str, csrf: Option<Value>) -> Result<Value> {
    let mut data = Options::default();
    if method != "get" {
        let token = match csrf {
            None | Some(Value::Bool(true)) => Some(state.csrf_token(Some(&destination(to)))?),
            Some(Value::Bool(false)) => None,
            Some(Value::Str(token)) => Some(token),
            Some(other) => {
                return Err(Error::function(
                    "link",
                    format!("expected :csrf_token to be a boolean or a string, got: {other}"),
                ))
            }
        };
        if let Some(token) = token {
            data.push("csrf", token);
        }
    }
    data.push("method", method);
    data.push("to", to.clone());
    Ok(data.into_value())
}

fn required_to(helper: &str, opts: &mut Options, missing: &str) -> Result<Value> {
    match opts.take("to") {
        None | Some(Value::Nil) => Err(Error::function(helper, missing)),
        Some(to) => valid_destination(helper, to),
    }
}

fn valid_destination(helper: &str, to: Value) -> Result<Value> {
    match to {
        Value::Str(s) => {
            if s.trim_start().to_ascii_lowercase().starts_with("javascript:") {
                return Err(Error::function(
                    helper,
                    format!(
                        "unsupported scheme given as link: {s:?}. Use a tuple such as \
                         {{:javascript, rest}} if this is intended"
                    ),
                ));
            }
            Ok(Value::Str(s))
        }
        Value::Safe(_) => Ok(to),
        Value::Tuple(ref items) => match items.as_slice() {
            [Value::Atom(scheme), Value::Str(rest)] if scheme != "safe" => {
                Ok(Value::Str(format!("{scheme}:{rest}")))
            }
            [Value::Atom(scheme), payload] if scheme == "safe" => {
                Ok(Value::Safe(super::raw(payload)?))
            }
            _ => Err(Error::function(helper, format!("invalid destination: {to}"))),
        },
        other => Err(Error::function(helper, format!("invalid destination: {other}"))),
    }
}

fn destination(to: &Value) -> String {
    match to {
        Value::Safe(safe) => safe.to_string(),
        other => other.as_str().unwrap_or_default().to_owned(),
    }
}

fn method(helper: &str, opts: &mut Options, default: &str) -> Result<String> {
    match opts.take("method") {
        None | Some(Value::Nil) => Ok(default.to_owned()),
        Some(Value::Str(m) | Value::Atom(m)) => Ok(m.to_ascii_lowercase()),
        Some(other) => Err(Error::function(
            helper,
            format!("expected :method to be an atom or a string, got: {other}"),
        )),
    }
}

/// `link(text, opts)` or `link(opts) do ... end`.
fn link_fn(state: &State<'_>, args: Vec<Value>) -> Result<Value> {
    let (text, opts) = text_and_opts("link", args)?;
    link(state, text, &opts).map(Value::Safe)
}

fn button_fn(state: &State<'_>, args: Vec<Value>) -> Result<Value> {
    let (text, opts) = text_and_opts("button", args)?;
    button(state, text, &opts).map(Value::Safe)
}

fn text_and_opts(helper: &str, mut args: Vec<Value>) -> Result<(Value, Value)> {
    match take_do(&mut args) {
        Some(body) => {
            arity(helper, &args, 0..=1)?;
            Ok((body, args.pop().unwrap_or_default()))
        }
        None => {
            arity(helper, &args, 2..=2)?;
            let opts = args.pop().unwrap_or_default();
            Ok((args.pop().unwrap_or_default(), opts))
        }
    }
}
