use safehtml_escape::Safe;

use super::{arity, dasherize, string_arg, take_do, Key, Options};
use crate::environment::{Environment, State};
use crate::escaping::escape_value;
use crate::value::Value;
use crate::{Error, Result};

pub(super) fn register(env: &mut Environment) {
    env.add_function("attributes_escape", attributes_escape_fn)
        .add_function("tag", tag_fn)
        .add_function("content_tag", content_tag_fn)
        .add_function("img_tag", img_tag_fn);
}

/// Renders a keyword list (or map) as HTML attributes, each with a leading
/// space.
///
/// * atom keys are dasherized: `http_equiv` becomes `http-equiv`
/// * `true` renders a bare attribute, `false` and `nil` nothing at all
/// * `data:`, `aria:` and `phx:` take nested options that are prefixed,
///   so `data: [confirm: "?"]` renders `data-confirm="?"`
/// * `class:` takes a list whose truthy entries are joined with spaces
///
/// Keys and values are escaped; safe values are used as given.
pub fn attributes_escape(attrs: &Value) -> Result<Safe> {
    let mut out = Safe::new();
    write_attrs(&mut out, None, Options::parse("attributes_escape", attrs)?)?;
    Ok(out)
}

fn write_attrs(out: &mut Safe, prefix: Option<&str>, attrs: Options) -> Result<()> {
    for (key, value) in attrs.into_pairs() {
        let name = match (&key, prefix) {
            (Key::Atom(k), None) => dasherize(k),
            (Key::Str(k), None) => k.clone(),
            (Key::Atom(k), Some(prefix)) => format!("{prefix}-{}", dasherize(k)),
            (Key::Str(k), Some(prefix)) => format!("{prefix}-{k}"),
        };
        let nested = prefix.is_some() || ["data", "aria", "phx"].iter().any(|k| key.is(k));

        match value {
            Value::List(_) | Value::Map(_) if nested => {
                let attrs = Options::parse("attributes_escape", &value)?;
                write_attrs(out, Some(&name), attrs)?;
            }
            Value::List(items) if key.is("class") => {
                let mut classes = Vec::new();
                class_list(&items, &mut classes)?;
                write_attr(out, &name, Safe::escape(&classes.join(" ")));
            }
            Value::Bool(true) => {
                out.push_static(" ");
                out.push_escaped(&name);
            }
            Value::Bool(false) | Value::Nil => {}
            value => write_attr(out, &name, escape_value(value)?),
        }
    }
    Ok(())
}

fn write_attr(out: &mut Safe, name: &str, value: Safe) {
    out.push_static(" ");
    out.push_escaped(name);
    out.push_static("=\"");
    out.push(value);
    out.push_static("\"");
}

fn class_list(items: &[Value], classes: &mut Vec<String>) -> Result<()> {
    for item in items {
        match item {
            Value::Nil | Value::Bool(false) => {}
            Value::Str(s) | Value::Atom(s) if s.is_empty() => {}
            Value::Str(s) | Value::Atom(s) => classes.push(s.clone()),
            Value::Safe(safe) => classes.push(safe.to_string()),
            Value::List(items) => class_list(items, classes)?,
            other => {
                return Err(Error::function(
                    "attributes_escape",
                    format!("invalid class name: {other}"),
                ))
            }
        }
    }
    Ok(())
}

/// An opening tag: `tag("br", &Value::Nil)` renders `<br>`.
pub fn tag(name: &str, attrs: &Value) -> Result<Safe> {
    let mut out = Safe::with_capacity(4);
    out.push_static("<");
    out.push_escaped(name);
    out.push(attributes_escape(attrs)?);
    out.push_static(">");
    Ok(out)
}

/// An element wrapping `content`, which is escaped unless it is safe.
pub fn content_tag(name: &str, content: Value, attrs: &Value) -> Result<Safe> {
    let mut out = tag(name, attrs)?;
    out.push(escape_value(content)?);
    out.push_static("</");
    out.push_escaped(name);
    out.push_static(">");
    Ok(out)
}

/// An `<img>` tag; `src` comes first unless `attrs` carries its own.
pub fn img_tag(src: &str, attrs: &Value) -> Result<Safe> {
    let mut attrs = Options::parse("img_tag", attrs)?;
    attrs.put_new("src", src);
    tag("img", &attrs.into_value())
}

fn attributes_escape_fn(_: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("attributes_escape", &args, 1..=1)?;
    attributes_escape(&args[0]).map(Value::Safe)
}

fn tag_fn(_: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("tag", &args, 1..=2)?;
    let name = string_arg("tag", &args[0])?;
    tag(&name, args.get(1).unwrap_or(&Value::Nil)).map(Value::Safe)
}

/// `content_tag(name, content, attrs)`, or with the content given as a
/// `do` block: `content_tag(name, attrs) do ... end`.
fn content_tag_fn(_: &State<'_>, mut args: Vec<Value>) -> Result<Value> {
    let body = take_do(&mut args);
    let max = if body.is_some() { 2 } else { 3 };
    arity("content_tag", &args, 1..=max)?;

    let mut args = args.into_iter();
    let name = string_arg("content_tag", &args.next().unwrap_or_default())?;
    let (content, attrs) = match body {
        Some(body) => (body, args.next().unwrap_or_default()),
        None => (args.next().unwrap_or_default(), args.next().unwrap_or_default()),
    };
    content_tag(&name, content, &attrs).map(Value::Safe)
}

fn img_tag_fn(_: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("img_tag", &args, 1..=2)?;
    let src = string_arg("img_tag", &args[0])?;
    img_tag(&src, args.get(1).unwrap_or(&Value::Nil)).map(Value::Safe)
}
