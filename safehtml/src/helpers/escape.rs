use safehtml_escape::Safe;

use super::arity;
use crate::environment::{Environment, State};
use crate::escaping::escape_value;
use crate::safe::ToSafe;
use crate::value::Value;
use crate::{Error, Result};

pub(super) fn register(env: &mut Environment) {
    env.add_function("raw", raw_fn)
        .add_function("html_escape", html_escape_fn)
        .add_function("safe_to_string", safe_to_string_fn)
        .add_function("javascript_escape", javascript_escape_fn);
}

/// Marks a string or byte list as safe without escaping it. `nil` is the
/// empty string and safe content is returned as is.
pub fn raw(value: &Value) -> Result<Safe> {
    match value {
        Value::Nil => Ok(Safe::new()),
        Value::Str(s) => Ok(Safe::raw(s.clone())),
        Value::Safe(safe) => Ok(safe.clone()),
        Value::List(_) => Value::Tuple(vec![Value::atom("safe"), value.clone()]).to_safe(),
        Value::Tuple(_) if is_safe_tuple(value) => value.to_safe(),
        other => Err(Error::function(
            "raw",
            format!("expected a string, a byte list or safe content, got: {other}"),
        )),
    }
}

/// Escapes `value` the same way printing it would.
pub fn html_escape(value: &Value) -> Result<Safe> {
    escape_value(value.clone())
}

/// Flattens safe content back into a plain string.
pub fn safe_to_string(value: &Value) -> Result<String> {
    match value {
        Value::Safe(safe) => Ok(safe.clone().into_string()),
        Value::Tuple(_) if is_safe_tuple(value) => Ok(value.to_safe()?.into_string()),
        other => Err(Error::function(
            "safe_to_string",
            format!("expected safe content, got: {other}"),
        )),
    }
}

/// Escapes a string for use inside a JavaScript string literal. Safe
/// content stays safe.
pub fn javascript_escape(value: &Value) -> Result<Value> {
    match value {
        Value::Str(s) => Ok(Value::Str(escape_javascript(s))),
        Value::Safe(_) | Value::Tuple(_) => {
            let s = safe_to_string(value)?;
            Ok(Value::Safe(Safe::raw(escape_javascript(&s))))
        }
        other => Err(Error::function(
            "javascript_escape",
            format!("expected a string or safe content, got: {other}"),
        )),
    }
}

pub fn escape_javascript(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str("\\n");
            }
            '\r' | '\n' => out.push_str("\\n"),
            '<' if chars.peek() == Some(&'/') => {
                chars.next();
                out.push_str("<\\/");
            }
            '\\' | '"' | '\'' | '`' => {
                out.push('\\');
                out.push(c);
            }
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '\0' => out.push_str("\\u0000"),
            c => out.push(c),
        }
    }
    out
}

fn is_safe_tuple(value: &Value) -> bool {
    matches!(value, Value::Tuple(items) if matches!(items.first(), Some(Value::Atom(tag)) if tag == "safe"))
}

fn raw_fn(_: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("raw", &args, 1..=1)?;
    raw(&args[0]).map(Value::Safe)
}

fn html_escape_fn(_: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("html_escape", &args, 1..=1)?;
    html_escape(&args[0]).map(Value::Safe)
}

fn safe_to_string_fn(_: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("safe_to_string", &args, 1..=1)?;
    safe_to_string(&args[0]).map(Value::Str)
}

fn javascript_escape_fn(_: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("javascript_escape", &args, 1..=1)?;
    javascript_escape(&args[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw() {
        assert_eq!(raw(&Value::str("<b>")).unwrap().into_string(), "<b>");
        assert_eq!(raw(&Value::Nil).unwrap().into_string(), "");
        assert_eq!(
            raw(&Value::from(vec![Value::str("<i>"), Value::Int(b'!' as i64)]))
                .unwrap()
                .into_string(),
            "<i>!",
        );
        assert!(raw(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(&Value::str("<a href='x'>")).unwrap().into_string(),
            "&lt;a href=&#39;x&#39;&gt;",
        );
        let safe = Value::Safe(Safe::raw("<br>"));
        assert_eq!(html_escape(&safe).unwrap().into_string(), "<br>");
    }

    #[test]
    fn test_safe_to_string() {
        let safe = Value::Safe(Safe::escape("<"));
        assert_eq!(safe_to_string(&safe).unwrap(), "&lt;");
        let tuple = Value::Tuple(vec![Value::atom("safe"), Value::str("<b>")]);
        assert_eq!(safe_to_string(&tuple).unwrap(), "<b>");
        assert!(safe_to_string(&Value::str("x")).is_err());
    }

    #[test]
    fn test_escape_javascript() {
        assert_eq!(
            escape_javascript("'a'\r\n\"b\"\\</script>\u{2028}`"),
            "\\'a\\'\\n\\\"b\\\"\\\\<\\/script>\\u2028\\`",
        );
        assert_eq!(escape_javascript("a\rb\nc"), "a\\nb\\nc");
        assert_eq!(escape_javascript("plain"), "plain");
    }

    #[test]
    fn test_javascript_escape_keeps_safety() {
        assert_eq!(
            javascript_escape(&Value::str("'")).unwrap(),
            Value::str("\\'")
        );
        assert!(matches!(
            javascript_escape(&Value::Safe(Safe::raw("<p>'</p>"))).unwrap(),
            Value::Safe(safe) if safe.to_string() == "<p>\\'<\\/p>"
        ));
        assert!(javascript_escape(&Value::Int(1)).is_err());
    }
}
