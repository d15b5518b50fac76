use safehtml_escape::Safe;

use super::tag::tag;
use super::{arity, string_arg, take_do, Options};
use crate::environment::{Environment, State};
use crate::escaping::escape_value;
use crate::value::Value;
use crate::{Error, Result};

pub(super) fn register(env: &mut Environment) {
    env.add_function("form_tag", form_tag_fn)
        .add_function("csrf_meta_tag", csrf_meta_tag_fn)
        .add_function("csrf_token_value", csrf_token_value_fn);
}

/// An opening `<form>` tag for `action`.
///
/// Forms are always sent as `post` unless `method:` is `get`; any other
/// method travels in a hidden input named after
/// [`Config::method_param`](crate::Config::method_param). Non-`get` forms
/// also carry a hidden CSRF token input unless `csrf_token:` is `false`
/// (or a string, which is used as the token). `multipart: true` sets the
/// encoding type.
///
/// With a `do:` option the block is rendered inside the form and the
/// closing tag is added.
pub fn form_tag(state: &State<'_>, action: &str, opts: &Value) -> Result<Safe> {
    let mut opts = Options::parse("form_tag", opts)?;
    let body = opts.take("do");
    let csrf = opts.take("csrf_token");
    let multipart = opts.take("multipart").map_or(false, |m| m.is_truthy());
    let method = match opts.get("method") {
        None | Some(Value::Nil) => "post".to_owned(),
        Some(method) => string_arg("form_tag", method)?.to_ascii_lowercase(),
    };

    let config = state.config();
    let mut extra = Safe::new();
    if method != "get" {
        opts.take("method");
        opts.put_new("method", "post");
        if method != "post" {
            extra.push(hidden_input(config.method_param(), &method));
        }
        if let Some(token) = csrf_value(state, Some(action), csrf)? {
            extra.push(hidden_input(config.csrf_param(), &token));
        }
    }
    if multipart {
        opts.put_new("enctype", "multipart/form-data");
    }

    let mut attrs = Options::default();
    attrs.push("action", action);
    attrs.extend(opts);

    let mut out = tag("form", &attrs.into_value())?;
    out.push(extra);
    if let Some(body) = body {
        out.push(escape_value(body)?);
        out.push_static("</form>");
    }
    Ok(out)
}

/// `<meta charset="UTF-8" name="csrf-token" content="...">`, followed by
/// any extra attributes.
pub fn csrf_meta_tag(state: &State<'_>, attrs: &Value) -> Result<Safe> {
    let mut meta = Options::default();
    meta.push("charset", "UTF-8");
    meta.push("name", "csrf-token");
    meta.push("content", state.csrf_token(None)?);
    meta.extend(Options::parse("csrf_meta_tag", attrs)?);
    tag("meta", &meta.into_value())
}

/// The CSRF token for submitting to `to`.
pub fn csrf_token_value(state: &State<'_>, to: Option<&str>) -> Result<String> {
    state.csrf_token(to)
}

fn csrf_value(state: &State<'_>, action: Option<&str>, csrf: Option<Value>) -> Result<Option<String>> {
    match csrf {
        None | Some(Value::Bool(true)) => state.csrf_token(action).map(Some),
        Some(Value::Bool(false)) => Ok(None),
        Some(Value::Str(token)) => Ok(Some(token)),
        Some(other) => Err(Error::function(
            "form_tag",
            format!("expected :csrf_token to be a boolean or a string, got: {other}"),
        )),
    }
}

fn hidden_input(name: &str, value: &str) -> Safe {
    let mut out = Safe::from_static("<input name=\"");
    out.push_escaped(name);
    out.push_static("\" type=\"hidden\" value=\"");
    out.push_escaped(value);
    out.push_static("\">");
    out
}

fn form_tag_fn(state: &State<'_>, mut args: Vec<Value>) -> Result<Value> {
    let body = take_do(&mut args);
    arity("form_tag", &args, 1..=2)?;
    let action = string_arg("form_tag", &args[0])?;

    let mut opts = Options::parse("form_tag", args.get(1).unwrap_or(&Value::Nil))?;
    if let Some(body) = body {
        opts.push("do", body);
    }
    form_tag(state, &action, &opts.into_value()).map(Value::Safe)
}

fn csrf_meta_tag_fn(state: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("csrf_meta_tag", &args, 0..=1)?;
    csrf_meta_tag(state, args.first().unwrap_or(&Value::Nil)).map(Value::Safe)
}

fn csrf_token_value_fn(state: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("csrf_token_value", &args, 0..=1)?;
    let to = match args.first() {
        Some(to) => Some(string_arg("csrf_token_value", to)?),
        None => None,
    };
    csrf_token_value(state, to.as_deref()).map(Value::Str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Assigns, Config, StaticToken};

    fn render(opts: Value) -> Result<String> {
        let config = Config::default();
        let assigns = Assigns::new();
        let token = StaticToken::new("T0K");
        let state = State::new(&assigns, &config).with_csrf(&token);
        form_tag(&state, "/posts", &opts).map(Safe::into_string)
    }

    #[test]
    fn test_post_form() {
        assert_eq!(
            render(Value::Nil).unwrap(),
            r#"<form action="/posts" method="post"><input name="_csrf_token" type="hidden" value="T0K">"#,
        );
    }

    #[test]
    fn test_get_form() {
        assert_eq!(
            render(Value::keywords([("method", "get"), ("class", "search")])).unwrap(),
            r#"<form action="/posts" method="get" class="search">"#,
        );
    }

    #[test]
    fn test_method_override() {
        assert_eq!(
            render(Value::keywords([("method", Value::atom("put")), ("multipart", Value::Bool(true))])).unwrap(),
            "<form action=\"/posts\" enctype=\"multipart/form-data\" method=\"post\">\
             <input name=\"_method\" type=\"hidden\" value=\"put\">\
             <input name=\"_csrf_token\" type=\"hidden\" value=\"T0K\">",
        );
    }

    #[test]
    fn test_csrf_option() {
        assert_eq!(
            render(Value::keywords([("csrf_token", false)])).unwrap(),
            r#"<form action="/posts" method="post">"#,
        );
        assert_eq!(
            render(Value::keywords([("csrf_token", "given")])).unwrap(),
            r#"<form action="/posts" method="post"><input name="_csrf_token" type="hidden" value="given">"#,
        );
    }

    #[test]
    fn test_form_with_body() {
        let body = Value::Safe(Safe::raw("<input name=\"q\">"));
        assert_eq!(
            render(Value::keywords([("method", Value::atom("get")), ("do", body)])).unwrap(),
            r#"<form action="/posts" method="get"><input name="q"></form>"#,
        );
    }

    #[test]
    fn test_configured_params() {
        let config = Config::default()
            .with_csrf_param("authenticity_token")
            .unwrap()
            .with_method_param("_verb")
            .unwrap();
        let assigns = Assigns::new();
        let token = StaticToken::new("x");
        let state = State::new(&assigns, &config).with_csrf(&token);
        let out = form_tag(&state, "/", &Value::keywords([("method", "patch")])).unwrap();
        assert_eq!(
            out.into_string(),
            "<form action=\"/\" method=\"post\">\
             <input name=\"_verb\" type=\"hidden\" value=\"patch\">\
             <input name=\"authenticity_token\" type=\"hidden\" value=\"x\">",
        );
    }

    #[test]
    fn test_csrf_meta_tag() {
        let config = Config::default();
        let assigns = Assigns::new();
        let token = StaticToken::new("<t>");
        let state = State::new(&assigns, &config).with_csrf(&token);
        assert_eq!(
            csrf_meta_tag(&state, &Value::Nil).unwrap().into_string(),
            r#"<meta charset="UTF-8" name="csrf-token" content="&lt;t&gt;">"#,
        );
        assert_eq!(csrf_token_value(&state, Some("/")).unwrap(), "<t>");

        let state = State::new(&assigns, &config);
        assert!(matches!(
            csrf_meta_tag(&state, &Value::Nil),
            Err(Error::CsrfUnavailable)
        ));
    }
}
