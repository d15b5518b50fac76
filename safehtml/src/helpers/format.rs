use safehtml_escape::Safe;

use super::tag::{content_tag, tag};
use super::{arity, string_arg, Options};
use crate::environment::{Environment, State};
use crate::value::Value;
use crate::Result;

pub(super) fn register(env: &mut Environment) {
    env.add_function("text_to_html", text_to_html_fn);
}

/// Turns plain text into paragraphs.
///
/// Blank-line separated blocks become `<p>` elements, each followed by a
/// newline, and single line breaks inside a block become `<br>`. Options:
///
/// * `wrapper_tag:` the element to wrap paragraphs in (`:p`)
/// * `attributes:` attributes for the wrapper (`[]`)
/// * `insert_brs:` whether to insert `<br>` (`true`); lines are joined
///   with a space otherwise
/// * `escape:` whether to escape the text (`true`)
pub fn text_to_html(text: &str, opts: &Value) -> Result<Safe> {
    let mut opts = Options::parse("text_to_html", opts)?;
    let wrapper = match opts.take("wrapper_tag") {
        Some(wrapper) => string_arg("text_to_html", &wrapper)?,
        None => "p".to_owned(),
    };
    let attrs = opts.take("attributes").unwrap_or_default();
    let insert_brs = opts.take("insert_brs").map_or(true, |v| v.is_truthy());
    let escape = opts.take("escape").map_or(true, |v| v.is_truthy());

    let text = text.replace("\r\n", "\n");
    let mut out = Safe::new();
    for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
        let mut content = Safe::new();
        for (i, line) in paragraph.split('\n').filter(|l| !l.is_empty()).enumerate() {
            if i > 0 {
                match insert_brs {
                    true => {
                        content.push(tag("br", &Value::Nil)?);
                        content.push_static("\n");
                    }
                    false => content.push_static(" "),
                }
            }
            match escape {
                true => content.push_escaped(line),
                false => content.push_raw(line.to_owned()),
            }
        }
        out.push(content_tag(&wrapper, Value::Safe(content), &attrs)?);
        out.push_static("\n");
    }
    Ok(out)
}

fn text_to_html_fn(_: &State<'_>, args: Vec<Value>) -> Result<Value> {
    arity("text_to_html", &args, 1..=2)?;
    let text = string_arg("text_to_html", &args[0])?;
    text_to_html(&text, args.get(1).unwrap_or(&Value::Nil)).map(Value::Safe)
}
