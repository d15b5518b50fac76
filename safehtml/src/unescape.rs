use std::str::Chars;

/// Resolves the escape sequences of a string literal as written in a
/// template, e.g. `"a\"b\n"`.
pub(crate) fn unescape(src: &str) -> Result<String, String> {
    let mut chars = src.chars();
    let mut output = String::with_capacity(src.len());
    while let Some(c) = chars.next() {
        match c {
            '\\' => output.push(scan_escape(&mut chars)?),
            c => output.push(c),
        }
    }
    Ok(output)
}

fn scan_escape(chars: &mut Chars<'_>) -> Result<char, String> {
    let c = match chars.next() {
        Some(c) => c,
        None => return Err("expected a character after `\\`".into()),
    };
    Ok(match c {
        '"' => '"',
        '\'' => '\'',
        '\\' => '\\',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        'x' => {
            let mut value = 0;
            for _ in 0..2 {
                let digit = chars
                    .next()
                    .and_then(|c| c.to_digit(16))
                    .ok_or("`\\x` must be followed by two hex digits")?;
                value = value * 16 + digit;
            }
            if value > 0x7f {
                return Err(format!("`\\x{value:x}` is out of range, use `\\u{{{value:x}}}`"));
            }
            value as u8 as char
        }
        'u' => scan_unicode(chars)?,
        c => return Err(format!("unknown escape `\\{c}`")),
    })
}

fn scan_unicode(chars: &mut Chars<'_>) -> Result<char, String> {
    if chars.next() != Some('{') {
        return Err("expected `{` after `\\u`".into());
    }

    let mut value: u32 = 0;
    let mut digits = 0;
    loop {
        match chars.next() {
            None => return Err("unclosed unicode escape".into()),
            Some('}') if digits == 0 => return Err("empty unicode escape `\\u{}`".into()),
            Some('}') => break,
            Some(c) => {
                let digit = c
                    .to_digit(16)
                    .ok_or_else(|| format!("unexpected non hex character in `\\u`: `{c}`"))?;
                digits += 1;
                if digits > 6 {
                    return Err("overlong unicode escape (at most 6 hex digits)".into());
                }
                value = value * 16 + digit;
            }
        }
    }
    char::from_u32(value)
        .ok_or_else(|| format!("character code {value:x} is not a valid unicode character"))
}
