use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use safehtml_escape::{escape_byte, Safe};

use crate::value::{format_float, Value};
use crate::{Error, Result};

const MULTI_BYTE: &str =
    "lists only support byte-oriented data, not multi-byte characters; did you mean a string?";
const BAD_ELEMENT: &str = "lists may only contain bytes, strings, lists and safe content";

/// Conversion of a value into HTML that needs no further escaping.
///
/// Implement this for application types that templates print. There is
/// no fallback: a value without an implementation cannot be printed.
pub trait ToSafe {
    fn to_safe(&self) -> Result<Safe>;
}

impl<T: ToSafe + ?Sized> ToSafe for &T {
    fn to_safe(&self) -> Result<Safe> {
        (**self).to_safe()
    }
}

impl ToSafe for Safe {
    fn to_safe(&self) -> Result<Safe> {
        Ok(self.clone())
    }
}

impl ToSafe for str {
    fn to_safe(&self) -> Result<Safe> {
        Ok(Safe::escape(self))
    }
}

impl ToSafe for String {
    fn to_safe(&self) -> Result<Safe> {
        self.as_str().to_safe()
    }
}

impl ToSafe for Cow<'_, str> {
    fn to_safe(&self) -> Result<Safe> {
        self.as_ref().to_safe()
    }
}

impl ToSafe for char {
    fn to_safe(&self) -> Result<Safe> {
        self.encode_utf8(&mut [0; 4]).to_safe()
    }
}

impl ToSafe for bool {
    fn to_safe(&self) -> Result<Safe> {
        Ok(Safe::from_static(if *self { "true" } else { "false" }))
    }
}

macro_rules! impl_to_safe_display {
    ($($ty:ty),*) => {
        $(
            impl ToSafe for $ty {
                fn to_safe(&self) -> Result<Safe> {
                    Ok(Safe::raw(self.to_string()))
                }
            }
        )*
    };
}

impl_to_safe_display!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl ToSafe for f64 {
    fn to_safe(&self) -> Result<Safe> {
        Ok(Safe::raw(format_float(*self)))
    }
}

impl ToSafe for f32 {
    fn to_safe(&self) -> Result<Safe> {
        let text = if self.is_finite() && self.fract() == 0.0 && self.abs() < 1e7 {
            format!("{self:.1}")
        } else {
            format!("{self:?}")
        };
        Ok(Safe::raw(text))
    }
}

impl<T: ToSafe> ToSafe for Option<T> {
    fn to_safe(&self) -> Result<Safe> {
        match self {
            Some(v) => v.to_safe(),
            None => Ok(Safe::new()),
        }
    }
}

impl ToSafe for NaiveDate {
    fn to_safe(&self) -> Result<Safe> {
        Ok(Safe::escape(&self.format("%Y-%m-%d").to_string()))
    }
}

impl ToSafe for NaiveTime {
    fn to_safe(&self) -> Result<Safe> {
        Ok(Safe::escape(&self.format("%H:%M:%S%.f").to_string()))
    }
}

impl ToSafe for NaiveDateTime {
    fn to_safe(&self) -> Result<Safe> {
        Ok(Safe::escape(
            &self.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        ))
    }
}

impl<Tz: TimeZone> ToSafe for DateTime<Tz>
where
    Tz::Offset: std::fmt::Display,
{
    fn to_safe(&self) -> Result<Safe> {
        Ok(Safe::escape(&self.to_rfc3339()))
    }
}

impl ToSafe for Value {
    fn to_safe(&self) -> Result<Safe> {
        match self {
            Self::Nil => Ok(Safe::new()),
            Self::Bool(b) => b.to_safe(),
            Self::Int(i) => i.to_safe(),
            Self::Float(v) => v.to_safe(),
            Self::Str(s) | Self::Atom(s) => s.to_safe(),
            Self::Safe(safe) => Ok(safe.clone()),
            Self::List(items) => {
                let mut out = Safe::with_capacity(items.len());
                ByteList::new(&mut out, true).extend(items)?;
                Ok(out)
            }
            Self::Tuple(_) => match safe_payload(self) {
                Some(payload) => payload,
                None => Err(self.unescapable()),
            },
            Self::Map(_) => Err(self.unescapable()),
            Self::Date(d) => d.to_safe(),
            Self::Time(t) => t.to_safe(),
            Self::NaiveDateTime(dt) => dt.to_safe(),
            Self::DateTime(dt) => dt.to_safe(),
            Self::Object(obj) => obj.to_safe(),
        }
    }
}

impl Value {
    fn unescapable(&self) -> Error {
        Error::Unescapable {
            value: self.to_string(),
            type_name: self.type_name(),
        }
    }
}

/// Unwraps `{:safe, payload}`, returning `None` for any other shape.
fn safe_payload(value: &Value) -> Option<Result<Safe>> {
    let items = match value {
        Value::Tuple(items) => items,
        _ => return None,
    };
    match items.as_slice() {
        [Value::Atom(tag), payload] if tag == "safe" => match payload {
            Value::Str(s) => Some(Ok(Safe::raw(s.clone()))),
            Value::Safe(safe) => Some(Ok(safe.clone())),
            Value::List(items) => {
                let mut out = Safe::with_capacity(items.len());
                Some(ByteList::new(&mut out, false).extend(items).map(|()| out))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Writes a byte list into a `Safe`, buffering runs of bytes so that valid
/// UTF-8 ends up as text rather than one chunk per byte.
struct ByteList<'a> {
    out: &'a mut Safe,
    pending: Vec<u8>,
    escape: bool,
}

impl<'a> ByteList<'a> {
    fn new(out: &'a mut Safe, escape: bool) -> Self {
        Self {
            out,
            pending: Vec::new(),
            escape,
        }
    }

    fn extend(mut self, items: &[Value]) -> Result<()> {
        self.push_items(items)?;
        self.flush();
        Ok(())
    }

    fn push_items(&mut self, items: &[Value]) -> Result<()> {
        for item in items {
            match item {
                Value::Int(i) => {
                    let byte = u8::try_from(*i).map_err(|_| Error::MalformedByteList {
                        element: item.to_string(),
                        reason: MULTI_BYTE,
                    })?;
                    match escape_byte(byte) {
                        Some(entity) if self.escape => self.pending.extend(entity.bytes()),
                        _ => self.pending.push(byte),
                    }
                }
                Value::Str(s) if self.escape => {
                    self.flush();
                    self.out.push_escaped(s);
                }
                Value::Str(s) => self.pending.extend(s.bytes()),
                Value::List(nested) => self.push_items(nested)?,
                Value::Safe(safe) => {
                    self.flush();
                    self.out.push(safe.clone());
                }
                Value::Tuple(_) => match safe_payload(item) {
                    Some(payload) => {
                        let payload = payload?;
                        self.flush();
                        self.out.push(payload);
                    }
                    None => return Err(bad_element(item)),
                },
                _ => return Err(bad_element(item)),
            }
        }
        Ok(())
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        match String::from_utf8(std::mem::take(&mut self.pending)) {
            Ok(text) => self.out.push_raw(text),
            Err(err) => {
                for byte in err.into_bytes() {
                    self.out.push_byte(byte);
                }
            }
        }
    }
}

fn bad_element(element: &Value) -> Error {
    Error::MalformedByteList {
        element: element.to_string(),
        reason: BAD_ELEMENT,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;

    fn text(value: &Value) -> String {
        value.to_safe().unwrap().to_string()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(text(&Value::Nil), "");
        assert_eq!(text(&Value::Bool(true)), "true");
        assert_eq!(text(&Value::Int(-42)), "-42");
        assert_eq!(text(&Value::Float(1.0)), "1.0");
        assert_eq!(text(&Value::Float(2.5)), "2.5");
        assert_eq!(text(&Value::str("<a href='x'>")), "&lt;a href=&#39;x&#39;&gt;");
        assert_eq!(text(&Value::atom("a&b")), "a&amp;b");
        assert_eq!(1.5f32.to_safe().unwrap().to_string(), "1.5");
        assert_eq!('<'.to_safe().unwrap().to_string(), "&lt;");
        assert_eq!(None::<&str>.to_safe().unwrap().to_string(), "");
    }

    #[test]
    fn test_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let time = NaiveTime::from_hms_opt(10, 30, 0).unwrap();
        assert_eq!(text(&Value::Date(date)), "2024-05-01");
        assert_eq!(text(&Value::Time(time)), "10:30:00");
        assert_eq!(
            text(&Value::NaiveDateTime(date.and_time(time))),
            "2024-05-01T10:30:00",
        );
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let dt = offset.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        assert_eq!(text(&Value::DateTime(dt)), "2024-05-01T10:30:00+02:00");
    }

    #[test]
    fn test_byte_list() {
        let foo = Value::from(b"<foo>".to_vec());
        assert_eq!(text(&foo), "&lt;foo&gt;");

        let mixed = Value::List(vec![
            Value::Int(b'a'.into()),
            Value::str("<b>"),
            Value::List(vec![Value::Int(b'&'.into())]),
            Value::Safe(Safe::raw("<i>")),
        ]);
        assert_eq!(text(&mixed), "a&lt;b&gt;&amp;<i>");
    }

    #[test]
    fn test_byte_list_keeps_raw_bytes() {
        let safe = Value::from(vec![0xffu8, b'x']).to_safe().unwrap();
        assert_eq!(safe.to_bytes(), vec![0xff, b'x']);
    }

    #[test]
    fn test_malformed_byte_list() {
        let err = Value::from(vec![256]).to_safe().unwrap_err();
        assert!(matches!(err, Error::MalformedByteList { ref element, .. } if element == "256"));
        assert!(err.to_string().contains("did you mean a string?"));

        let err = Value::List(vec![Value::Float(1.5)]).to_safe().unwrap_err();
        assert!(matches!(err, Error::MalformedByteList { ref element, .. } if element == "1.5"));
    }

    #[test]
    fn test_safe_tuple() {
        let tuple = Value::Tuple(vec![Value::atom("safe"), Value::str("<b>")]);
        assert_eq!(text(&tuple), "<b>");
        let tuple = Value::Tuple(vec![
            Value::atom("safe"),
            Value::from(vec![60, 98, 62]),
        ]);
        assert_eq!(text(&tuple), "<b>");
    }

    #[test]
    fn test_unescapable() {
        let tuple = Value::Tuple(vec![Value::atom("foo"), Value::str("bar")]);
        match tuple.to_safe() {
            Err(Error::Unescapable { value, type_name }) => {
                assert_eq!(value, r#"{:foo, "bar"}"#);
                assert_eq!(type_name, "tuple");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Value::Map(Default::default()).to_safe().is_err());
    }

    #[test]
    fn test_idempotent() {
        let once = Value::str("<&>").to_safe().unwrap();
        let twice = Value::Safe(once.clone()).to_safe().unwrap();
        assert_eq!(once, twice);
    }
}
