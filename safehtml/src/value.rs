use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use safehtml_escape::Safe;

use crate::safe::ToSafe;
use crate::{Error, Result};

/// Application types that can be handed to a template.
///
/// Implementors decide how they render through [`ToSafe`]; the remaining
/// methods have defaults for types that expose no fields.
pub trait Object: ToSafe + fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Looks up `name` for `value.name` expressions.
    fn get_field(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// A dynamic value flowing through a template.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Atom(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Safe(Safe),
    Date(NaiveDate),
    Time(NaiveTime),
    NaiveDateTime(NaiveDateTime),
    DateTime(DateTime<FixedOffset>),
    Object(Arc<dyn Object>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    pub fn atom(s: impl Into<String>) -> Self {
        Self::Atom(s.into())
    }

    pub fn object(object: impl Object + 'static) -> Self {
        Self::Object(Arc::new(object))
    }

    /// Builds a keyword list, a list of `{:key, value}` tuples.
    pub fn keywords<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::List(
            pairs
                .into_iter()
                .map(|(k, v)| Self::Tuple(vec![Self::Atom(k.into()), v.into()]))
                .collect(),
        )
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Atom(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Atom(_) => "atom",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Map(_) => "map",
            Self::Safe(_) => "safe",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::NaiveDateTime(_) => "naive datetime",
            Self::DateTime(_) => "datetime",
            Self::Object(obj) => obj.type_name(),
        }
    }

    /// Returns the pairs of a keyword list, or `None` if any element is not
    /// a `{:atom, value}` tuple. The empty list is an empty keyword list.
    pub fn as_keywords(&self) -> Option<Vec<(&str, &Value)>> {
        let items = match self {
            Self::List(items) => items,
            _ => return None,
        };
        items.iter().map(Self::as_keyword_pair).collect()
    }

    fn as_keyword_pair(&self) -> Option<(&str, &Value)> {
        match self {
            Self::Tuple(pair) => match pair.as_slice() {
                [Self::Atom(key), value] => Some((key.as_str(), value)),
                _ => None,
            },
            _ => None,
        }
    }

    /// `value.name`: map keys, keyword list keys and object fields.
    pub fn field(&self, name: &str) -> Result<Value> {
        let found = match self {
            Self::Map(map) => map.get(name).cloned(),
            Self::List(_) => match self.as_keywords() {
                Some(pairs) => pairs
                    .into_iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v.clone()),
                None => return Err(self.bad_operand(".")),
            },
            Self::Object(obj) => obj.get_field(name),
            _ => return Err(self.bad_operand(".")),
        };
        found.ok_or_else(|| Error::UndefinedField {
            field: name.to_owned(),
            value: self.to_string(),
        })
    }

    /// `value[key]`: a missing key yields `nil`, as does indexing `nil`.
    pub fn index(&self, key: &Value) -> Result<Value> {
        let found = match (self, key) {
            (Self::Nil, _) => None,
            (Self::Map(map), Self::Str(k) | Self::Atom(k)) => map.get(k.as_str()).cloned(),
            (Self::List(items), Self::Int(i)) => position(*i, items.len()).map(|i| items[i].clone()),
            (Self::Tuple(items), Self::Int(i)) => {
                position(*i, items.len()).map(|i| items[i].clone())
            }
            (Self::List(_), Self::Atom(k)) => match self.as_keywords() {
                Some(pairs) => pairs
                    .into_iter()
                    .find(|(name, _)| name == k)
                    .map(|(_, v)| v.clone()),
                None => return Err(self.bad_operand("[]")),
            },
            (Self::Object(obj), Self::Str(k) | Self::Atom(k)) => obj.get_field(k),
            _ => return Err(self.bad_operand("[]")),
        };
        Ok(found.unwrap_or_default())
    }

    pub(crate) fn bad_operand(&self, op: &'static str) -> Error {
        Error::BadOperand {
            op,
            value: self.to_string(),
        }
    }
}

/// Resolves a possibly negative index against `len`.
fn position(index: i64, len: usize) -> Option<usize> {
    let index = if index < 0 {
        len.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)?
    } else {
        usize::try_from(index).ok()?
    };
    (index < len).then_some(index)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Atom(a), Self::Atom(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Safe(a), Self::Safe(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::NaiveDateTime(a), Self::NaiveDateTime(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Renders values the way they would be written in a template, which is
/// what error messages show.
impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => f.write_str(&format_float(*v)),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Atom(s) => write!(f, ":{s}"),
            Self::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Self::Tuple(items) => {
                f.write_str("{")?;
                write_seq(f, items)?;
                f.write_str("}")
            }
            Self::Map(map) => {
                f.write_str("%{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?} => {v}")?;
                }
                f.write_str("}")
            }
            Self::Safe(safe) => write!(f, "{{:safe, {:?}}}", safe.to_string()),
            Self::Date(d) => write!(f, "~D[{d}]"),
            Self::Time(t) => write!(f, "~T[{t}]"),
            Self::NaiveDateTime(dt) => write!(f, "~N[{}]", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::DateTime(dt) => write!(f, "#DateTime<{}>", dt.to_rfc3339()),
            Self::Object(obj) => write!(f, "#{}<{obj:?}>", obj.type_name()),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Integral floats keep a trailing `.0`.
pub(crate) fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v:?}")
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Int(n.into())
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Safe> for Value {
    fn from(safe: Safe) -> Self {
        Self::Safe(safe)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Self::Time(t)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::NaiveDateTime(dt)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self::DateTime(dt)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Nil, Into::into)
    }
}

#[cfg(feature = "serde-json")]
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Self::Nil,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Self::Str(s),
            Json::Array(items) => Self::List(items.into_iter().map(Into::into).collect()),
            Json::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}
