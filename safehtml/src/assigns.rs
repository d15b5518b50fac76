use std::collections::BTreeMap;

use crate::value::Value;
use crate::{Error, Result};

/// The values a template is rendered with, referenced as `@name`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assigns {
    values: BTreeMap<String, Value>,
}

impl Assigns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an assign, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Like [`Assigns::get`], but a missing key is an error naming the key
    /// and every key that is present.
    pub fn fetch(&self, key: &str) -> Result<&Value> {
        self.values.get(key).ok_or_else(|| Error::MissingAssign {
            key: key.to_owned(),
            available: self.values.keys().cloned().collect(),
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Assigns {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, Value>> for Assigns {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}

/// Builds [`Assigns`] from `key => value` pairs.
///
/// ```
/// let assigns = safehtml::assigns! { title => "Home", count => 3 };
/// assert!(assigns.contains_key("title"));
/// ```
#[macro_export]
macro_rules! assigns {
    () => {
        $crate::Assigns::new()
    };
    ($($key:ident => $value:expr),+ $(,)?) => {
        $crate::Assigns::new()$(.with(stringify!($key), $value))+
    };
}
