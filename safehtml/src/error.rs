use std::io;

use safehtml_parser::ParseError;

pub type Result<I, E = Error> = ::std::result::Result<I, E>;

/// safehtml error type
///
/// Every failure aborts the render that raised it; no partial output is
/// ever produced.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// an `@name` reference had no matching key in the assigns
    #[error(
        "assign @{key} not available in template\n\nAvailable assigns: [{}]",
        atom_list(.available)
    )]
    MissingAssign { key: String, available: Vec<String> },

    /// a value has no conversion to safe HTML
    #[error("cannot convert {value} to safe HTML: no conversion is defined for {type_name}")]
    Unescapable {
        value: String,
        type_name: &'static str,
    },

    /// a byte list held something other than bytes, strings, lists or safe content
    #[error("{reason}, got: {element}")]
    MalformedByteList {
        element: String,
        reason: &'static str,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// the template parsed but refers to something that cannot exist
    #[error("{0}")]
    Compile(String),

    #[error("key :{field} not found in: {value}")]
    UndefinedField { field: String, value: String },

    #[error("bad argument in `{op}`: {value}")]
    BadOperand { op: &'static str, value: String },

    #[error("no match of right hand side value: {0}")]
    NoMatch(String),

    #[error("no case clause matching: {0}")]
    NoCaseClause(String),

    #[error("{0} is not enumerable")]
    NotEnumerable(String),

    /// a template function rejected its arguments
    #[error("{name}: {message}")]
    Function { name: String, message: String },

    #[error("no CSRF token source was given to this render")]
    CsrfUnavailable,

    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn function(name: &str, message: impl Into<String>) -> Self {
        Self::Function {
            name: name.to_owned(),
            message: message.into(),
        }
    }
}

fn atom_list(keys: &[String]) -> String {
    keys.iter()
        .map(|k| format!(":{k}"))
        .collect::<Vec<_>>()
        .join(", ")
}
