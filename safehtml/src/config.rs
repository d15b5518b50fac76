use std::fs;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::Deserialize;

use safehtml_parser::Syntax;

use crate::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "safehtml.toml";

const DEFAULT_CSRF_PARAM: &str = "_csrf_token";
const DEFAULT_METHOD_PARAM: &str = "_method";

/// Settings shared by every template of an [`Environment`](crate::Environment).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    block_start: String,
    block_end: String,
    csrf_param: String,
    method_param: String,
}

impl Default for Config {
    fn default() -> Self {
        let syntax = Syntax::default();
        Self {
            block_start: syntax.block_start.to_owned(),
            block_end: syntax.block_end.to_owned(),
            csrf_param: DEFAULT_CSRF_PARAM.to_owned(),
            method_param: DEFAULT_METHOD_PARAM.to_owned(),
        }
    }
}

impl Config {
    /// Parses a configuration in the `safehtml.toml` format. An empty
    /// string yields the defaults.
    pub fn new(s: &str) -> Result<Self> {
        let raw = if s.trim().is_empty() {
            RawConfig::default()
        } else {
            RawConfig::from_toml_str(s)?
        };

        let mut config = Self::default();
        if let Some(general) = raw.general {
            if let Some(csrf_param) = general.csrf_param {
                config.csrf_param = param_name(csrf_param)?;
            }
            if let Some(method_param) = general.method_param {
                config.method_param = param_name(method_param)?;
            }
        }
        if let Some(syntax) = raw.syntax {
            let block_start = syntax.block_start.unwrap_or(&config.block_start).to_owned();
            let block_end = syntax.block_end.unwrap_or(&config.block_end).to_owned();
            config = config.with_syntax(block_start, block_end)?;
        }

        tracing::debug!(
            block_start = %config.block_start,
            block_end = %config.block_end,
            csrf_param = %config.csrf_param,
            method_param = %config.method_param,
            "loaded template configuration"
        );
        Ok(config)
    }

    /// Reads and parses a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|err| {
            tracing::debug!(path = %path.display(), %err, "unable to read configuration");
            Error::Io(err)
        })?;
        Self::new(&source)
    }

    /// Replaces the tag delimiters. Both must be at least two characters
    /// long and free of whitespace.
    pub fn with_syntax(
        mut self,
        block_start: impl Into<String>,
        block_end: impl Into<String>,
    ) -> Result<Self> {
        let (block_start, block_end) = (block_start.into(), block_end.into());
        for s in [&block_start, &block_end] {
            if s.chars().count() < 2 {
                return Err(Error::Config(format!(
                    "delimiters must be at least two characters long: {s:?}"
                )));
            } else if s.chars().any(char::is_whitespace) {
                return Err(Error::Config(format!(
                    "delimiters may not contain white spaces: {s:?}"
                )));
            }
        }
        if block_start == block_end {
            return Err(Error::Config(format!(
                "opening and closing delimiters must differ: {block_start:?}"
            )));
        }
        self.block_start = block_start;
        self.block_end = block_end;
        Ok(self)
    }

    /// Name of the form parameter carrying the CSRF token.
    pub fn with_csrf_param(mut self, name: impl Into<String>) -> Result<Self> {
        self.csrf_param = param_name(name.into())?;
        Ok(self)
    }

    /// Name of the form parameter carrying the overridden HTTP method.
    pub fn with_method_param(mut self, name: impl Into<String>) -> Result<Self> {
        self.method_param = param_name(name.into())?;
        Ok(self)
    }

    pub fn syntax(&self) -> Syntax<'_> {
        Syntax {
            block_start: &self.block_start,
            block_end: &self.block_end,
        }
    }

    pub fn csrf_param(&self) -> &str {
        &self.csrf_param
    }

    pub fn method_param(&self) -> &str {
        &self.method_param
    }
}

fn param_name(name: impl Into<String>) -> Result<String> {
    let name = name.into();
    if name.is_empty() {
        return Err(Error::Config("parameter names may not be empty".into()));
    }
    Ok(name)
}

#[cfg_attr(feature = "serde", derive(Deserialize))]
#[derive(Default)]
struct RawConfig<'a> {
    #[cfg_attr(feature = "serde", serde(borrow))]
    general: Option<General<'a>>,
    #[cfg_attr(feature = "serde", serde(borrow))]
    syntax: Option<RawSyntax<'a>>,
}

impl RawConfig<'_> {
    #[cfg(feature = "config")]
    fn from_toml_str(s: &str) -> Result<RawConfig<'_>> {
        basic_toml::from_str(s)
            .map_err(|e| Error::Config(format!("invalid TOML in {CONFIG_FILE_NAME}: {e}")))
    }

    #[cfg(not(feature = "config"))]
    fn from_toml_str(_: &str) -> Result<RawConfig<'_>> {
        Err(Error::Config("TOML support not available".into()))
    }
}

#[cfg_attr(feature = "serde", derive(Deserialize))]
struct General<'a> {
    csrf_param: Option<&'a str>,
    method_param: Option<&'a str>,
}

#[cfg_attr(feature = "serde", derive(Deserialize))]
struct RawSyntax<'a> {
    block_start: Option<&'a str>,
    block_end: Option<&'a str>,
}
