use crate::Result;

/// Supplies CSRF tokens to `link`, `button`, `form_tag` and the other
/// helpers that embed one.
///
/// `action` is the destination the token will be submitted to, when the
/// helper knows it, so that sources can hand out per-host tokens.
pub trait CsrfTokenSource {
    fn token(&self, action: Option<&str>) -> Result<String>;
}

impl<F> CsrfTokenSource for F
where
    F: Fn(Option<&str>) -> Result<String>,
{
    fn token(&self, action: Option<&str>) -> Result<String> {
        self(action)
    }
}

/// The same token for every action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticToken(pub String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CsrfTokenSource for StaticToken {
    fn token(&self, _: Option<&str>) -> Result<String> {
        Ok(self.0.clone())
    }
}
