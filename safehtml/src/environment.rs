use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use safehtml_escape::Safe;
use safehtml_parser::Ast;

use crate::assigns::Assigns;
use crate::config::Config;
use crate::csrf::CsrfTokenSource;
use crate::generator::Generator;
use crate::helpers;
use crate::program::Program;
use crate::value::Value;
use crate::{Error, Result};

/// A function callable from templates, as `name(args)` or with a `do`
/// block, in which case the rendered block arrives as the `do:` option
/// of a trailing keyword list.
pub trait Function: Send + Sync {
    fn call(&self, state: &State<'_>, args: Vec<Value>) -> Result<Value>;
}

impl<F> Function for F
where
    F: Fn(&State<'_>, Vec<Value>) -> Result<Value> + Send + Sync,
{
    fn call(&self, state: &State<'_>, args: Vec<Value>) -> Result<Value> {
        self(state, args)
    }
}

pub(crate) type Functions = HashMap<String, Arc<dyn Function>>;

/// Compiles templates against a set of functions and a [`Config`].
///
/// A new environment knows all of the built-in [`helpers`]. Functions are
/// resolved when a template is compiled, so adding one later does not
/// affect templates that were already compiled.
#[derive(Clone)]
pub struct Environment {
    config: Arc<Config>,
    functions: Functions,
}

impl Environment {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut env = Self {
            config: Arc::new(config),
            functions: HashMap::new(),
        };
        helpers::register(&mut env);
        env
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers `func` under `name`, replacing any previous function of
    /// that name, built-ins included.
    pub fn add_function<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Function + 'static,
    {
        self.functions.insert(name.into(), Arc::new(func));
        self
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Compiles an anonymous template. Parse errors only carry a position.
    pub fn compile(&self, source: &str) -> Result<Template> {
        self.compile_inner(None, source)
    }

    pub fn compile_named(&self, name: &str, source: &str) -> Result<Template> {
        self.compile_inner(Some(name), source)
    }

    /// Reads and compiles a template file, named after its path.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Template> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|err| {
            tracing::debug!(path = %path.display(), %err, "unable to read template");
            Error::Io(err)
        })?;
        self.compile_inner(Some(&path.display().to_string()), &source)
    }

    fn compile_inner(&self, name: Option<&str>, source: &str) -> Result<Template> {
        let ast = Ast::from_str(source, name, &self.config.syntax())?;
        let program = Generator::new(&self.functions).build(ast.nodes())?;
        tracing::debug!(
            template = name.unwrap_or("<anonymous>"),
            temps = program.temps,
            locals = program.locals,
            "compiled template"
        );

        Ok(Template {
            inner: Arc::new(TemplateInner {
                name: name.map(str::to_owned),
                program,
                config: Arc::clone(&self.config),
            }),
        })
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("functions", &names)
            .finish()
    }
}

/// A compiled template. Cheap to clone and safe to render from many
/// threads at once; every render gets its own storage.
#[derive(Clone)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

struct TemplateInner {
    name: Option<String>,
    program: Program,
    config: Arc<Config>,
}

impl Template {
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Renders without a CSRF token source; helpers that need a token fail
    /// with [`Error::CsrfUnavailable`].
    pub fn render(&self, assigns: &Assigns) -> Result<Safe> {
        self.render_state(&State::new(assigns, &self.inner.config))
    }

    pub fn render_with(&self, assigns: &Assigns, csrf: &dyn CsrfTokenSource) -> Result<Safe> {
        self.render_state(&State::new(assigns, &self.inner.config).with_csrf(csrf))
    }

    pub fn render_to_string(&self, assigns: &Assigns) -> Result<String> {
        Ok(self.render(assigns)?.into_string())
    }

    /// Renders and writes the bytes to `writer`. Nothing is written if the
    /// render fails.
    pub fn render_into<W: io::Write>(
        &self,
        assigns: &Assigns,
        writer: &mut W,
    ) -> Result<()> {
        let safe = self.render(assigns)?;
        Ok(safe.write_to(writer)?)
    }

    pub fn render_state(&self, state: &State<'_>) -> Result<Safe> {
        let template = self.name().unwrap_or("<anonymous>");
        tracing::trace!(template, "rendering");
        self.inner.program.render(state).map_err(|err| {
            tracing::debug!(template, %err, "render failed");
            err
        })
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

/// What a render can see besides its expressions: the assigns, the
/// configuration and, optionally, a CSRF token source.
#[derive(Clone, Copy)]
pub struct State<'a> {
    assigns: &'a Assigns,
    config: &'a Config,
    csrf: Option<&'a dyn CsrfTokenSource>,
}

impl<'a> State<'a> {
    pub fn new(assigns: &'a Assigns, config: &'a Config) -> Self {
        Self {
            assigns,
            config,
            csrf: None,
        }
    }

    pub fn with_csrf(mut self, csrf: &'a dyn CsrfTokenSource) -> Self {
        self.csrf = Some(csrf);
        self
    }

    pub fn assigns(&self) -> &'a Assigns {
        self.assigns
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn csrf_token(&self, action: Option<&str>) -> Result<String> {
        match self.csrf {
            Some(source) => source.token(action),
            None => Err(Error::CsrfUnavailable),
        }
    }
}

impl fmt::Debug for State<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("assigns", self.assigns)
            .field("config", self.config)
            .field("csrf", &self.csrf.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrf::StaticToken;

    fn render(src: &str, assigns: &Assigns) -> Result<String> {
        Environment::new().compile(src)?.render_to_string(assigns)
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Template>();
        assert_send_sync::<Environment>();
    }

    #[test]
    fn test_render_assigns() {
        let assigns = crate::assigns! { name => "<Ann>", n => 2 };
        assert_eq!(
            render("Hi <%= @name %> x<%= @n * 2 %>", &assigns).unwrap(),
            "Hi &lt;Ann&gt; x4",
        );
    }

    #[test]
    fn test_blocks() {
        let assigns = crate::assigns! {
            items => vec![Value::Tuple(vec![Value::atom("ok"), 1.into()]), Value::atom("error")],
            flag => false,
        };
        assert_eq!(
            render(
                "<%= for {:ok, n} <- @items do %>[<%= n %>]<% end %>\
                 <%= unless @flag do %>off<% end %>\
                 <%= case @flag do %><% true -> %>t<% _ -> %>f<% end %>",
                &assigns,
            )
            .unwrap(),
            "[1]offf",
        );
    }

    #[test]
    fn test_bindings() {
        let assigns = crate::assigns! { pair => Value::Tuple(vec![1.into(), 2.into()]) };
        assert_eq!(
            render("<% {a, b} = @pair %><%= a + b %>", &assigns).unwrap(),
            "3"
        );
        assert_eq!(
            render("<% {a, a, a} = @pair %>", &assigns)
                .unwrap_err()
                .to_string(),
            "no match of right hand side value: {1, 2}",
        );
    }

    #[test]
    fn test_custom_function() {
        let mut env = Environment::new();
        env.add_function("shout", |_: &State<'_>, args: Vec<Value>| {
            let text = args.first().and_then(Value::as_str).unwrap_or_default();
            Ok(Value::str(text.to_uppercase()))
        });
        let tmpl = env.compile("<%= shout(\"a&b\") %>").unwrap();
        assert_eq!(tmpl.render_to_string(&Assigns::new()).unwrap(), "A&amp;B");
    }

    #[test]
    fn test_functions_bind_at_compile_time() {
        let mut env = Environment::new();
        let before = env.compile("<%= later() %>");
        env.add_function("later", |_: &State<'_>, _: Vec<Value>| Ok(Value::Int(1)));
        assert!(before.is_err());
        assert!(env.compile("<%= later() %>").is_ok());
    }

    #[test]
    fn test_csrf_source() {
        let config = Config::default();
        let assigns = Assigns::new();
        let state = State::new(&assigns, &config);
        assert!(matches!(state.csrf_token(None), Err(Error::CsrfUnavailable)));

        let token = StaticToken::new("t0k");
        let tmpl = Environment::new().compile("<%= csrf_token_value(\"/\") %>").unwrap();
        assert_eq!(
            tmpl.render_with(&assigns, &token).unwrap().into_string(),
            "t0k"
        );
        assert!(matches!(tmpl.render(&assigns), Err(Error::CsrfUnavailable)));
    }

    #[test]
    fn test_render_into() {
        let tmpl = Environment::new()
            .compile_named("hello.html", "a<%= @b %>")
            .unwrap();
        assert_eq!(tmpl.name(), Some("hello.html"));

        let mut out = Vec::new();
        tmpl.render_into(&crate::assigns! { b => 1 }, &mut out).unwrap();
        assert_eq!(out, b"a1");

        let mut out = Vec::new();
        assert!(tmpl.render_into(&Assigns::new(), &mut out).is_err());
        assert!(out.is_empty());
    }
}
