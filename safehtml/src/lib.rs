//! safehtml compiles EEx-style templates into programs that render
//! HTML-safe output.
//!
//! # Example template
//!
//! ```text
//! <h1><%= @title %></h1>
//! <ul>
//!   <%= for {name, url} <- @links do %>
//!     <li><%= link(name, to: url) %></li>
//!   <% end %>
//! </ul>
//! <%= form_tag("/search", method: :get) do %>
//!   <input name="q">
//! <% end %>
//! ```
//!
//! # Feature highlights
//!
//! * Every printed value is escaped unless it is already [`Safe`]
//! * Safe content is never escaped twice, however it is nested
//! * Templates are compiled once and rendered from any number of threads
//! * Literal text and literal expressions are merged into static chunks
//!   when the template is compiled
//! * Expressions run in source order, so side effects of helpers happen
//!   in the order they are written
//! * A missing assign is an error naming every assign that was available
//!
//! # Syntax
//!
//! A template is text with tags. `<%= expr %>` prints the escaped result
//! of `expr`, `<% expr %>` evaluates it for its effects and `<%# ... %>` is
//! a comment. `<%%` writes a literal `<%`. The delimiters can be changed in
//! the [`Config`].
//!
//! Assigns, the values passed to a render, are referenced as `@name`.
//! Plain names are locals, bound by `pattern = expr`, by `for` and by
//! `case` clauses. They are visible until the end of the enclosing block.
//!
//! ## Expressions
//!
//! Literals are `nil`, `true`, `false`, numbers (`1_000`, `2.5`), strings
//! (`"a\n"`), atoms (`:ok`), lists (`[1, 2]`) and tuples (`{:ok, 1}`).
//! Fields are read with `.name` and elements with `[key]`. Operators,
//! from loosest to tightest:
//!
//! * `or`, `||`
//! * `and`, `&&`
//! * `==`, `!=`
//! * `<`, `>`, `<=`, `>=`
//! * `<>` (string concatenation), `..` (integer range)
//! * `+`, `-`
//! * `*`, `/`
//! * `!`, `not`, unary `-`
//!
//! Functions are called as `name(args)`. Keyword arguments such as
//! `link("x", to: "/")` are collected into a trailing keyword list.
//!
//! ## Blocks
//!
//! ```text
//! <%= if @admin do %>...<% else %>...<% end %>
//! <%= unless @items == [] do %>...<% end %>
//! <%= for {:ok, item} <- @results do %>...<% end %>
//! <%= case @status do %>
//!   <% :active -> %>on
//!   <% _ -> %>off
//! <% end %>
//! <%= content_tag(:div, class: "box") do %>...<% end %>
//! ```
//!
//! `for` skips elements that do not match its pattern. A function called
//! with a `do` block receives the rendered block as its `do:` option.
//!
//! # Rendering
//!
//! ```
//! use safehtml::{assigns, Environment};
//!
//! let env = Environment::new();
//! let template = env.compile("Hello <%= @name %>!").unwrap();
//! let html = template.render(&assigns! { name => "<world>" }).unwrap();
//! assert_eq!(html.into_string(), "Hello &lt;world&gt;!");
//! ```

#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths)]
#![deny(unreachable_pub)]

mod assigns;
mod config;
mod csrf;
mod environment;
mod error;
pub mod escaping;
mod generator;
pub mod helpers;
mod program;
mod safe;
mod unescape;
mod value;

pub use safehtml_escape::{Chunk, Safe};

pub use crate::assigns::Assigns;
pub use crate::config::{Config, CONFIG_FILE_NAME};
pub use crate::csrf::{CsrfTokenSource, StaticToken};
pub use crate::environment::{Environment, Function, State, Template};
pub use crate::error::{Error, Result};
pub use crate::safe::ToSafe;
pub use crate::value::{Object, Value};
