//! shimmystache: a small mustache-like template engine.
//!
//! Templates are parsed once into a [`Template`] and rendered any number of
//! times against a dynamically shaped [`Value`] context. The language:
//!
//! - `{{ name }}` / `{{& name }}`: escaped / raw interpolation.
//! - `{{# key }}...{{/ key }}`: block. Skipped when the value is falsy,
//!   repeated per element for sequences, scoped to the value for maps and
//!   records. `{{^ key }}` inverts it.
//! - `{{< name }}...{{/ name }}` defines a named body, `{{@ name key? }}`
//!   executes it, optionally scoped to `key`. `{{% name }}...{{/ name }}`
//!   renders its own body unless a definition with the same name exists.
//! - `{{> partial }}` includes another template at parse time.
//! - `{{: name key }}` binds a local name.
//! - `{{= <% %> =}}` switches delimiters, `{{! ... }}` is a comment.
//! - `key | filter arg ...` pipes a value through registered filters.
//! - `{{-` and `-}}` strip whitespace next to the tag.
//!
//! Inside sequence blocks, `loop`, `loop0`, `revloop`, `revloop0` and
//! `length` describe the current position; `ctx` always names the current
//! value.
//!
//! ```
//! use shimmystache::{render, Value};
//!
//! let ctx = Value::from(serde_json::json!({ "names": ["ada", "grace"] }));
//! let out = render("{{#names}}{{loop}}. {{ctx | title}}\n{{/names}}", &ctx).unwrap();
//! assert_eq!(out, "1. Ada\n2. Grace\n");
//! ```

pub mod ast;
pub mod builtins;
pub mod config;
pub mod debug;
pub mod error;
pub mod eval;
pub mod filters;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod value;

pub use ast::{Argument, ArgumentKind, Filter, Key, NamedNodes, Node, Root};
pub use config::Config;
pub use error::{Error, FilterError, LoadError, ParseError, RenderError};
pub use eval::{Evaluator, LoopPosition, State};
pub use filters::{FilterRegistry, Function, Param, Signature};
pub use lexer::{Position, Token, TokenKind, Tokenizer};
pub use loader::{FileLoader, InMemoryLoader, Loader, NoLoader};
pub use parser::Parser;
pub use value::{Record, Value};

use std::fmt;

use tracing::debug;

/// A parsed template, ready to render.
///
/// Immutable once parsed; a single template can be rendered from several
/// threads at once, each render owning its scope state.
#[derive(Debug, Clone)]
pub struct Template {
    root: Root,
    config: Config,
}

impl Template {
    /// Parses `source` with the default configuration. Partials are
    /// refused.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        Self::parse_with(source, &NoLoader, Config::default())
    }

    /// Parses `source`, resolving partials through `loader`.
    pub fn parse_with(
        source: &str,
        loader: &dyn Loader,
        config: Config,
    ) -> Result<Self, ParseError> {
        let root = Parser::with_options(source, "<template>", loader, &config)?.parse()?;
        Ok(Self { root, config })
    }

    /// Adds the definitions of `other` that this template does not have
    /// yet, so that its sections and execs can use them.
    pub fn merge(&mut self, other: &Template) {
        debug!(definitions = other.root.named.len(), "merging template definitions");
        self.root.named.merge(other.root.named.clone());
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Structural dump of the parsed tree.
    pub fn dump(&self) -> String {
        debug::dump(&self.root)
    }

    pub fn render(&self, ctx: &Value, filters: &FilterRegistry) -> Result<String, RenderError> {
        let mut out = String::new();
        self.render_to(&mut out, ctx, filters)?;
        Ok(out)
    }

    pub fn render_to(
        &self,
        out: &mut dyn fmt::Write,
        ctx: &Value,
        filters: &FilterRegistry,
    ) -> Result<(), RenderError> {
        debug!(
            nodes = self.root.nodes.len(),
            definitions = self.root.named.len(),
            "rendering template"
        );
        let state = State::new(ctx, filters);
        Evaluator::new(&self.root.named, &self.config, state).render(&self.root.nodes, out)
    }
}

/// Parses `source` and renders it against `ctx` with the built-in filters.
pub fn render(source: &str, ctx: &Value) -> Result<String, Error> {
    let template = Template::parse(source)?;
    Ok(template.render(ctx, &FilterRegistry::with_builtins())?)
}
