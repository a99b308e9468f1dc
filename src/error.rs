//! Error types for parsing, rendering, filters and partial loading.
//!
//! Parse errors carry the position and the offending source line and
//! render as miette diagnostics. Render errors name the identifier,
//! definition or filter that failed.

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("{line}:{column}: unexpected token {found} in `{context}`")]
    #[diagnostic(code(shimmystache::parse::unexpected))]
    Unexpected {
        /// Display form of the offending token.
        found: String,
        line: usize,
        column: usize,
        /// The trimmed source line holding the token.
        context: String,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("invalid delimiter `{delimiter}`")]
    #[diagnostic(
        code(shimmystache::parse::delimiter),
        help("delimiters must be non-empty and made of punctuation only")
    )]
    InvalidDelimiter { delimiter: String },

    #[error("partial `{name}` could not be loaded")]
    #[diagnostic(code(shimmystache::parse::load))]
    Load {
        name: String,
        #[source]
        source: LoadError,
    },

    #[error("partial `{name}` is invalid")]
    #[diagnostic(code(shimmystache::parse::partial))]
    Partial {
        name: String,
        #[source]
        source: Box<ParseError>,
    },

    #[error("partial `{name}` exceeds the nesting limit of {limit}")]
    #[diagnostic(code(shimmystache::parse::depth))]
    PartialDepth { name: String, limit: usize },
}

#[derive(Debug, Error, Diagnostic)]
pub enum RenderError {
    #[error("`{name}` is not defined")]
    #[diagnostic(code(shimmystache::render::undefined))]
    Undefined { name: String },

    #[error("no definition named `{name}`")]
    #[diagnostic(
        code(shimmystache::render::unknown_node),
        help("declare it with a define tag in the same template or in a partial")
    )]
    UnknownNode { name: String },

    #[error("filter `{name}` failed")]
    #[diagnostic(code(shimmystache::render::filter))]
    Filter {
        name: String,
        #[source]
        source: FilterError,
    },

    #[error("`{name}` is reserved and can not be assigned")]
    #[diagnostic(code(shimmystache::render::reserved))]
    Reserved { name: String },

    #[error("invalid literal `{literal}`")]
    #[diagnostic(code(shimmystache::render::literal))]
    InvalidLiteral { literal: String },

    #[error("`{name}` exceeds the nesting limit of {limit}")]
    #[diagnostic(code(shimmystache::render::depth))]
    RecursionLimit { name: String, limit: usize },

    #[error("failed to write output")]
    #[diagnostic(code(shimmystache::render::write))]
    Write(#[from] std::fmt::Error),
}

/// Error reported by a filter function itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FilterError {
    message: String,
}

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("template `{0}` not found")]
    NotFound(String),

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any error produced by [`crate::render`].
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Render(#[from] RenderError),
}
