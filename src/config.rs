use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::lexer::{DEFAULT_CLOSE, DEFAULT_OPEN};

/// Parse and render settings.
///
/// Deserializable so hosts can keep it next to their own configuration;
/// missing fields take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Delimiter opening a tag at the start of every template.
    pub open_delimiter: String,
    /// Delimiter closing a tag at the start of every template.
    pub close_delimiter: String,
    /// HTML-escape the output of `{{ var }}` tags. `{{& var }}` is never
    /// escaped.
    pub escape_html: bool,
    /// How deep partials may include other partials.
    pub max_partial_depth: usize,
    /// How deep definitions and section overrides may call each other.
    pub max_exec_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            open_delimiter: DEFAULT_OPEN.to_string(),
            close_delimiter: DEFAULT_CLOSE.to_string(),
            escape_html: true,
            max_partial_depth: 16,
            max_exec_depth: 64,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delimiters(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.open_delimiter = open.into();
        self.close_delimiter = close.into();
        self
    }

    pub fn escape_html(mut self, escape: bool) -> Self {
        self.escape_html = escape;
        self
    }

    pub fn max_partial_depth(mut self, depth: usize) -> Self {
        self.max_partial_depth = depth;
        self
    }

    pub fn max_exec_depth(mut self, depth: usize) -> Self {
        self.max_exec_depth = depth;
        self
    }

    pub fn validate(&self) -> Result<(), ParseError> {
        for delimiter in [&self.open_delimiter, &self.close_delimiter] {
            if !is_valid_delimiter(delimiter) {
                return Err(ParseError::InvalidDelimiter {
                    delimiter: delimiter.clone(),
                });
            }
        }
        Ok(())
    }
}

fn is_valid_delimiter(delimiter: &str) -> bool {
    !delimiter.is_empty()
        && delimiter
            .chars()
            .all(|c| !c.is_alphanumeric() && !c.is_whitespace())
}
