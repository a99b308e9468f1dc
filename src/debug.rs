//! Human-readable dumps of token streams and parsed trees.

use std::fmt::{self, Write};

use crate::ast::{Filter, Key, Node, Root};
use crate::lexer::{Token, Tokenizer};

/// Every token of `source` up to, not including, the end of input.
pub fn tokens(source: &str) -> Vec<Token> {
    Tokenizer::new(source).collect()
}

/// Indented structural dump of a parsed template.
pub fn dump(root: &Root) -> String {
    Dump(root).to_string()
}

struct Dump<'a>(&'a Root);

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "template [")?;
        write_nodes(f, &self.0.nodes, 2)?;
        writeln!(f, "]")
    }
}

fn write_nodes(f: &mut fmt::Formatter<'_>, nodes: &[Node], level: usize) -> fmt::Result {
    for node in nodes {
        write_node(f, node, level)?;
    }
    Ok(())
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &Node, level: usize) -> fmt::Result {
    let prefix = " ".repeat(level);
    f.write_str(&prefix)?;
    let body: &[Node] = match node {
        Node::Literal(text) => {
            f.write_str("literal(str: ")?;
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    f.write_char('\n')?;
                    f.write_str(&prefix)?;
                }
                f.write_str(line)?;
            }
            return writeln!(f, ")");
        }
        Node::Comment(text) => return writeln!(f, "comment({text})"),
        Node::Variable { key, escape } => {
            write!(f, "variable(")?;
            write_key(f, key)?;
            return writeln!(f, ", unescape: {})", !escape);
        }
        Node::Assignment { ident, key } => {
            write!(f, "assignment(name: {ident}, ")?;
            write_key(f, key)?;
            return writeln!(f, ")");
        }
        Node::Exec { name, key } => {
            write!(f, "exec(name: {name}")?;
            if let Some(key) = key {
                f.write_str(", ")?;
                write_key(f, key)?;
            }
            return writeln!(f, ")");
        }
        Node::Block {
            key,
            inverted,
            body,
        } => {
            f.write_str(if *inverted { "inverted(" } else { "block(" })?;
            write_key(f, key)?;
            f.write_char(')')?;
            body
        }
        Node::Section { name, body } => {
            write!(f, "section(name: {name})")?;
            body
        }
        Node::Define { name, body } => {
            write!(f, "define(name: {name})")?;
            body
        }
        Node::Partial { name, body } => {
            write!(f, "partial(name: {name})")?;
            body
        }
    };
    writeln!(f, " [")?;
    write_nodes(f, body, level + 2)?;
    writeln!(f, "{prefix}]")
}

fn write_key(f: &mut fmt::Formatter<'_>, key: &Key) -> fmt::Result {
    write!(f, "key: {}", key.name())?;
    write_filters(f, &key.filters)
}

fn write_filters(f: &mut fmt::Formatter<'_>, filters: &[Filter]) -> fmt::Result {
    if filters.is_empty() {
        return Ok(());
    }
    f.write_str(", filter: ")?;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            f.write_str(" | ")?;
        }
        f.write_str(&filter.name)?;
    }
    Ok(())
}
