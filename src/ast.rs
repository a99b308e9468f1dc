use std::collections::BTreeMap;
use std::sync::Arc;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    Ident,
    Integer,
    Float,
    Bool,
    String,
}

/// A key operand or filter argument, kept in its raw form and resolved
/// when the template renders.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub literal: String,
    pub kind: ArgumentKind,
}

impl Argument {
    pub fn new(literal: impl Into<String>, kind: ArgumentKind) -> Self {
        Self {
            literal: literal.into(),
            kind,
        }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(name, ArgumentKind::Ident)
    }

    pub fn is_ident(&self) -> bool {
        self.kind == ArgumentKind::Ident
    }

    /// Value of a literal argument. `None` for identifiers and for literals
    /// that do not parse.
    pub fn literal_value(&self) -> Option<Value> {
        match self.kind {
            ArgumentKind::Ident => None,
            ArgumentKind::String => Some(Value::String(self.literal.clone())),
            ArgumentKind::Bool => self.literal.parse().ok().map(Value::Bool),
            ArgumentKind::Float => self.literal.parse().ok().map(Value::Float),
            ArgumentKind::Integer => self
                .literal
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| self.literal.parse::<u64>().map(Value::UInt))
                .ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<Argument>,
}

/// An operand followed by its filter pipeline, e.g. `text | split "_"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub operand: Argument,
    pub filters: Vec<Filter>,
}

impl Key {
    pub fn name(&self) -> &str {
        &self.operand.literal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(String),
    Comment(String),
    Variable {
        key: Key,
        escape: bool,
    },
    Block {
        key: Key,
        inverted: bool,
        body: Vec<Node>,
    },
    /// Default body, replaced by a definition of the same name when one
    /// exists.
    Section {
        name: String,
        body: Vec<Node>,
    },
    /// Registered in [`NamedNodes`] while parsing; renders nothing in place.
    Define {
        name: String,
        body: Arc<[Node]>,
    },
    Exec {
        name: String,
        key: Option<Key>,
    },
    /// Body of another template, parsed and spliced in at parse time.
    Partial {
        name: String,
        body: Vec<Node>,
    },
    Assignment {
        ident: String,
        key: Key,
    },
}

/// Name → body table filled by definitions and partial merges.
///
/// Write-once per name: the first definition wins and later ones with the
/// same name are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedNodes {
    nodes: BTreeMap<String, Arc<[Node]>>,
}

impl NamedNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `name` was already registered.
    pub fn register(&mut self, name: impl Into<String>, body: Arc<[Node]>) -> bool {
        match self.nodes.entry(name.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(body);
                true
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<[Node]>> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Adds every entry of `other` whose name is not registered yet.
    pub fn merge(&mut self, other: NamedNodes) {
        for (name, body) in other.nodes {
            self.register(name, body);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Node])> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), &v[..]))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Result of a parse: the top-level nodes and every named body discovered
/// along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Root {
    pub nodes: Vec<Node>,
    pub named: NamedNodes,
}
