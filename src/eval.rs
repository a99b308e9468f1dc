use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::ast::*;
use crate::config::Config;
use crate::error::RenderError;
use crate::filters::{FilterRegistry, Function};
use crate::value::Value;

/// Pseudo-variable naming the current value of a frame.
pub const CONTEXT: &str = "ctx";

/// Pseudo-variables available inside the body of a sequence block.
pub const LOOP_VARIABLES: [&str; 5] = ["loop", "loop0", "revloop", "revloop0", "length"];

/// Position of the current element in a sequence block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPosition {
    pub index: usize,
    pub length: usize,
}

impl LoopPosition {
    fn get(&self, name: &str) -> Option<Value> {
        let (i, n) = (self.index, self.length);
        let value = match name {
            "loop" => i + 1,
            "loop0" => i,
            "revloop" => n - i,
            "revloop0" => n - i - 1,
            "length" => n,
            _ => return None,
        };
        Some(Value::from(value))
    }
}

struct Frame<'r> {
    current: Cow<'r, Value>,
    locals: HashMap<String, Value>,
    filters: Option<&'r FilterRegistry>,
    looping: Option<LoopPosition>,
}

impl<'r> Frame<'r> {
    fn new(current: Cow<'r, Value>, looping: Option<LoopPosition>) -> Self {
        Self {
            current,
            locals: HashMap::new(),
            filters: None,
            looping,
        }
    }

    fn resolve(&self, name: &str) -> Option<Cow<'_, Value>> {
        if let Some(value) = self.looping.as_ref().and_then(|l| l.get(name)) {
            return Some(Cow::Owned(value));
        }
        if name == CONTEXT {
            return Some(Cow::Borrowed(&*self.current));
        }
        if let Some(value) = self.locals.get(name) {
            return Some(Cow::Borrowed(value));
        }
        self.current.get(name).map(Cow::Borrowed)
    }

    fn is_reserved(&self, name: &str) -> bool {
        name == CONTEXT || (self.looping.is_some() && LOOP_VARIABLES.contains(&name))
    }
}

/// Scope stack of a single render.
///
/// The root frame borrows the caller's context and owns the filter
/// registry reference; blocks, loops and keyed execs push child frames
/// that own their value.
pub struct State<'r> {
    frames: Vec<Frame<'r>>,
}

impl<'r> State<'r> {
    pub fn new(context: &'r Value, filters: &'r FilterRegistry) -> Self {
        let mut root = Frame::new(Cow::Borrowed(context), None);
        root.filters = Some(filters);
        Self { frames: vec![root] }
    }

    pub fn push(&mut self, value: Value) {
        self.frames.push(Frame::new(Cow::Owned(value), None));
    }

    pub fn push_loop(&mut self, value: Value, position: LoopPosition) {
        self.frames
            .push(Frame::new(Cow::Owned(value), Some(position)));
    }

    /// Drops the top frame. The root frame is never popped.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Looks `name` up from the innermost frame outwards.
    pub fn resolve(&self, name: &str) -> Option<Cow<'_, Value>> {
        self.frames.iter().rev().find_map(|frame| frame.resolve(name))
    }

    /// Binds `name` in the innermost frame.
    pub fn define(&mut self, name: &str, value: Value) -> Result<(), RenderError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        if frame.is_reserved(name) {
            return Err(RenderError::Reserved {
                name: name.to_string(),
            });
        }
        frame.locals.insert(name.to_string(), value);
        Ok(())
    }

    /// Searches the first frame holding a non-empty registry.
    pub fn lookup_filter(&self, name: &str) -> Option<&'r Function> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.filters.filter(|f| !f.is_empty()))
            .and_then(|filters| filters.get(name))
    }
}

pub struct Evaluator<'r> {
    named: &'r NamedNodes,
    config: &'r Config,
    state: State<'r>,
    depth: usize,
}

impl<'r> Evaluator<'r> {
    pub fn new(named: &'r NamedNodes, config: &'r Config, state: State<'r>) -> Self {
        Self {
            named,
            config,
            state,
            depth: 0,
        }
    }

    pub fn render(&mut self, nodes: &[Node], out: &mut dyn fmt::Write) -> Result<(), RenderError> {
        for node in nodes {
            self.render_node(node, out)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node, out: &mut dyn fmt::Write) -> Result<(), RenderError> {
        match node {
            Node::Literal(text) => out.write_str(text)?,
            Node::Comment(_) | Node::Define { .. } => {}
            Node::Variable { key, escape } => self.render_variable(key, *escape, out)?,
            Node::Block {
                key,
                inverted,
                body,
            } => self.render_block(key, *inverted, body, out)?,
            Node::Section { name, body } => {
                let named = self.named;
                let body = named.get(name).map_or(&body[..], |b| &b[..]);
                self.enter(name)?;
                let result = self.render(body, out);
                self.depth -= 1;
                result?;
            }
            Node::Exec { name, key } => self.render_exec(name, key.as_ref(), out)?,
            Node::Partial { body, .. } => self.render(body, out)?,
            Node::Assignment { ident, key } => {
                let value = self.resolve_key(key)?;
                self.state.define(ident, value)?;
            }
        }
        Ok(())
    }

    fn render_variable(
        &mut self,
        key: &Key,
        escape: bool,
        out: &mut dyn fmt::Write,
    ) -> Result<(), RenderError> {
        let value = match self.resolve_key(key) {
            Ok(value) => value,
            Err(err) => {
                trace!(key = key.name(), %err, "variable skipped");
                return Ok(());
            }
        };
        let Some(text) = value.stringify() else {
            return Ok(());
        };
        if escape && self.config.escape_html {
            escape_html(&text, out)?;
        } else {
            out.write_str(&text)?;
        }
        Ok(())
    }

    fn render_block(
        &mut self,
        key: &Key,
        inverted: bool,
        body: &[Node],
        out: &mut dyn fmt::Write,
    ) -> Result<(), RenderError> {
        let value = self.resolve_key(key).unwrap_or_else(|err| {
            trace!(key = key.name(), %err, "block key treated as null");
            Value::Null
        });
        if value.is_truthy() == inverted {
            return Ok(());
        }
        if inverted {
            return self.render(body, out);
        }
        match value {
            Value::Map(_) | Value::Record(_) => self.render_in(value, None, body, out),
            Value::Seq(items) => {
                let length = items.len();
                for (index, item) in items.into_iter().enumerate() {
                    self.render_in(item, Some(LoopPosition { index, length }), body, out)?;
                }
                Ok(())
            }
            _ => self.render(body, out),
        }
    }

    fn render_exec(
        &mut self,
        name: &str,
        key: Option<&Key>,
        out: &mut dyn fmt::Write,
    ) -> Result<(), RenderError> {
        let named = self.named;
        let Some(body) = named.get(name) else {
            return Err(RenderError::UnknownNode {
                name: name.to_string(),
            });
        };
        self.enter(name)?;
        let result = match key {
            Some(key) => self
                .resolve_key(key)
                .and_then(|value| self.render_in(value, None, body, out)),
            None => self.render(body, out),
        };
        self.depth -= 1;
        result
    }

    /// Renders `body` in a child frame holding `value`.
    fn render_in(
        &mut self,
        value: Value,
        looping: Option<LoopPosition>,
        body: &[Node],
        out: &mut dyn fmt::Write,
    ) -> Result<(), RenderError> {
        match looping {
            Some(position) => self.state.push_loop(value, position),
            None => self.state.push(value),
        }
        let result = self.render(body, out);
        self.state.pop();
        result
    }

    fn enter(&mut self, name: &str) -> Result<(), RenderError> {
        if self.depth >= self.config.max_exec_depth {
            return Err(RenderError::RecursionLimit {
                name: name.to_string(),
                limit: self.config.max_exec_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Resolves the operand, then runs it through the filter pipeline.
    fn resolve_key(&self, key: &Key) -> Result<Value, RenderError> {
        let mut value = self.resolve_argument(&key.operand)?;
        for filter in &key.filters {
            value = self.apply_filter(filter, value)?;
        }
        Ok(value)
    }

    fn resolve_argument(&self, argument: &Argument) -> Result<Value, RenderError> {
        if argument.is_ident() {
            return self
                .state
                .resolve(&argument.literal)
                .map(Cow::into_owned)
                .ok_or_else(|| RenderError::Undefined {
                    name: argument.literal.clone(),
                });
        }
        argument
            .literal_value()
            .ok_or_else(|| RenderError::InvalidLiteral {
                literal: argument.literal.clone(),
            })
    }

    fn apply_filter(&self, filter: &Filter, value: Value) -> Result<Value, RenderError> {
        let Some(function) = self.state.lookup_filter(&filter.name) else {
            trace!(filter = %filter.name, "unknown filter");
            return Ok(Value::Null);
        };
        let args = filter
            .args
            .iter()
            .map(|arg| self.resolve_argument(arg).unwrap_or_default())
            .collect();
        function
            .invoke(value, args)
            .map_err(|source| RenderError::Filter {
                name: filter.name.clone(),
                source,
            })
    }
}

/// Writes `text` with `& < > " '` replaced by HTML entities.
pub fn escape_html(text: &str, out: &mut dyn fmt::Write) -> fmt::Result {
    let mut last = 0;
    for (i, c) in text.char_indices() {
        let entity = match c {
            '&' => "&amp;",
            '<' => "&lt;",
            '>' => "&gt;",
            '"' => "&#34;",
            '\'' => "&#39;",
            _ => continue,
        };
        out.write_str(&text[last..i])?;
        out.write_str(entity)?;
        last = i + 1;
    }
    out.write_str(&text[last..])
}
