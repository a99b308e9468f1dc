//! Filter registry and the invocation protocol.
//!
//! A filter is a host function called with the piped value followed by
//! the filter's arguments. Its [`Signature`] says what it accepts; the
//! registry checks and converts values against it before the call, so a
//! filter body only ever sees the shapes it asked for.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::builtins;
use crate::error::FilterError;
use crate::value::Value;

/// Shape accepted for the piped value or for one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Any,
    String,
    Int,
    Float,
    /// Any numeric value, passed through unchanged.
    Number,
    Bool,
    Seq,
    /// A map or a record.
    Map,
}

impl Param {
    /// Checks `value` against this parameter. Numeric values convert
    /// between integer and float; `Int` truncates floats.
    pub fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (Param::Any, value) => Some(value),
            (Param::String, value @ Value::String(_)) => Some(value),
            (Param::Bool, value @ Value::Bool(_)) => Some(value),
            (Param::Seq, value @ Value::Seq(_)) => Some(value),
            (Param::Map, value @ (Value::Map(_) | Value::Record(_))) => Some(value),
            (Param::Number, value) if value.is_number() => Some(value),
            (Param::Int, value @ Value::Int(_)) => Some(value),
            (Param::Int, Value::UInt(u)) => i64::try_from(u).ok().map(Value::Int),
            (Param::Int, Value::Float(f)) if f.is_finite() => Some(Value::Int(f as i64)),
            (Param::Float, value) => value.as_f64().map(Value::Float),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub input: Param,
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new(input: Param) -> Self {
        Self {
            input,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

pub type FilterFn = dyn Fn(Value, Vec<Value>) -> Result<Value, FilterError> + Send + Sync;

#[derive(Clone)]
pub struct Function {
    signature: Signature,
    func: Arc<FilterFn>,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl Function {
    pub fn new<F>(signature: Signature, func: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        Self {
            signature,
            func: Arc::new(func),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Calls the filter after checking the arguments against its signature.
    ///
    /// A wrong argument count or a value that does not fit its parameter
    /// yields `Ok(Value::Null)` without calling the filter. Errors returned
    /// by the filter itself are passed on.
    pub fn invoke(&self, value: Value, args: Vec<Value>) -> Result<Value, FilterError> {
        if args.len() != self.signature.params.len() {
            trace!(
                expected = self.signature.params.len(),
                got = args.len(),
                "filter arity mismatch"
            );
            return Ok(Value::Null);
        }
        let Some(value) = self.signature.input.coerce(value) else {
            trace!(expected = ?self.signature.input, "filter input mismatch");
            return Ok(Value::Null);
        };
        let args: Option<Vec<Value>> = self
            .signature
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| param.coerce(arg))
            .collect();
        let Some(args) = args else {
            trace!(expected = ?self.signature.params, "filter argument mismatch");
            return Ok(Value::Null);
        };
        (self.func)(value, args)
    }
}

/// Name → filter table handed to a render.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    functions: HashMap<String, Function>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in catalog.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register(&mut registry);
        registry
    }

    /// Registers `func` under `name`, replacing any previous filter.
    pub fn register<F>(&mut self, name: impl Into<String>, signature: Signature, func: F) -> &mut Self
    where
        F: Fn(Value, Vec<Value>) -> Result<Value, FilterError> + Send + Sync + 'static,
    {
        self.insert(name, Function::new(signature, func))
    }

    pub fn insert(&mut self, name: impl Into<String>, function: Function) -> &mut Self {
        self.functions.insert(name.into(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
