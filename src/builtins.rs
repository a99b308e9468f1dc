//! The built-in filter catalog installed by [`FilterRegistry::with_builtins`].

use std::cmp::Ordering;

use crate::error::FilterError;
use crate::filters::{FilterRegistry, Param, Signature};
use crate::value::Value;

static NULL: Value = Value::Null;

/// Adds every built-in filter to `registry`.
pub fn register(registry: &mut FilterRegistry) {
    let text = || Signature::new(Param::String);
    let seq = || Signature::new(Param::Seq);
    let number = || Signature::new(Param::Number).param(Param::Number);
    let binary = || Signature::new(Param::Any).param(Param::Any);

    registry
        .register("lower", text(), |value, _| Ok(map_str(&value, str::to_lowercase)))
        .register("upper", text(), |value, _| Ok(map_str(&value, str::to_uppercase)))
        .register("trim", text(), |value, _| {
            Ok(map_str(&value, |s| s.trim().to_string()))
        })
        .register("title", text(), |value, _| Ok(map_str(&value, title)))
        .register("split", text().param(Param::String), |value, args| {
            Ok(split_last(as_str(&value), str_arg(&args, 0)))
        })
        .register("splitall", text().param(Param::String), |value, args| {
            Ok(split_all(as_str(&value), str_arg(&args, 0)))
        })
        .register("join", seq().param(Param::String), |value, args| {
            join(&value, str_arg(&args, 0))
        })
        .register(
            "replace",
            text().param(Param::String).param(Param::String),
            |value, args| {
                Ok(Value::from(
                    as_str(&value).replace(str_arg(&args, 0), str_arg(&args, 1)),
                ))
            },
        )
        .register("count", text().param(Param::String), |value, args| {
            let n = as_str(&value).matches(str_arg(&args, 0)).count();
            Ok(Value::from(n))
        })
        .register("repeat", text().param(Param::Int), |value, args| {
            let n = usize::try_from(int_arg(&args, 0))
                .map_err(|_| FilterError::new("repeat count must not be negative"))?;
            Ok(Value::from(as_str(&value).repeat(n)))
        })
        .register("len", Signature::new(Param::Any), |value, _| {
            Ok(Value::from(value.len().unwrap_or(0)))
        })
        .register("first", seq(), |value, _| {
            Ok(items(&value).first().cloned().unwrap_or_default())
        })
        .register("last", seq(), |value, _| {
            Ok(items(&value).last().cloned().unwrap_or_default())
        })
        .register("firstn", seq().param(Param::Int), |value, args| {
            Ok(take_n(items(&value), int_arg(&args, 0), |items, n| &items[..n]))
        })
        .register("lastn", seq().param(Param::Int), |value, args| {
            Ok(take_n(items(&value), int_arg(&args, 0), |items, n| {
                &items[items.len() - n..]
            }))
        })
        .register("reverse", Signature::new(Param::Any), |value, _| {
            Ok(match value {
                Value::Seq(mut items) => {
                    items.reverse();
                    Value::Seq(items)
                }
                Value::String(s) => Value::String(s.chars().rev().collect()),
                _ => Value::Null,
            })
        })
        .register("add", number(), |value, args| {
            arithmetic(&value, any_arg(&args, 0), i64::checked_add, |a, b| a + b)
        })
        .register("sub", number(), |value, args| {
            arithmetic(&value, any_arg(&args, 0), i64::checked_sub, |a, b| a - b)
        })
        .register("mul", number(), |value, args| {
            arithmetic(&value, any_arg(&args, 0), i64::checked_mul, |a, b| a * b)
        })
        .register("div", number(), |value, args| {
            let rhs = any_arg(&args, 0);
            nonzero(rhs)?;
            arithmetic(&value, rhs, i64::checked_div, |a, b| a / b)
        })
        .register("mod", number(), |value, args| {
            let rhs = any_arg(&args, 0);
            nonzero(rhs)?;
            arithmetic(&value, rhs, i64::checked_rem, |a, b| a % b)
        })
        .register("eq", binary(), |value, args| {
            Ok(Value::Bool(equals(&value, any_arg(&args, 0))))
        })
        .register("ne", binary(), |value, args| {
            Ok(Value::Bool(!equals(&value, any_arg(&args, 0))))
        })
        .register("gt", binary(), |value, args| {
            Ok(ordering(&value, any_arg(&args, 0), Ordering::is_gt))
        })
        .register("ge", binary(), |value, args| {
            Ok(ordering(&value, any_arg(&args, 0), Ordering::is_ge))
        })
        .register("lt", binary(), |value, args| {
            Ok(ordering(&value, any_arg(&args, 0), Ordering::is_lt))
        })
        .register("le", binary(), |value, args| {
            Ok(ordering(&value, any_arg(&args, 0), Ordering::is_le))
        })
        .register("and", binary(), |value, args| {
            Ok(Value::Bool(value.is_truthy() && any_arg(&args, 0).is_truthy()))
        })
        .register("or", binary(), |value, args| {
            Ok(Value::Bool(value.is_truthy() || any_arg(&args, 0).is_truthy()))
        })
        .register("not", Signature::new(Param::Any), |value, _| {
            Ok(Value::Bool(!value.is_truthy()))
        });
}

fn as_str(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

fn items(value: &Value) -> &[Value] {
    value.as_seq().unwrap_or_default()
}

fn any_arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

fn str_arg(args: &[Value], index: usize) -> &str {
    as_str(any_arg(args, index))
}

fn int_arg(args: &[Value], index: usize) -> i64 {
    any_arg(args, index).as_i64().unwrap_or_default()
}

fn map_str(value: &Value, f: impl Fn(&str) -> String) -> Value {
    Value::from(f(as_str(value)))
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = c.is_whitespace();
    }
    out
}

/// Splits once, at the last occurrence of `sep`, so that `"a_b_c" | split
/// "_"` is `["a_b", "c"]`. Splitting at every occurrence is `splitall`;
/// `split` keeps the leading part whole on purpose.
fn split_last(s: &str, sep: &str) -> Value {
    match s.rsplit_once(sep) {
        Some((head, tail)) if !sep.is_empty() => Value::from(vec![head, tail]),
        _ => Value::from(vec![s]),
    }
}

/// Splits at every occurrence of `sep`; an empty `sep` splits into chars.
fn split_all(s: &str, sep: &str) -> Value {
    if sep.is_empty() {
        return Value::Seq(s.chars().map(|c| Value::from(c.to_string())).collect());
    }
    Value::from(s.split(sep).collect::<Vec<_>>())
}

fn join(value: &Value, sep: &str) -> Result<Value, FilterError> {
    let parts = items(value)
        .iter()
        .map(|item| {
            item.stringify().ok_or_else(|| {
                FilterError::new(format!("can not join a {} value", item.type_name()))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from(parts.join(sep)))
}

fn take_n(items: &[Value], n: i64, slice: fn(&[Value], usize) -> &[Value]) -> Value {
    match usize::try_from(n) {
        Ok(n) if n <= items.len() => Value::Seq(slice(items, n).to_vec()),
        _ => Value::Null,
    }
}

fn nonzero(value: &Value) -> Result<(), FilterError> {
    if value.as_f64() == Some(0.0) {
        return Err(FilterError::new("division by zero"));
    }
    Ok(())
}

/// Integer arithmetic when both sides are integers, float otherwise.
fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Result<Value, FilterError> {
    let both_ints = !matches!(lhs, Value::Float(_)) && !matches!(rhs, Value::Float(_));
    if both_ints {
        if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
            return int(a, b)
                .map(Value::Int)
                .ok_or_else(|| FilterError::new("integer overflow"));
        }
    }
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(float(a, b))),
        _ => Ok(Value::Null),
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ if lhs.is_number() && rhs.is_number() => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
        _ => None,
    }
}

fn equals(lhs: &Value, rhs: &Value) -> bool {
    compare(lhs, rhs).map_or(lhs == rhs, Ordering::is_eq)
}

fn ordering(lhs: &Value, rhs: &Value, accept: fn(Ordering) -> bool) -> Value {
    compare(lhs, rhs).map_or(Value::Null, |o| Value::Bool(accept(o)))
}
