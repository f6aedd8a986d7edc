//! Methods of the optional container, reachable through puppet replay.
//!
//! Terminal pipeline operations such as `max` or `first` produce a
//! `Value::Maybe`; a puppet recorded after them calls these methods to
//! transform or unwrap the optional result.

use crate::error::{Result, StreamError};
use crate::func::Func;
use crate::value::Value;

/// Dispatch `method` on an optional value. `None` if there is no such method.
pub(crate) fn call(inner: Option<&Value>, method: &str, args: &[Value]) -> Option<Result<Value>> {
    let result = match method {
        "get" => inner.cloned().ok_or(StreamError::NoValue),
        "get_or_null" => Ok(inner.cloned().unwrap_or(Value::Null)),
        "get_or_else" => Ok(match inner {
            Some(value) => value.clone(),
            None => args.first().cloned().unwrap_or(Value::Null),
        }),
        "or_else" => or_else(inner, args),
        "map" => map(inner, args),
        "flat_map" => flat_map(inner, args),
        "filter" => filter(inner, args),
        "is_defined" => Ok(Value::Bool(inner.is_some())),
        "is_empty" => Ok(Value::Bool(inner.is_none())),
        _ => return None,
    };
    Some(result)
}

fn wrap(inner: Option<&Value>) -> Value {
    Value::Maybe(inner.map(|v| Box::new(v.clone())))
}

fn func_arg<'a>(method: &'static str, args: &'a [Value]) -> Result<&'a Func> {
    match args.first() {
        Some(Value::Func(func)) => Ok(func),
        Some(other) => Err(StreamError::type_mismatch(method, "callable", other.type_name())),
        None => Err(StreamError::type_mismatch(method, "callable", "nothing")),
    }
}

fn or_else(inner: Option<&Value>, args: &[Value]) -> Result<Value> {
    if inner.is_some() {
        return Ok(wrap(inner));
    }
    match args.first() {
        Some(alternative @ Value::Maybe(_)) => Ok(alternative.clone()),
        Some(other) => Err(StreamError::type_mismatch("or_else", "option", other.type_name())),
        None => Err(StreamError::type_mismatch("or_else", "option", "nothing")),
    }
}

fn map(inner: Option<&Value>, args: &[Value]) -> Result<Value> {
    let func = func_arg("map", args)?;
    match inner {
        Some(value) => Ok(Value::some(func.call(std::slice::from_ref(value))?)),
        None => Ok(Value::none()),
    }
}

fn flat_map(inner: Option<&Value>, args: &[Value]) -> Result<Value> {
    let func = func_arg("flat_map", args)?;
    let Some(value) = inner else {
        return Ok(Value::none());
    };
    match func.call(std::slice::from_ref(value))? {
        result @ Value::Maybe(_) => Ok(result),
        other => Err(StreamError::type_mismatch("flat_map", "option", other.type_name())),
    }
}

fn filter(inner: Option<&Value>, args: &[Value]) -> Result<Value> {
    let func = func_arg("filter", args)?;
    match inner {
        Some(value) if func.call(std::slice::from_ref(value))?.is_truthy() => Ok(wrap(inner)),
        _ => Ok(Value::none()),
    }
}
