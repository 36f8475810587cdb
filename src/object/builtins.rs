//! The fixed built-in function table. `push` and `rest` return *new*
//! arrays; none of these mutate their input.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::Value;

fn wrong_arity(got: usize, want: usize) -> Value {
    Value::Error(format!("wrong number of arguments. got={got}, want={want}"))
}

fn len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::String(s) => Value::Integer(s.chars().count() as i64),
        Value::Array(elements) => Value::Integer(elements.len() as i64),
        other => Value::Error(format!("argument to `len` not supported, got {}", other.type_name())),
    }
}

fn first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.first().cloned().unwrap_or(Value::Null),
        other => Value::Error(format!(
            "argument to `first` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.last().cloned().unwrap_or(Value::Null),
        other => Value::Error(format!(
            "argument to `last` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                Value::Null
            } else {
                Value::Array(elements[1..].to_vec())
            }
        }
        other => Value::Error(format!(
            "argument to `rest` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    match &args[0] {
        Value::Array(elements) => {
            let mut new_elements = elements.clone();
            new_elements.push(args[1].clone());
            Value::Array(new_elements)
        }
        other => Value::Error(format!(
            "argument to `push` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

pub static BUILTINS: Lazy<HashMap<&'static str, crate::object::BuiltinFn>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, crate::object::BuiltinFn> = HashMap::new();
    m.insert("len", len);
    m.insert("first", first);
    m.insert("last", last);
    m.insert("rest", rest);
    m.insert("push", push);
    m
});

/// Builtins in a stable order, used by the compiler to assign `OpGetBuiltin`
/// indices that the VM resolves the same way.
pub const BUILTIN_NAMES: [&str; 5] = ["len", "first", "last", "rest", "push"];

pub fn lookup(name: &str) -> Option<Value> {
    BUILTINS.get(name).copied().map(Value::Builtin)
}

pub fn by_index(index: usize) -> Option<Value> {
    BUILTIN_NAMES
        .get(index)
        .and_then(|name| BUILTINS.get(name))
        .copied()
        .map(Value::Builtin)
}
