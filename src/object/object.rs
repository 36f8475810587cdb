//! The runtime value domain shared by the tree-walking evaluator and the
//! bytecode VM.
//!
//! `ReturnWrapper` and `Error` are internal control-flow carriers: they
//! never appear as ordinary data a Monkey program can hold, only as the
//! shape every evaluation step passes upward until a function boundary
//! (`ReturnWrapper`) or the REPL (`Error`) unwraps them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Statement;
use crate::code::Instructions;
use crate::environment::Environment;

pub type BuiltinFn = fn(&[Value]) -> Value;

/// A tree-walking-evaluator function value: parameters, body, and the
/// environment it closed over.
#[derive(Debug, Clone)]
pub struct Closure {
    pub parameters: Vec<String>,
    pub body: Vec<Statement>,
    pub env: Rc<RefCell<Environment>>,
}

/// A bytecode-VM function value: a self-contained instruction stream plus
/// the frame layout the VM needs to call it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
    Null,
    Array(Vec<Value>),
    Hash(HashMap<HashKey, (Value, Value)>),
    Function(Rc<Closure>),
    CompiledFunction(Rc<CompiledFunction>),
    Builtin(BuiltinFn),
    ReturnWrapper(Box<Value>),
    Error(String),
}

impl Value {
    pub const TRUE: Value = Value::Boolean(true);
    pub const FALSE: Value = Value::Boolean(false);

    /// The stable type tag used in error messages, e.g. `"type mismatch:
    /// INTEGER + BOOLEAN"`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::String(_) => "STRING",
            Value::Null => "NULL",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::Function(_) => "FUNCTION",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION_OBJ",
            Value::Builtin(_) => "BUILTIN",
            Value::ReturnWrapper(_) => "RETURN_VALUE",
            Value::Error(_) => "ERROR",
        }
    }

    /// `FALSE` and `Null` are falsy; everything else, including integer `0`
    /// and the empty string, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn new_string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
            Value::Array(elements) => {
                let rendered = elements
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }
            Value::Hash(entries) => {
                let rendered = entries
                    .values()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{rendered}}}")
            }
            Value::Function(func) => {
                write!(
                    f,
                    "fn({}) {{\n{}\n}}",
                    func.parameters.join(", "),
                    func.body
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>()
                        .join("")
                )
            }
            Value::CompiledFunction(compiled) => write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(compiled)),
            Value::Builtin(_) => write!(f, "builtin function"),
            Value::ReturnWrapper(inner) => write!(f, "{inner}"),
            Value::Error(message) => write!(f, "ERROR: {message}"),
        }
    }
}

/// `(type_tag, u64)`. Only `Integer`, `Boolean`, and `String` are hashable;
/// any other key type is a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    kind: HashKeyKind,
    bits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HashKeyKind {
    Integer,
    Boolean,
    String,
}

/// FNV-1a 64, used to key string hash literals.
fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

impl Value {
    /// Computes this value's `HashKey`, or `None` if it is not a hashable
    /// type.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(i) => Some(HashKey {
                kind: HashKeyKind::Integer,
                bits: *i as u64,
            }),
            Value::Boolean(b) => Some(HashKey {
                kind: HashKeyKind::Boolean,
                bits: u64::from(*b),
            }),
            Value::String(s) => Some(HashKey {
                kind: HashKeyKind::String,
                bits: fnv1a64(s.as_bytes()),
            }),
            _ => None,
        }
    }
}
