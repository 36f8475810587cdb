mod builtins;
mod object;

pub use builtins::{by_index, lookup as lookup_builtin, BUILTIN_NAMES};
pub use object::{BuiltinFn, Closure, CompiledFunction, HashKey, Value};
