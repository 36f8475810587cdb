mod compiler;
mod symbol_table;

pub use compiler::{Bytecode, CompileError, Compiler};
pub use symbol_table::{Scope, Symbol, SymbolTable};
