//! Variable resolution for the compiler: maps identifier names to the scope
//! and slot the VM will read them from at runtime. There is no
//! tree-walking counterpart because `Environment` resolves names
//! dynamically instead.

use std::collections::HashMap;

use crate::object::BUILTIN_NAMES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
    Builtin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub scope: Scope,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A global table with every builtin already bound, the starting point
    /// for both one-shot compilation and a REPL's first line.
    pub fn new_with_builtins() -> Self {
        let mut table = Self::new();
        for (index, name) in BUILTIN_NAMES.iter().enumerate() {
            table.define_builtin(index, name);
        }
        table
    }

    /// Pushes a new local scope chained to `self`, taking ownership of it the
    /// way `Environment::new_enclosed` does for the evaluator.
    pub fn push(self) -> Self {
        SymbolTable {
            outer: Some(Box::new(self)),
            store: HashMap::new(),
            num_definitions: 0,
        }
    }

    /// Pops back to the enclosing scope, discarding this one's definitions.
    pub fn pop(self) -> Self {
        *self.outer.expect("pop called on the outermost symbol table")
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.is_global() {
            Scope::Global
        } else {
            Scope::Local
        };
        let symbol = Symbol {
            scope,
            index: self.num_definitions,
        };
        self.store.insert(name.to_string(), symbol);
        self.num_definitions += 1;
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            scope: Scope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol);
        symbol
    }

    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        self.store
            .get(name)
            .copied()
            .or_else(|| self.outer.as_ref().and_then(|outer| outer.resolve(name)))
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_resolves_in_the_global_scope() {
        let mut table = SymbolTable::new();
        let a = table.define("a");
        let b = table.define("b");
        assert_eq!(a, Symbol { scope: Scope::Global, index: 0 });
        assert_eq!(b, Symbol { scope: Scope::Global, index: 1 });
        assert_eq!(table.resolve("a"), Some(a));
        assert_eq!(table.resolve("b"), Some(b));
    }

    #[test]
    fn locals_shadow_globals_and_resolve_through_the_chain() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut local = global.push();
        let b = local.define("b");
        assert_eq!(local.resolve("a").unwrap().scope, Scope::Global);
        assert_eq!(local.resolve("b"), Some(b));

        let global = local.pop();
        assert!(global.resolve("b").is_none());
    }

    #[test]
    fn nested_locals_resolve_through_two_levels() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut first_local = global.push();
        first_local.define("b");
        let mut second_local = first_local.push();
        let c = second_local.define("c");

        assert_eq!(second_local.resolve("a").unwrap().scope, Scope::Global);
        assert_eq!(second_local.resolve("b").unwrap().scope, Scope::Local);
        assert_eq!(second_local.resolve("c"), Some(c));
    }

    #[test]
    fn builtins_resolve_in_every_scope() {
        let mut global = SymbolTable::new();
        let len = global.define_builtin(0, "len");
        let local = global.push();
        assert_eq!(local.resolve("len"), Some(len));
    }

    #[test]
    fn unresolved_names_return_none() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve("missing"), None);
    }
}
