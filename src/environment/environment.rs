//! A scope frame: `name -> value` plus an optional parent pointer.
//!
//! Uses a shared `Rc<RefCell<Environment>>` parent rather than an owned
//! chain: Monkey closures must be able to share a single mutable frame
//! across sibling closures (e.g. two functions bound in the same `let`
//! block that call each other), which an owned-parent chain cannot express.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::object::Value;

#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    outer: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            outer: None,
        }))
    }

    /// Creates a new scope whose parent is `outer`, sharing it rather than
    /// owning a copy.
    pub fn new_enclosed(outer: Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            outer: Some(outer),
        }))
    }

    /// Looks up `name`, walking the parent chain. Returns `None` if it is
    /// unbound in every frame.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }
        self.outer.as_ref().and_then(|outer| outer.borrow().get(name))
    }

    /// Binds `name` in *this* frame only.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }
}
