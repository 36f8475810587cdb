//! A single call frame: the function being executed, its instruction
//! pointer, and where its locals start on the value stack.

use std::rc::Rc;

use crate::object::CompiledFunction;

pub struct Frame {
    pub function: Rc<CompiledFunction>,
    pub ip: usize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(function: Rc<CompiledFunction>, base_pointer: usize) -> Self {
        Self {
            function,
            ip: 0,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &[u8] {
        &self.function.instructions.0
    }
}
