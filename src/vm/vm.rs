//! The bytecode virtual machine: a fixed-size value stack plus a call-frame
//! stack, executing the instruction stream a `Compiler` produced.

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;
use thiserror::Error;

use crate::code::{read_u16, Opcode};
use crate::compiler::Bytecode;
use crate::object::{self, CompiledFunction, Value};

use super::frame::Frame;

const STACK_SIZE: usize = 2048;
const GLOBALS_SIZE: usize = 65536;
const MAX_FRAMES: usize = 1024;

#[derive(Debug, Error, PartialEq)]
pub enum VmError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("opcode {0} undefined")]
    UnknownOpcode(u8),
    #[error("unsupported types for binary operation: {0} {1}")]
    UnsupportedBinaryTypes(&'static str, &'static str),
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error("calling non-function and non-built-in")]
    NotCallable,
    #[error("wrong number of arguments. got={got}, want={want}")]
    WrongArity { want: usize, got: usize },
    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),
    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),
    #[error("{0}")]
    Builtin(String),
}

pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        let main_function = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        Self {
            constants: bytecode.constants,
            stack: Vec::with_capacity(STACK_SIZE),
            sp: 0,
            globals: vec![Value::Null; GLOBALS_SIZE],
            frames: vec![Frame::new(main_function, 0)],
        }
    }

    /// Resumes execution against globals carried over from a previous run,
    /// the way a REPL keeps state between lines.
    pub fn new_with_globals(bytecode: Bytecode, mut globals: Vec<Value>) -> Self {
        let mut vm = Self::new(bytecode);
        globals.resize(GLOBALS_SIZE, Value::Null);
        vm.globals = globals;
        vm
    }

    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value an expression statement just popped, read back by index
    /// rather than pushed again — the REPL's view into "what did that line
    /// produce" after `run` returns.
    pub fn stack_top(&self) -> Value {
        self.stack.get(self.sp).cloned().unwrap_or(Value::Null)
    }

    pub fn run(&mut self) -> Result<(), VmError> {
        while self.current_frame().ip < self.current_frame().instructions().len() {
            let ip = self.current_frame().ip;
            let op_byte = self.current_frame().instructions()[ip];
            let op = Opcode::from_byte(op_byte).ok_or(VmError::UnknownOpcode(op_byte))?;
            self.current_frame_mut().ip += 1;

            match op {
                Opcode::Constant => {
                    let index = self.read_u16_operand() as usize;
                    self.push(self.constants[index].clone())?;
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => self.execute_binary_op(op)?,
                Opcode::True => self.push(Value::TRUE)?,
                Opcode::False => self.push(Value::FALSE)?,
                Opcode::Null => self.push(Value::Null)?,
                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                    self.execute_comparison(op)?
                }
                Opcode::Minus => self.execute_minus()?,
                Opcode::Bang => self.execute_bang()?,
                Opcode::JumpNotTruthy => {
                    let target = self.read_u16_operand() as usize;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }
                Opcode::Jump => {
                    let target = self.read_u16_operand() as usize;
                    self.current_frame_mut().ip = target;
                }
                Opcode::Pop => {
                    self.pop();
                }
                Opcode::SetGlobal => {
                    let index = self.read_u16_operand() as usize;
                    let value = self.pop();
                    self.globals[index] = value;
                }
                Opcode::GetGlobal => {
                    let index = self.read_u16_operand() as usize;
                    self.push(self.globals[index].clone())?;
                }
                Opcode::SetLocal => {
                    let index = self.read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base + index] = value;
                }
                Opcode::GetLocal => {
                    let index = self.read_u8_operand() as usize;
                    let base = self.current_frame().base_pointer;
                    self.push(self.stack[base + index].clone())?;
                }
                Opcode::GetBuiltin => {
                    let index = self.read_u8_operand() as usize;
                    let builtin = object::by_index(index).expect("compiler only emits valid indices");
                    self.push(builtin)?;
                }
                Opcode::Array => {
                    let count = self.read_u16_operand() as usize;
                    let array = self.build_array(count);
                    self.sp -= count;
                    self.push(array)?;
                }
                Opcode::Hash => {
                    let count = self.read_u16_operand() as usize;
                    let hash = self.build_hash(count)?;
                    self.sp -= count;
                    self.push(hash)?;
                }
                Opcode::Index => self.execute_index()?,
                Opcode::Call => {
                    let num_args = self.read_u8_operand() as usize;
                    self.execute_call(num_args)?;
                }
                Opcode::ReturnValue => {
                    let return_value = self.pop();
                    let frame = self.frames.pop().expect("call frame underflow");
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                Opcode::Return => {
                    let frame = self.frames.pop().expect("call frame underflow");
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }
            }
        }
        Ok(())
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("at least one frame")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("at least one frame")
    }

    fn read_u16_operand(&mut self) -> u16 {
        let ip = self.current_frame().ip;
        let value = read_u16(&self.current_frame().instructions()[ip..]);
        self.current_frame_mut().ip += 2;
        value
    }

    fn read_u8_operand(&mut self) -> u8 {
        let ip = self.current_frame().ip;
        let value = self.current_frame().instructions()[ip];
        self.current_frame_mut().ip += 1;
        value
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.sp >= STACK_SIZE {
            trace!("stack overflow at sp={}", self.sp);
            return Err(VmError::StackOverflow);
        }
        if self.sp == self.stack.len() {
            self.stack.push(value);
        } else {
            self.stack[self.sp] = value;
        }
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    fn execute_binary_op(&mut self, op: Opcode) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = match op {
                    Opcode::Add => l + r,
                    Opcode::Sub => l - r,
                    Opcode::Mul => l * r,
                    Opcode::Div => l / r,
                    _ => unreachable!(),
                };
                self.push(Value::Integer(result))
            }
            (Value::String(l), Value::String(r)) if matches!(op, Opcode::Add) => {
                self.push(Value::new_string(format!("{l}{r}")))
            }
            _ => Err(VmError::UnsupportedBinaryTypes(left.type_name(), right.type_name())),
        }
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), VmError> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = match op {
                    Opcode::Equal => l == r,
                    Opcode::NotEqual => l != r,
                    Opcode::GreaterThan => l > r,
                    _ => unreachable!(),
                };
                self.push(native_bool(result))
            }
            (Value::Boolean(l), Value::Boolean(r)) => {
                let result = match op {
                    Opcode::Equal => l == r,
                    Opcode::NotEqual => l != r,
                    _ => {
                        return Err(VmError::UnknownOperator(format!(
                            "{} {}",
                            left.type_name(),
                            right.type_name()
                        )))
                    }
                };
                self.push(native_bool(result))
            }
            _ => Err(VmError::UnsupportedBinaryTypes(left.type_name(), right.type_name())),
        }
    }

    fn execute_minus(&mut self) -> Result<(), VmError> {
        match self.pop() {
            Value::Integer(i) => self.push(Value::Integer(-i)),
            other => Err(VmError::UnknownOperator(format!("-{}", other.type_name()))),
        }
    }

    fn execute_bang(&mut self) -> Result<(), VmError> {
        let operand = self.pop();
        self.push(native_bool(!operand.is_truthy()))
    }

    fn build_array(&self, count: usize) -> Value {
        let start = self.sp - count;
        Value::Array(self.stack[start..self.sp].to_vec())
    }

    fn build_hash(&self, count: usize) -> Result<Value, VmError> {
        let start = self.sp - count;
        let mut entries = HashMap::new();
        let mut i = start;
        while i < self.sp {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();
            let hash_key = key
                .hash_key()
                .ok_or_else(|| VmError::UnusableHashKey(key.type_name()))?;
            entries.insert(hash_key, (key, value));
            i += 2;
        }
        Ok(Value::Hash(entries))
    }

    fn execute_index(&mut self) -> Result<(), VmError> {
        let index = self.pop();
        let left = self.pop();
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                if *i < 0 || *i as usize >= elements.len() {
                    self.push(Value::Null)
                } else {
                    self.push(elements[*i as usize].clone())
                }
            }
            (Value::Hash(entries), _) => {
                let hash_key = index
                    .hash_key()
                    .ok_or_else(|| VmError::UnusableHashKey(index.type_name()))?;
                let value = entries.get(&hash_key).map(|(_, v)| v.clone()).unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(VmError::IndexNotSupported(left.type_name())),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), VmError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::CompiledFunction(function) => {
                if function.num_parameters != num_args {
                    return Err(VmError::WrongArity {
                        want: function.num_parameters,
                        got: num_args,
                    });
                }
                if self.frames.len() >= MAX_FRAMES {
                    return Err(VmError::StackOverflow);
                }
                let base_pointer = self.sp - num_args;
                self.sp = base_pointer + function.num_locals;
                while self.stack.len() < self.sp {
                    self.stack.push(Value::Null);
                }
                self.frames.push(Frame::new(function, base_pointer));
                Ok(())
            }
            Value::Builtin(builtin) => {
                let args_start = self.sp - num_args;
                let args = self.stack[args_start..self.sp].to_vec();
                let result = builtin(&args);
                self.sp = args_start - 1;
                if let Value::Error(message) = result {
                    return Err(VmError::Builtin(message));
                }
                self.push(result)
            }
            _ => Err(VmError::NotCallable),
        }
    }
}

fn native_bool(value: bool) -> Value {
    if value {
        Value::TRUE
    } else {
        Value::FALSE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn run(input: &str) -> Value {
        let mut parser = Parser::new(Lexer::new(input));
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "parser errors: {:?}", parser.errors());
        let mut compiler = Compiler::new();
        compiler.compile_program(&program).expect("compile should succeed");
        let mut vm = Vm::new(compiler.bytecode());
        vm.run().expect("vm should run without error");
        vm.stack_top()
    }

    #[test]
    fn integer_arithmetic() {
        assert!(matches!(run("1 + 2"), Value::Integer(3)));
        assert!(matches!(run("50 / 2 * 2 + 10 - 5"), Value::Integer(55)));
        assert!(matches!(run("5 * (2 + 10)"), Value::Integer(60)));
    }

    #[test]
    fn boolean_expressions() {
        assert!(matches!(run("1 < 2"), Value::Boolean(true)));
        assert!(matches!(run("1 > 2"), Value::Boolean(false)));
        assert!(matches!(run("(1 < 2) == true"), Value::Boolean(true)));
        assert!(matches!(run("!true"), Value::Boolean(false)));
    }

    #[test]
    fn conditionals() {
        assert!(matches!(run("if (true) { 10 }"), Value::Integer(10)));
        assert!(matches!(run("if (false) { 10 }"), Value::Null));
        assert!(matches!(run("if (1 > 2) { 10 } else { 20 }"), Value::Integer(20)));
    }

    #[test]
    fn global_let_statements() {
        assert!(matches!(run("let one = 1; let two = one + one; one + two"), Value::Integer(3)));
    }

    #[test]
    fn string_expressions() {
        match run(r#""mon" + "key""#) {
            Value::String(s) => assert_eq!(&*s, "monkey"),
            other => panic!("expected a string, got {other:?}"),
        }
    }

    #[test]
    fn array_and_hash_literals() {
        match run("[1, 2, 3][1]") {
            Value::Integer(2) => {}
            other => panic!("expected 2, got {other:?}"),
        }
        match run(r#"{"one": 1, "two": 2}["two"]"#) {
            Value::Integer(2) => {}
            other => panic!("expected 2, got {other:?}"),
        }
    }

    #[test]
    fn functions_without_arguments() {
        let input = "let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();";
        assert!(matches!(run(input), Value::Integer(15)));
    }

    #[test]
    fn functions_with_arguments_and_bindings() {
        let input = "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2);";
        assert!(matches!(run(input), Value::Integer(3)));
    }

    #[test]
    fn recursive_functions_via_globals() {
        let input = "let countdown = fn(x) { if (x == 0) { 0 } else { countdown(x - 1) } }; countdown(3);";
        assert!(matches!(run(input), Value::Integer(0)));
    }

    #[test]
    fn calling_a_function_with_the_wrong_number_of_arguments_is_an_error() {
        let mut parser = Parser::new(Lexer::new("let f = fn(a) { a }; f(1, 2);"));
        let program = parser.parse_program();
        let mut compiler = Compiler::new();
        compiler.compile_program(&program).unwrap();
        let mut vm = Vm::new(compiler.bytecode());
        let err = vm.run().unwrap_err();
        assert_eq!(err, VmError::WrongArity { want: 1, got: 2 });
    }

    #[test]
    fn builtin_functions() {
        assert!(matches!(run(r#"len("four")"#), Value::Integer(4)));
        assert!(matches!(run("len([1, 2, 3])"), Value::Integer(3)));
    }
}
