//! Walks the AST and emits bytecode. Shares the opcode table in
//! `crate::code` with the VM that runs its output.
//!
//! Function bodies close over globals and builtins by name but not over an
//! enclosing function's locals — the tree-walking evaluator (`crate::eval`)
//! is the engine that gives Monkey full lexical closures; the VM trades that
//! for a simpler, allocation-light call convention. See `DESIGN.md`.

use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::ast::{Expression, Program, Statement};
use crate::code::{make, Instructions, Opcode};
use crate::object::{CompiledFunction, Value};

use super::symbol_table::{Scope, SymbolTable};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
}

#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

impl CompilationScope {
    fn new() -> Self {
        Self {
            instructions: Instructions::new(),
            last_instruction: None,
            previous_instruction: None,
        }
    }
}

pub struct Compiler {
    constants: Vec<Value>,
    scopes: Vec<CompilationScope>,
    symbol_table: Option<SymbolTable>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::new_with_state(SymbolTable::new_with_builtins(), Vec::new())
    }

    /// Resumes compilation against a symbol table and constant pool carried
    /// over from a previous call, the way a REPL keeps state between lines.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            scopes: vec![CompilationScope::new()],
            symbol_table: Some(symbol_table),
        }
    }

    pub fn bytecode(self) -> Bytecode {
        Bytecode {
            instructions: self.scopes.into_iter().next().unwrap().instructions,
            constants: self.constants,
        }
    }

    /// Like `bytecode`, but also hands back the symbol table and constant
    /// pool so the caller can resume with `new_with_state` later.
    pub fn into_bytecode_and_state(self) -> (Bytecode, SymbolTable, Vec<Value>) {
        let symbol_table = self.symbol_table.expect("symbol table always present");
        let instructions = self.scopes.into_iter().next().unwrap().instructions;
        let constants = self.constants;
        let bytecode = Bytecode {
            instructions,
            constants: constants.clone(),
        };
        (bytecode, symbol_table, constants)
    }

    pub fn compile_program(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        debug!(
            "compiler finished a program: {} byte(s) of instructions, {} constant(s)",
            self.current_instructions().len(),
            self.constants.len()
        );
        Ok(())
    }

    fn compile_block(&mut self, statements: &[Statement]) -> Result<(), CompileError> {
        for stmt in statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbol_table_mut().define(name);
                match symbol.scope {
                    Scope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
                    Scope::Local => self.emit(Opcode::SetLocal, &[symbol.index]),
                    Scope::Builtin => unreachable!("let never defines a builtin"),
                };
                Ok(())
            }
            Statement::Return { value } => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
                Ok(())
            }
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[]);
                Ok(())
            }
            Statement::Block(statements) => self.compile_block(statements),
        }
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::IntegerLiteral(value) => {
                let constant = self.add_constant(Value::Integer(*value));
                self.emit(Opcode::Constant, &[constant]);
                Ok(())
            }
            Expression::BooleanLiteral(true) => {
                self.emit(Opcode::True, &[]);
                Ok(())
            }
            Expression::BooleanLiteral(false) => {
                self.emit(Opcode::False, &[]);
                Ok(())
            }
            Expression::StringLiteral(value) => {
                let constant = self.add_constant(Value::new_string(value.clone()));
                self.emit(Opcode::Constant, &[constant]);
                Ok(())
            }
            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table()
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                match symbol.scope {
                    Scope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
                    Scope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
                    Scope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
                };
                Ok(())
            }
            Expression::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
                Ok(())
            }
            Expression::HashLiteral(pairs) => {
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
                Ok(())
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(Opcode::Bang, &[]),
                    "-" => self.emit(Opcode::Minus, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
                Ok(())
            }
            Expression::Infix { left, operator, right } => {
                // `a < b` is compiled as `b > a` so the VM only needs OpGreaterThan.
                if operator == "<" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Opcode::GreaterThan, &[]);
                    return Ok(());
                }
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator.as_str() {
                    "+" => self.emit(Opcode::Add, &[]),
                    "-" => self.emit(Opcode::Sub, &[]),
                    "*" => self.emit(Opcode::Mul, &[]),
                    "/" => self.emit(Opcode::Div, &[]),
                    ">" => self.emit(Opcode::GreaterThan, &[]),
                    "==" => self.emit(Opcode::Equal, &[]),
                    "!=" => self.emit(Opcode::NotEqual, &[]),
                    other => return Err(CompileError::UnknownOperator(other.to_string())),
                };
                Ok(())
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_deref()),
            Expression::FunctionLiteral { parameters, body } => {
                self.compile_function_literal(parameters, body)
            }
            Expression::Call { function, arguments } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
                Ok(())
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
                Ok(())
            }
        }
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &[Statement],
        alternative: Option<&[Statement]>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;

        let jump_not_truthy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        }

        let jump_pos = self.emit(Opcode::Jump, &[9999]);
        let after_consequence_pos = self.current_instructions().len();
        self.change_operand(jump_not_truthy_pos, after_consequence_pos);

        match alternative {
            Some(alternative) => {
                self.compile_block(alternative)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }
            }
            None => {
                self.emit(Opcode::Null, &[]);
            }
        }

        let after_alternative_pos = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative_pos);

        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        parameters: &[String],
        body: &[Statement],
    ) -> Result<(), CompileError> {
        self.enter_scope();

        for param in parameters {
            self.symbol_table_mut().define(param);
        }

        self.compile_block(body)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[]);
        }

        let num_locals = self.symbol_table().num_definitions();
        let instructions = self.leave_scope();

        let compiled = Value::CompiledFunction(Rc::new(CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        }));
        let constant = self.add_constant(compiled);
        self.emit(Opcode::Constant, &[constant]);
        Ok(())
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::new());
        let table = self.symbol_table.take().expect("symbol table always present");
        self.symbol_table = Some(table.push());
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("enter_scope/leave_scope imbalance");
        let table = self.symbol_table.take().expect("symbol table always present");
        self.symbol_table = Some(table.pop());
        scope.instructions
    }

    fn symbol_table(&self) -> &SymbolTable {
        self.symbol_table.as_ref().expect("symbol table always present")
    }

    fn symbol_table_mut(&mut self) -> &mut SymbolTable {
        self.symbol_table.as_mut().expect("symbol table always present")
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn current_scope(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("at least one scope")
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes.last().expect("at least one scope").instructions
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.current_instructions().len();
        self.current_scope().instructions.extend(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn set_last_instruction(&mut self, opcode: Opcode, position: usize) {
        let scope = self.current_scope();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        self.scopes
            .last()
            .and_then(|scope| scope.last_instruction)
            .is_some_and(|last| last.opcode == opcode)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope();
        let last = scope.last_instruction.expect("remove_last_pop requires a last instruction");
        scope.instructions.0.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_scope();
        let last = scope.last_instruction.expect("replace requires a last instruction");
        let new_instruction = make(Opcode::ReturnValue, &[]);
        scope.instructions.0[last.position..last.position + new_instruction.len()]
            .copy_from_slice(&new_instruction);
        scope.last_instruction = Some(EmittedInstruction {
            opcode: Opcode::ReturnValue,
            position: last.position,
        });
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let scope = self.current_scope();
        scope.instructions.0[position..position + new_instruction.len()]
            .copy_from_slice(new_instruction);
    }

    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = Opcode::from_byte(self.current_instructions().0[position])
            .expect("position must point at an opcode byte");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(position, &new_instruction);
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn compile(input: &str) -> Bytecode {
        let mut parser = Parser::new(Lexer::new(input));
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "parser errors: {:?}", parser.errors());
        let mut compiler = Compiler::new();
        compiler.compile_program(&program).expect("compile should succeed");
        compiler.bytecode()
    }

    fn concat(chunks: &[Vec<u8>]) -> Vec<u8> {
        chunks.iter().flatten().copied().collect()
    }

    #[test]
    fn integer_arithmetic() {
        let bytecode = compile("1 + 2");
        let expected = concat(&[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Add, &[]),
            make(Opcode::Pop, &[]),
        ]);
        assert_eq!(bytecode.instructions.0, expected);
        assert_eq!(bytecode.constants.len(), 2);
    }

    #[test]
    fn less_than_is_compiled_as_reversed_greater_than() {
        let bytecode = compile("1 < 2");
        let expected = concat(&[
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::GreaterThan, &[]),
            make(Opcode::Pop, &[]),
        ]);
        assert_eq!(bytecode.instructions.0, expected);
    }

    #[test]
    fn if_without_else_jumps_over_a_null_push() {
        let bytecode = compile("if (true) { 10 }; 3333;");
        let expected = concat(&[
            make(Opcode::True, &[]),
            make(Opcode::JumpNotTruthy, &[10]),
            make(Opcode::Constant, &[0]),
            make(Opcode::Jump, &[11]),
            make(Opcode::Null, &[]),
            make(Opcode::Pop, &[]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Pop, &[]),
        ]);
        assert_eq!(bytecode.instructions.0, expected);
    }

    #[test]
    fn globals_use_set_and_get_global() {
        let bytecode = compile("let one = 1; let two = 2;");
        let expected = concat(&[
            make(Opcode::Constant, &[0]),
            make(Opcode::SetGlobal, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::SetGlobal, &[1]),
        ]);
        assert_eq!(bytecode.instructions.0, expected);
    }

    #[test]
    fn undefined_variables_are_a_compile_error() {
        let mut parser = Parser::new(Lexer::new("foo;"));
        let program = parser.parse_program();
        let mut compiler = Compiler::new();
        let err = compiler.compile_program(&program).unwrap_err();
        assert_eq!(err, CompileError::UndefinedVariable("foo".to_string()));
    }

    #[test]
    fn function_literal_with_implicit_return_ends_in_return_value() {
        let bytecode = compile("fn() { 5 + 10 }");
        match &bytecode.constants[2] {
            Value::CompiledFunction(func) => {
                let expected = concat(&[
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Constant, &[1]),
                    make(Opcode::Add, &[]),
                    make(Opcode::ReturnValue, &[]),
                ]);
                assert_eq!(func.instructions.0, expected);
            }
            other => panic!("expected a compiled function constant, got {other:?}"),
        }
    }

    #[test]
    fn function_with_no_explicit_return_gets_an_implicit_return() {
        let bytecode = compile("fn() { }");
        match &bytecode.constants[0] {
            Value::CompiledFunction(func) => {
                assert_eq!(func.instructions.0, make(Opcode::Return, &[]));
            }
            other => panic!("expected a compiled function constant, got {other:?}"),
        }
    }

    #[test]
    fn local_bindings_use_local_opcodes_inside_a_function() {
        let bytecode = compile("fn() { let num = 55; num }");
        match bytecode.constants.last().unwrap() {
            Value::CompiledFunction(func) => {
                let expected = concat(&[
                    make(Opcode::Constant, &[0]),
                    make(Opcode::SetLocal, &[0]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::ReturnValue, &[]),
                ]);
                assert_eq!(func.instructions.0, expected);
                assert_eq!(func.num_locals, 1);
                assert_eq!(func.num_parameters, 0);
            }
            other => panic!("expected a compiled function constant, got {other:?}"),
        }
    }

    #[test]
    fn builtins_resolve_to_get_builtin() {
        let bytecode = compile("len([1, 2, 3]);");
        assert!(bytecode.instructions.0.contains(&(Opcode::GetBuiltin as u8)));
    }
}
