//! The tree-walking evaluator: `eval(node, env) -> Value`.
//!
//! `Program` unwraps a trailing `ReturnWrapper`; `Block` does not, so a
//! `return` inside nested blocks bubbles all the way up to the function
//! boundary where `apply_function` unwraps it. Every composite node checks
//! each sub-result for `Value::Error` and returns it unchanged, which is
//! what gives Monkey its short-circuiting error propagation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Expression, Program, Statement};
use crate::environment::Environment;
use crate::object::{lookup_builtin, Closure, Value};

pub fn eval_program(program: &Program, env: &Rc<RefCell<Environment>>) -> Value {
    let mut result = Value::Null;
    for stmt in &program.statements {
        result = eval_statement(stmt, env);
        match result {
            Value::ReturnWrapper(inner) => return *inner,
            Value::Error(_) => return result,
            _ => {}
        }
    }
    result
}

fn eval_block(statements: &[Statement], env: &Rc<RefCell<Environment>>) -> Value {
    let mut result = Value::Null;
    for stmt in statements {
        result = eval_statement(stmt, env);
        if matches!(result, Value::ReturnWrapper(_) | Value::Error(_)) {
            return result;
        }
    }
    result
}

fn eval_statement(stmt: &Statement, env: &Rc<RefCell<Environment>>) -> Value {
    match stmt {
        Statement::Let { name, value } => {
            let evaluated = eval_expression(value, env);
            if evaluated.is_error() {
                return evaluated;
            }
            env.borrow_mut().set(name.clone(), evaluated);
            Value::Null
        }
        Statement::Return { value } => {
            let evaluated = eval_expression(value, env);
            if evaluated.is_error() {
                return evaluated;
            }
            Value::ReturnWrapper(Box::new(evaluated))
        }
        Statement::Expression(expr) => eval_expression(expr, env),
        Statement::Block(statements) => eval_block(statements, env),
    }
}

fn eval_expression(expr: &Expression, env: &Rc<RefCell<Environment>>) -> Value {
    match expr {
        Expression::IntegerLiteral(value) => Value::Integer(*value),
        Expression::BooleanLiteral(value) => native_bool(*value),
        Expression::StringLiteral(value) => Value::new_string(value.clone()),
        Expression::Identifier(name) => eval_identifier(name, env),
        Expression::Prefix { operator, right } => {
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_prefix_expression(operator, right)
        }
        Expression::Infix {
            left,
            operator,
            right,
        } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_infix_expression(operator, left, right)
        }
        Expression::If {
            condition,
            consequence,
            alternative,
        } => eval_if_expression(condition, consequence, alternative, env),
        Expression::FunctionLiteral { parameters, body } => {
            Value::Function(Rc::new(Closure {
                parameters: parameters.clone(),
                body: body.clone(),
                env: env.clone(),
            }))
        }
        Expression::Call { function, arguments } => {
            let func = eval_expression(function, env);
            if func.is_error() {
                return func;
            }
            let args = match eval_expressions(arguments, env) {
                Ok(values) => values,
                Err(err) => return err,
            };
            apply_function(func, args)
        }
        Expression::ArrayLiteral(elements) => match eval_expressions(elements, env) {
            Ok(values) => Value::Array(values),
            Err(err) => err,
        },
        Expression::HashLiteral(pairs) => eval_hash_literal(pairs, env),
        Expression::Index { left, index } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let index = eval_expression(index, env);
            if index.is_error() {
                return index;
            }
            eval_index_expression(left, index)
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

fn eval_identifier(name: &str, env: &Rc<RefCell<Environment>>) -> Value {
    if let Some(value) = env.borrow().get(name) {
        return value;
    }
    if let Some(builtin) = lookup_builtin(name) {
        return builtin;
    }
    Value::Error(format!("identifier not found: {name}"))
}

fn eval_prefix_expression(operator: &str, right: Value) -> Value {
    match operator {
        "!" => native_bool(!right.is_truthy()),
        "-" => match right {
            Value::Integer(i) => Value::Integer(-i),
            other => Value::Error(format!("unknown operator: -{}", other.type_name())),
        },
        _ => Value::Error(format!("unknown operator: {operator}{}", right.type_name())),
    }
}

fn eval_infix_expression(operator: &str, left: Value, right: Value) -> Value {
    match (&left, &right) {
        (Value::Integer(l), Value::Integer(r)) => eval_integer_infix(operator, *l, *r),
        (Value::Boolean(l), Value::Boolean(r)) => match operator {
            "==" => native_bool(l == r),
            "!=" => native_bool(l != r),
            _ => Value::Error(format!(
                "unknown operator: {} {operator} {}",
                left.type_name(),
                right.type_name()
            )),
        },
        (Value::String(l), Value::String(r)) => {
            if operator == "+" {
                Value::new_string(format!("{l}{r}"))
            } else {
                Value::Error(format!(
                    "unknown operator: {} {operator} {}",
                    left.type_name(),
                    right.type_name()
                ))
            }
        }
        _ if left.type_name() != right.type_name() => Value::Error(format!(
            "type mismatch: {} {operator} {}",
            left.type_name(),
            right.type_name()
        )),
        _ => Value::Error(format!(
            "unknown operator: {} {operator} {}",
            left.type_name(),
            right.type_name()
        )),
    }
}

fn eval_integer_infix(operator: &str, left: i64, right: i64) -> Value {
    match operator {
        "+" => Value::Integer(left + right),
        "-" => Value::Integer(left - right),
        "*" => Value::Integer(left * right),
        "/" => Value::Integer(left / right),
        "<" => native_bool(left < right),
        ">" => native_bool(left > right),
        "==" => native_bool(left == right),
        "!=" => native_bool(left != right),
        _ => Value::Error(format!("unknown operator: INTEGER {operator} INTEGER")),
    }
}

fn eval_if_expression(
    condition: &Expression,
    consequence: &[Statement],
    alternative: &Option<Vec<Statement>>,
    env: &Rc<RefCell<Environment>>,
) -> Value {
    let condition = eval_expression(condition, env);
    if condition.is_error() {
        return condition;
    }

    if condition.is_truthy() {
        eval_block(consequence, env)
    } else if let Some(alternative) = alternative {
        eval_block(alternative, env)
    } else {
        Value::Null
    }
}

/// Evaluates left-to-right, short-circuiting on the first error.
fn eval_expressions(
    exprs: &[Expression],
    env: &Rc<RefCell<Environment>>,
) -> Result<Vec<Value>, Value> {
    let mut values = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let value = eval_expression(expr, env);
        if value.is_error() {
            return Err(value);
        }
        values.push(value);
    }
    Ok(values)
}

fn eval_hash_literal(pairs: &[(Expression, Expression)], env: &Rc<RefCell<Environment>>) -> Value {
    let mut entries = HashMap::new();
    for (key_expr, value_expr) in pairs {
        let key = eval_expression(key_expr, env);
        if key.is_error() {
            return key;
        }
        let hash_key = match key.hash_key() {
            Some(hk) => hk,
            None => return Value::Error(format!("unusable as hash key: {}", key.type_name())),
        };
        let value = eval_expression(value_expr, env);
        if value.is_error() {
            return value;
        }
        entries.insert(hash_key, (key, value));
    }
    Value::Hash(entries)
}

fn eval_index_expression(left: Value, index: Value) -> Value {
    match (&left, &index) {
        (Value::Array(elements), Value::Integer(i)) => {
            if *i < 0 || *i as usize >= elements.len() {
                Value::Null
            } else {
                elements[*i as usize].clone()
            }
        }
        (Value::Hash(entries), _) => match index.hash_key() {
            Some(hash_key) => entries
                .get(&hash_key)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null),
            None => Value::Error(format!("unusable as hash key: {}", index.type_name())),
        },
        _ => Value::Error(format!("index operator not supported: {}", left.type_name())),
    }
}

/// Binds each argument positionally in a new environment chained to the
/// function's closure, evaluates the body, and unwraps a trailing
/// `ReturnWrapper`. Builtins are invoked directly with the argument slice.
fn apply_function(func: Value, args: Vec<Value>) -> Value {
    match func {
        Value::Function(function) => {
            if function.parameters.len() != args.len() {
                return Value::Error(format!(
                    "wrong number of arguments. got={}, want={}",
                    args.len(),
                    function.parameters.len()
                ));
            }

            let call_env = Environment::new_enclosed(function.env.clone());
            for (param, arg) in function.parameters.iter().zip(args) {
                call_env.borrow_mut().set(param.clone(), arg);
            }

            match eval_block(&function.body, &call_env) {
                Value::ReturnWrapper(inner) => *inner,
                other => other,
            }
        }
        Value::Builtin(builtin) => builtin(&args),
        other => Value::Error(format!("not a function: {}", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn eval_input(input: &str) -> Value {
        let mut parser = Parser::new(Lexer::new(input));
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "parser errors: {:?}", parser.errors());
        let env = Environment::new();
        eval_program(&program, &env)
    }

    #[test]
    fn integer_arithmetic() {
        let cases = [
            ("5 + 5 + 5 + 5 - 10", 10),
            ("2 * 2 * 2 * 2 * 2", 32),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
        ];
        for (input, expected) in cases {
            match eval_input(input) {
                Value::Integer(i) => assert_eq!(i, expected, "input: {input}"),
                other => panic!("expected integer for {input}, got {other:?}"),
            }
        }
    }

    #[test]
    fn boolean_and_bang_operators() {
        assert!(matches!(eval_input("(1 < 2) == true"), Value::Boolean(true)));
        assert!(matches!(eval_input("!!5"), Value::Boolean(true)));
        assert!(matches!(eval_input("!5"), Value::Boolean(false)));
    }

    #[test]
    fn functions_and_closures() {
        let input = "let add = fn(x, y) { x + y; }; add(5, 5);";
        assert!(matches!(eval_input(input), Value::Integer(10)));

        let adder = "let newAdder = fn(x) { fn(y) { x + y }; }; let addTwo = newAdder(2); addTwo(3);";
        assert!(matches!(eval_input(adder), Value::Integer(5)));
    }

    #[test]
    fn error_handling() {
        match eval_input("5 + true;") {
            Value::Error(msg) => assert_eq!(msg, "type mismatch: INTEGER + BOOLEAN"),
            other => panic!("expected error, got {other:?}"),
        }

        match eval_input("foobar;") {
            Value::Error(msg) => assert_eq!(msg, "identifier not found: foobar"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn builtins_len_first_last_rest_push() {
        assert!(matches!(eval_input(r#"len("hello")"#), Value::Integer(5)));
        let push_case = "let a = [1, 2, 3]; push(a, 4); len(a);";
        assert!(matches!(eval_input(push_case), Value::Integer(3)));
    }

    #[test]
    fn array_and_hash_indexing() {
        assert!(matches!(eval_input("[1, 2, 3][1]"), Value::Integer(2)));
        assert!(matches!(eval_input("[1, 2, 3][10]"), Value::Null));

        let hash_case = r#"let h = {"one": 1}; h["one"]"#;
        assert!(matches!(eval_input(hash_case), Value::Integer(1)));
    }

    #[test]
    fn return_unwinds_through_nested_blocks() {
        let input = "if (10 > 1) { if (10 > 1) { return 10; } return 1; }";
        assert!(matches!(eval_input(input), Value::Integer(10)));
    }
}
