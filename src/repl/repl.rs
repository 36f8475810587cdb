//! The `monkey` binary's two modes: an interactive `rustyline` prompt and a
//! one-shot file runner.

use std::cell::RefCell;
use std::fs::File;
use std::io::Read as _;
use std::rc::Rc;

use anyhow::Context;
use clap::{Parser as ClapParser, ValueEnum};
use encoding_rs::UTF_8;
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::{debug, trace};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::compiler::{Compiler, SymbolTable};
use crate::environment::Environment;
use crate::eval::eval_program;
use crate::lexer::Lexer;
use crate::object::Value;
use crate::parser::Parser;
use crate::vm::Vm;

const PROMPT: &str = ">> ";

/// Exit code for a script that failed to parse.
pub const EXIT_PARSE_ERROR: i32 = 65;
/// Exit code for a script that parsed but failed to compile or run.
pub const EXIT_RUNTIME_ERROR: i32 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Tree-walking evaluator.
    Eval,
    /// Compile to bytecode and run it on the VM.
    Vm,
}

#[derive(Debug, ClapParser)]
#[command(name = "monkey", about = "A lexer, Pratt parser, evaluator, and bytecode VM for Monkey")]
pub struct Cli {
    /// Script to run. With no path, starts an interactive prompt.
    pub script: Option<String>,

    /// Which engine runs the program.
    #[arg(long, value_enum, default_value_t = Engine::Vm)]
    pub engine: Engine,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(cli: Cli) -> i32 {
    match cli.script {
        Some(path) => run_file(&path, cli.engine),
        None => {
            run_prompt(cli.engine);
            0
        }
    }
}

fn decode_source(path: &str) -> anyhow::Result<String> {
    let file = File::open(path).with_context(|| format!("could not open {path}"))?;
    let mut decoder = DecodeReaderBytesBuilder::new().encoding(Some(UTF_8)).build(file);
    let mut source = String::new();
    decoder
        .read_to_string(&mut source)
        .with_context(|| format!("could not decode {path} as UTF-8"))?;
    Ok(source)
}

fn run_file(path: &str, engine: Engine) -> i32 {
    let source = match decode_source(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("could not read {path}: {err}");
            return EXIT_RUNTIME_ERROR;
        }
    };

    let mut parser = Parser::new(Lexer::new(&source));
    let program = parser.parse_program();
    if !parser.errors().is_empty() {
        print_parse_errors(parser.errors());
        return EXIT_PARSE_ERROR;
    }

    match engine {
        Engine::Eval => {
            let env = Environment::new();
            match eval_program(&program, &env) {
                Value::Error(message) => {
                    eprintln!("{message}");
                    EXIT_RUNTIME_ERROR
                }
                _ => 0,
            }
        }
        Engine::Vm => {
            let mut compiler = Compiler::new();
            if let Err(err) = compiler.compile_program(&program) {
                eprintln!("Woops! Compilation failed:\n {err}");
                return EXIT_RUNTIME_ERROR;
            }
            let mut vm = Vm::new(compiler.bytecode());
            if let Err(err) = vm.run() {
                eprintln!("Woops! Executing bytecode failed:\n {err}");
                return EXIT_RUNTIME_ERROR;
            }
            0
        }
    }
}

fn run_prompt(engine: Engine) {
    let mut editor = DefaultEditor::new().expect("failed to initialize the line editor");
    let env = Environment::new();
    let mut globals: Option<Vec<Value>> = None;
    let mut compiler_state: Option<(SymbolTable, Vec<Value>)> = None;

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let _ = editor.add_history_entry(&line);
                run_line(&line, engine, &env, &mut globals, &mut compiler_state);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
}

fn run_line(
    line: &str,
    engine: Engine,
    env: &Rc<RefCell<Environment>>,
    globals: &mut Option<Vec<Value>>,
    compiler_state: &mut Option<(SymbolTable, Vec<Value>)>,
) {
    let mut parser = Parser::new(Lexer::new(line));
    let program = parser.parse_program();
    trace!("parsed {} statement(s)", program.statements.len());
    if !parser.errors().is_empty() {
        print_parse_errors(parser.errors());
        return;
    }

    match engine {
        Engine::Eval => {
            let result = eval_program(&program, env);
            println!("{result}");
        }
        Engine::Vm => {
            let (symbol_table, constants) = compiler_state
                .take()
                .unwrap_or_else(|| (SymbolTable::new_with_builtins(), Vec::new()));
            let mut compiler = Compiler::new_with_state(symbol_table, constants);
            let compile_result = compiler.compile_program(&program);
            let (bytecode, symbol_table, constants) = compiler.into_bytecode_and_state();
            *compiler_state = Some((symbol_table, constants));
            if let Err(err) = compile_result {
                println!("Woops! Compilation failed:\n {err}");
                return;
            }

            let previous_globals = globals.take().unwrap_or_default();
            let mut vm = Vm::new_with_globals(bytecode, previous_globals);
            if let Err(err) = vm.run() {
                println!("Woops! Executing bytecode failed:\n {err}");
                return;
            }
            debug!("vm executed one prompt line");
            println!("{}", vm.stack_top());
            *globals = Some(vm.into_globals());
        }
    }
}

fn print_parse_errors(errors: &[String]) {
    println!("Woops! We ran into some monkey business here!");
    println!(" parser errors:");
    for err in errors {
        println!("\t{err}");
    }
}
