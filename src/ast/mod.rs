mod ast;

pub use ast::{Expression, Program, Statement};
