mod repl;

pub use repl::{run, Cli, Engine, EXIT_PARSE_ERROR, EXIT_RUNTIME_ERROR};
