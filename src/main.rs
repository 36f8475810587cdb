use clap::Parser as ClapParser;
use monkey::repl::{self, Cli};

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(repl::run(cli));
}
