use clap::Parser;
use stratledger::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
