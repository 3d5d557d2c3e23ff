#![forbid(unsafe_code)]

//! wcff: WannaCry leftover file finder CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("wcff: {e}");
        std::process::exit(e.exit_code());
    }
}
