use std::process::ExitCode;

use clap::Parser;
use editgate::cli::{AppContext, Cli};
use editgate::commands::{self, EXIT_FAILURE};
use editgate::infra::logging;
use owo_colors::OwoColorize;

fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(cli.verbose, cli.no_color);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        json: cli.json,
    };

    match commands::run(cli, &ctx) {
        Ok(code) => code,
        Err(e) => {
            if ctx.no_color {
                eprintln!("error: {e:#}");
            } else {
                eprintln!("{} {e:#}", "error:".red().bold());
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
