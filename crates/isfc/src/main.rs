mod cli;
mod config;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();
    let options = config::load_options(cli.config.as_deref())?;

    match cli.command {
        Command::Compile(args) => run::compile(args, options),
        Command::Check(args) => run::check(args, options),
        Command::Layout(args) => run::layout(args, options),
    }
}
