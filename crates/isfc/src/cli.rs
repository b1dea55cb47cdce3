use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "isfc",
    author,
    version,
    about = "Compiles ISF shader effects to WGSL"
)]
pub struct Cli {
    /// Compiler options TOML. Defaults to `isfc.toml` in `$ISFC_CONFIG_DIR`
    /// or the platform config directory.
    #[arg(long, global = true, value_name = "FILE", env = "ISFC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile ISF files to `<stem>.frag.wgsl`, `<stem>.vert.wgsl` and `<stem>.layout.json`.
    Compile(CompileArgs),
    /// Compile every `.fs` file under the given paths and report one line per unit.
    Check(CheckArgs),
    /// Print the uniform and binding layout of one ISF file as JSON.
    Layout(LayoutArgs),
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Directory for the generated files; defaults to each input's directory.
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Fail when a unit compiles with warnings.
    #[arg(long)]
    pub deny_warnings: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Files or directories; directories are searched recursively.
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LayoutArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}
