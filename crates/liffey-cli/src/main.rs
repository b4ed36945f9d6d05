#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "liffey")]
#[command(author, version, about = "A module bundler with persistent caching, code splitting and a dev server", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted logs (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Path to the config file (defaults to liffey.config.json in cwd)
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Build the project once
    Build,

    /// Start the dev server: watch, rebuild and push updates
    Dev {
        /// Port to listen on (overrides the config)
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Host to bind to (overrides the config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Build an entry as an external library plus its link manifest
    Library {
        /// Entry name from the config to build as a library
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    let config_path = cli
        .config
        .map(|p| if p.is_absolute() { p } else { cwd.join(p) })
        .unwrap_or_else(|| cwd.join(liffey_core::CONFIG_FILE));

    match cli.command {
        Commands::Build => commands::build::run(&config_path),
        Commands::Dev { port, host } => {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(commands::dev::run(&config_path, port, host))
        }
        Commands::Library { name } => commands::library::run(&config_path, &name),
    }
}
