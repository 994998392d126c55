mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mongodict",
    version,
    about = "Query and check read-only MongoDB lookup tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up keys and print `key<TAB>value` for each hit
    Query {
        /// Path to the table configuration file
        config: PathBuf,
        /// Keys to look up
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Validate table configuration and server connectivity
    Check {
        /// Path to the table configuration file
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Query { config, keys } => commands::query::execute(&config, &keys),
        Commands::Check { config } => commands::check::execute(&config),
    }
}
