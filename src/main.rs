//! sophidoc CLI entry point.

use clap::Parser;
use sophidoc::cli::{self, Cli, Commands, EXIT_ERROR};

fn main() {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose);
    sophidoc::init();

    let config = cli.config.as_deref();
    let result = match &cli.command {
        Commands::Diagnose(args) => cli::run_diagnose(args, config),
        Commands::Scan(args) => cli::run_scan(args, config),
        Commands::Config(args) => cli::run_config(args, config),
        Commands::Cache(args) => cli::run_cache(args, config),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
