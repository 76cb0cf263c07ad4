mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { db, household } => cli::init::run(&db, &household),
        Commands::Parse {
            file,
            year,
            month,
            closing_day,
            json,
        } => cli::parse::run(&file, year, month, closing_day, json),
        Commands::Recurring { db, months_ahead } => cli::recurring::run(&db, months_ahead),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
