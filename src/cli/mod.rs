pub mod init;
pub mod parse;
pub mod recurring;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "parcela",
    about = "Statement import, installment scheduling and deduplication for household finances."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or refresh the database schema and seed a household.
    Init {
        /// Path to the SQLite database
        #[arg(long, default_value = "parcela.db")]
        db: String,
        /// Household name to bootstrap
        #[arg(long, default_value = "Casa")]
        household: String,
    },
    /// Parse a raw statement text file and print the recognized items.
    Parse {
        /// Path to the statement text file
        #[arg(long)]
        file: String,
        /// Statement year
        #[arg(long)]
        year: i32,
        /// Statement month (1-12)
        #[arg(long)]
        month: u32,
        /// Card closing day
        #[arg(long, default_value_t = 25)]
        closing_day: u32,
        /// Emit items as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Generate upcoming instances for all active recurring rules.
    Recurring {
        /// Path to the SQLite database
        #[arg(long, default_value = "parcela.db")]
        db: String,
        /// How many months ahead to materialize
        #[arg(long, default_value_t = 2)]
        months_ahead: u32,
    },
}
