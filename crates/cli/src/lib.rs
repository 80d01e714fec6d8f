pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "reimburse",
    about = "Reimbursement tracker operator CLI",
    long_about = "Apply migrations, inspect effective configuration, and run the retention sweep.",
    after_help = "Examples:\n  reimburse migrate\n  reimburse config --config ./reimburse.toml\n  reimburse purge"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a reimburse.toml file (must exist when given)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run one retention sweep: purge attachment content and expired deletions")]
    Purge,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(config_path),
        Command::Config => commands::config::run(config_path),
        Command::Purge => commands::purge::run(config_path),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
