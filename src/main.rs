use anyhow::Result;
use clap::Parser;
use colored::*;
use log::info;
use std::process::ExitCode;

mod cli;

use cli::{Cli, Commands};
use cli::commands::{auth, envs, fetch, status, tables};
use financeos_cli::api::ClientManager;

fn init_logging() {
    // Log to a file in the config directory (truncate on each run), stderr if that fails
    let log_file = financeos_cli::config::log_file_path().and_then(|path| {
        Ok(std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?)
    });

    let mut builder = env_logger::Builder::from_default_env();
    if let Ok(file) = log_file {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut manager = ClientManager::from_env()?;

    match cli.command {
        Commands::Auth(args) => auth::auth_command(&mut manager, args).await,
        Commands::Status(args) => status::status_command(&manager, args).await,
        Commands::Envs => envs::envs_command(&manager),
        Commands::Tables(args) => tables::tables_command(&manager, args).await,
        Commands::Fetch(args) => fetch::fetch_command(&manager, args).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    info!("Starting financeos-cli");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
