use super::commands::auth::AuthArgs;
use super::commands::fetch::FetchArgs;
use super::commands::status::StatusArgs;
use super::commands::tables::TablesArgs;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "financeos-cli")]
#[command(about = "Manage Finance OS sessions and pull table data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store, switch or remove session credentials
    Auth(AuthArgs),
    /// Check authentication and configuration status
    Status(StatusArgs),
    /// List available environments
    Envs,
    /// List tables in an environment
    Tables(TablesArgs),
    /// Fetch every row of a table, page by page
    Fetch(FetchArgs),
}
