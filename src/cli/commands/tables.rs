use super::api_failure;
use crate::cli::ui::{heading, with_spinner};
use anyhow::Result;
use clap::Args;
use colored::*;
use financeos_cli::api::ClientManager;
use serde_json::Value;

#[derive(Args, Debug)]
pub struct TablesArgs {
    /// Environment to query (defaults to the active one)
    #[arg(long, short)]
    pub env: Option<String>,
    /// Print the raw JSON payload
    #[arg(long)]
    pub json: bool,
}

pub async fn tables_command(manager: &ClientManager, args: TablesArgs) -> Result<()> {
    let client = manager.client(args.env.as_deref()).await?;

    let tables = with_spinner("Listing tables...", client.list_tables())
        .await
        .map_err(|e| api_failure(e, args.json))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    heading(&format!("Tables in {}", client.environment().display_name));

    let Some(list) = tables.as_array() else {
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    };

    for table in list {
        let id = field_text(table, "id");
        let name = ["alias", "name"]
            .iter()
            .map(|key| field_text(table, key))
            .find(|text| !text.is_empty())
            .unwrap_or_default();
        println!("  {:>8}  {}", id.bright_white().bold(), name);
    }

    println!();
    println!("  {} {}", list.len().to_string().bright_green().bold(), "tables".dimmed());
    Ok(())
}

fn field_text(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
