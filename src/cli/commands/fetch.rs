//! `fetch`: pull every row of a table and write it as JSON or CSV

use super::print_auth_required;
use crate::cli::ui::with_spinner;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::*;
use financeos_cli::api::{ClientManager, FetchConfig, Filter, StopReason, fetch_all};
use financeos_cli::auth::Authenticator;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Table ID
    pub table_id: String,
    /// Environment to query (defaults to the active one)
    #[arg(long, short)]
    pub env: Option<String>,
    /// Keep rows where a field has one of the values: name=v1,v2
    #[arg(long, value_name = "NAME=VALUES")]
    pub filter: Vec<String>,
    /// Drop rows where a field has one of the values: name=v1,v2
    #[arg(long, value_name = "NAME=VALUES")]
    pub exclude: Vec<String>,
    /// Stop after this many rows
    #[arg(long)]
    pub max_rows: Option<usize>,
    /// Rows per request (at most 500)
    #[arg(long)]
    pub page_size: Option<usize>,
    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,
    /// Write to a file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl FetchArgs {
    fn filters(&self) -> Result<Vec<Filter>> {
        let included = self.filter.iter().map(|arg| Filter::parse(arg, false));
        let excluded = self.exclude.iter().map(|arg| Filter::parse(arg, true));
        included.chain(excluded).collect()
    }

    fn config(&self) -> FetchConfig {
        let mut builder = FetchConfig::builder();
        if let Some(max_rows) = self.max_rows {
            builder = builder.max_rows(max_rows);
        }
        if let Some(page_size) = self.page_size {
            builder = builder.page_size(page_size);
        }
        builder.build()
    }
}

pub async fn fetch_command(manager: &ClientManager, args: FetchArgs) -> Result<()> {
    let filters = args.filters()?;
    let config = args.config();
    let client = manager.client(args.env.as_deref()).await?;

    if !client.auth().is_authenticated().await {
        print_auth_required(&client.auth().auth_required(), false);
        anyhow::bail!("authentication required for environment '{}'", client.environment().name);
    }

    let report = with_spinner(
        format!("Fetching rows from table {}...", args.table_id),
        fetch_all(&*client, &args.table_id, &filters, &config),
    )
    .await;

    if report.stop == StopReason::AuthRequired {
        print_auth_required(&client.auth().auth_required(), false);
        anyhow::bail!("authentication required for environment '{}'", client.environment().name);
    }

    match &args.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
            write_rows(&report.rows, args.format, BufWriter::new(file))?;
        }
        None => write_rows(&report.rows, args.format, io::stdout().lock())?,
    }

    eprintln!(
        "  {} Fetched {} rows in {} requests ({})",
        if report.is_complete() { "✓".bright_green().bold() } else { "⚠".bright_yellow().bold() },
        report.rows.len().to_string().bright_white().bold(),
        report.requests,
        report.stop
    );
    if let Some(path) = &args.output {
        eprintln!("    {}: {}", "Written to".dimmed(), path.display().to_string().cyan());
    }
    if !report.issues.is_empty() {
        eprintln!("    {} {}", report.issues.len(), "issues encountered, see the log file".dimmed());
    }

    if !report.is_complete() {
        anyhow::bail!("fetch stopped early: {}", report.stop);
    }
    Ok(())
}

fn write_rows<W: Write>(rows: &[Value], format: OutputFormat, mut writer: W) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, rows)?;
            writeln!(writer)?;
        }
        OutputFormat::Csv => write_csv(rows, &mut writer)?,
    }
    writer.flush()?;
    Ok(())
}

/// Columns are the union of row keys in first-seen order
fn write_csv<W: Write>(rows: &[Value], writer: W) -> Result<()> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        if let Some(object) = row.as_object() {
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut csv_writer = csv::Writer::from_writer(writer);
    if columns.is_empty() {
        csv_writer.flush()?;
        return Ok(());
    }

    csv_writer.write_record(&columns)?;
    for row in rows {
        let record: Vec<String> = columns.iter().map(|column| cell_text(row.get(column))).collect();
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_uses_union_of_columns() {
        let rows = vec![
            json!({"Account": "Cash", "Amount": 10.5}),
            json!({"Account": "Revenue, Net", "Region": "EMEA", "Amount": null}),
        ];

        let mut out = Vec::new();
        write_csv(&rows, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Account,Amount,Region");
        assert_eq!(lines[1], "Cash,10.5,");
        assert_eq!(lines[2], "\"Revenue, Net\",,EMEA");
    }

    #[test]
    fn test_csv_with_no_rows_is_empty() {
        let mut out = Vec::new();
        write_csv(&[], &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_filters_from_args() {
        let args = FetchArgs {
            table_id: "1".to_string(),
            env: None,
            filter: vec!["Scenario=Actuals".to_string()],
            exclude: vec!["Account=Cash,Bank".to_string()],
            max_rows: Some(10),
            page_size: Some(900),
            format: OutputFormat::Json,
            output: None,
        };

        let filters = args.filters().unwrap();
        assert_eq!(filters.len(), 2);
        assert!(!filters[0].is_excluded);
        assert!(filters[1].is_excluded);
        assert_eq!(filters[1].values.len(), 2);

        let config = args.config();
        assert_eq!(config.max_rows, 10);
        assert_eq!(config.page_size, 500);
    }
}
