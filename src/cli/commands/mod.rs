pub mod auth;
pub mod envs;
pub mod fetch;
pub mod status;
pub mod tables;

use colored::*;
use financeos_cli::api::{ApiFailure, AuthRequired};

/// Print an authentication-required payload, as JSON or as numbered steps
pub(crate) fn print_auth_required(payload: &AuthRequired, as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(payload) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{{\"error\": \"authentication_required\"}}"),
        }
        return;
    }

    eprintln!();
    eprintln!("  {} {}", "✗".bright_red().bold(), payload.message.red());
    eprintln!("    {}: {}", "Login URL".dimmed(), payload.login_url.cyan());
    for step in &payload.instructions {
        eprintln!("    {}", step);
    }
    eprintln!();
}

/// Report an API failure and turn it into a command error
pub(crate) fn api_failure(failure: ApiFailure, as_json: bool) -> anyhow::Error {
    match failure {
        ApiFailure::AuthRequired(payload) => {
            print_auth_required(&payload, as_json);
            anyhow::anyhow!("authentication required for environment '{}'", payload.environment)
        }
        other => {
            if as_json {
                println!("{}", other.to_json());
            }
            anyhow::Error::new(other)
        }
    }
}
