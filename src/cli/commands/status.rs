//! `status`: authentication state of one or all environments

use crate::cli::ui::{echo_error, echo_info, echo_success, echo_warning, heading};
use anyhow::Result;
use clap::Args;
use financeos_cli::api::ClientManager;
use financeos_cli::auth::{AuthKind, Authenticator};
use serde_json::json;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Environment to check (defaults to the active one)
    #[arg(long, short)]
    pub env: Option<String>,
    /// Output status as JSON
    #[arg(long)]
    pub json: bool,
    /// Show status for all environments
    #[arg(long, conflicts_with = "env")]
    pub all: bool,
}

pub async fn status_command(manager: &ClientManager, args: StatusArgs) -> Result<()> {
    if args.all {
        return status_all(manager, args.json).await;
    }

    let name = manager.resolve_name(args.env.as_deref());
    let environment = manager.registry().require(&name)?;
    let client = manager.client(Some(&name)).await?;
    let auth = client.auth();

    let authenticated = auth.is_authenticated().await;
    let token_info = auth.token_info().await;
    let keyring_available = manager.keyring_available().await?;
    let is_active = name == manager.active_environment();
    let source = match auth.kind() {
        AuthKind::Session => "stored session",
        AuthKind::Env => "environment variables",
    };

    if args.json {
        let status = json!({
            "authenticated": authenticated,
            "environment": name,
            "environment_display": environment.display_name,
            "environment_url": environment.base_url,
            "is_active": is_active,
            "credential_source": source,
            "keyring_available": keyring_available,
            "token_info": token_info,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    heading("Finance OS Status");

    if authenticated {
        echo_success("Authenticated");
        echo_info(&format!("Environment: {}", environment.display_name));
        echo_info(&format!("URL: {}", environment.base_url));
        echo_info(&format!("Credentials: {}", source));

        if token_info.has_access_token {
            if token_info.access_expires_in > 0 {
                echo_info(&format!("Access token expires in: {}s", token_info.access_expires_in));
            } else {
                echo_warning("Access token expired (will auto-refresh)");
            }
        }
    } else {
        echo_error("Not authenticated");
        echo_info(&format!("Environment: {}", environment.display_name));
        echo_info(&format!("Run 'financeos-cli auth --env {}' to authenticate", name));
    }

    println!();
    if keyring_available {
        echo_success("Keyring available (credentials stored securely)");
    } else {
        echo_warning("Keyring not available (using fallback storage)");
    }

    Ok(())
}

async fn status_all(manager: &ClientManager, as_json: bool) -> Result<()> {
    let statuses = manager.authenticated_environments().await?;
    let keyring_available = manager.keyring_available().await?;

    if as_json {
        let status = json!({
            "active_environment": manager.active_environment(),
            "environments": statuses,
            "keyring_available": keyring_available,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    heading("Finance OS Status (All Environments)");

    for env in &statuses {
        let active = if env.is_active { " (active)" } else { "" };
        if env.authenticated {
            echo_success(&format!("{}{}", env.display_name, active));
        } else {
            echo_error(&format!("{}{} - not authenticated", env.display_name, active));
        }
        echo_info(&format!("  Name: {}", env.name));
        echo_info(&format!("  URL: {}", env.base_url));
        println!();
    }

    let authenticated = statuses.iter().filter(|e| e.authenticated).count();
    echo_info(&format!(
        "Summary: {}/{} environments authenticated",
        authenticated,
        statuses.len()
    ));
    Ok(())
}
