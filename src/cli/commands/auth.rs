//! `auth`: store, list, switch and remove session credentials

use crate::cli::ui::{echo_error, echo_info, echo_success, echo_warning, heading, with_spinner};
use anyhow::Result;
use clap::Args;
use colored::*;
use dialoguer::{Confirm, Password};
use financeos_cli::api::{AuthRequired, ClientManager, Environment, SessionCredential};
use financeos_cli::auth::{Authenticator, browser};
use financeos_cli::config::{Selection, StorageLocation};

#[derive(Args, Debug)]
pub struct AuthArgs {
    /// Environment to authenticate (defaults to the active one)
    #[arg(long, short)]
    pub env: Option<String>,
    /// Skip the browser cookie search and enter the sessionid and csrftoken cookies by hand
    #[arg(long)]
    pub manual: bool,
    /// List all environments with their authentication status
    #[arg(long, conflicts_with_all = ["switch", "logout", "logout_all"])]
    pub list: bool,
    /// Switch the active environment
    #[arg(long, value_name = "ENV", conflicts_with_all = ["logout", "logout_all"])]
    pub switch: Option<String>,
    /// Clear stored credentials for one environment
    #[arg(long, value_name = "ENV", conflicts_with = "logout_all")]
    pub logout: Option<String>,
    /// Clear stored credentials for every environment
    #[arg(long)]
    pub logout_all: bool,
    /// Answer yes to confirmation prompts
    #[arg(long, short)]
    pub yes: bool,
}

pub async fn auth_command(manager: &mut ClientManager, args: AuthArgs) -> Result<()> {
    if args.list {
        return list_environments(manager).await;
    }

    if args.logout_all {
        return logout_all(manager, args.yes).await;
    }

    if let Some(env) = &args.logout {
        return logout(manager, env).await;
    }

    if let Some(env) = &args.switch {
        return switch_environment(manager, env, args.yes).await;
    }

    let target = manager.resolve_name(args.env.as_deref());
    login(manager, &target, args.manual).await
}

async fn list_environments(manager: &ClientManager) -> Result<()> {
    heading("Finance OS Environments");

    let statuses = manager.authenticated_environments().await?;
    for env in &statuses {
        let marker = if env.authenticated {
            "✓".bright_green().bold()
        } else {
            "✗".bright_red().bold()
        };
        let active = if env.is_active {
            format!(" {}", "(active)".bright_yellow())
        } else {
            String::new()
        };
        println!(
            "  {} {:<10}{} {} {}",
            marker,
            env.name.bright_white().bold(),
            active,
            env.display_name.dimmed(),
            env.base_url.cyan()
        );
    }

    println!();
    let authenticated = statuses.iter().filter(|e| e.authenticated).count();
    echo_info(&format!("{} of {} environments authenticated", authenticated, statuses.len()));
    Ok(())
}

async fn logout(manager: &ClientManager, env: &str) -> Result<()> {
    let display_name = manager
        .registry()
        .get(env)
        .map(|e| e.display_name)
        .unwrap_or_else(|| env.to_string());

    manager.logout(env).await?;
    echo_success(&format!("Logged out of {} ({})", display_name, env));
    Ok(())
}

async fn logout_all(manager: &ClientManager, yes: bool) -> Result<()> {
    let confirmed = yes
        || Confirm::new()
            .with_prompt("Clear credentials for ALL environments?")
            .default(false)
            .interact()?;

    if !confirmed {
        echo_info("Cancelled");
        return Ok(());
    }

    let cleared = manager.logout_all().await?;
    if cleared.is_empty() {
        echo_info("No stored credentials to clear");
    } else {
        echo_success(&format!("Cleared credentials for: {}", cleared.join(", ")));
    }
    Ok(())
}

async fn switch_environment(manager: &mut ClientManager, env: &str, yes: bool) -> Result<()> {
    let environment = manager.registry().require(env)?;

    if !manager.has_session(env).await? {
        echo_warning(&format!("Not authenticated to {}", environment.display_name));
        echo_info(&format!("Run 'financeos-cli auth --env {}' to authenticate first", env));

        let proceed = yes
            || Confirm::new()
                .with_prompt(format!("Switch to {} anyway?", env))
                .default(false)
                .interact()?;
        if !proceed {
            return Ok(());
        }
    }

    let selection = manager.switch_environment(env)?;
    echo_success(&format!(
        "Switched active environment to {} ({})",
        environment.display_name, env
    ));
    if let Selection::SessionOnly { reason } = selection {
        echo_warning(&format!("Config file not writable: {}", reason));
        echo_info(&format!("Set FINOS_ENV={} to make this choice stick", env));
    }
    Ok(())
}

async fn login(manager: &ClientManager, env: &str, manual: bool) -> Result<()> {
    let environment = manager.registry().require(env)?;
    echo_info(&format!(
        "Environment: {} ({})",
        environment.display_name, environment.base_url
    ));

    let session = if manual {
        heading("Manual Authentication");
        echo_info("To get your session cookies:");
        println!("    1. Open your browser and sign in to Finance OS");
        println!("    2. Open DevTools (F12) → Application → Cookies");
        println!("    3. Find the cookies for the Finance OS domain");
        println!("    4. Copy the values of 'sessionid' and 'csrftoken'");
        println!();
        prompt_session()?
    } else {
        match session_from_browser(&environment.base_url).await {
            Ok(session) => session,
            Err(e) => {
                echo_warning(&e.to_string());
                browser_login_fallback(&environment)?
            }
        }
    };

    store_session(manager, env, &session).await
}

/// Look for the session cookies in the local browsers
async fn session_from_browser(base_url: &str) -> Result<SessionCredential> {
    heading("Browser Cookie Authentication");
    echo_info("Looking for a Finance OS session in your browsers...");

    let base_url = base_url.to_string();
    let found = with_spinner(
        "Reading browser cookies...",
        tokio::task::spawn_blocking(move || browser::find_session(&base_url, &browser::supported_browsers())),
    )
    .await??;

    echo_success(&format!("Found session cookies in {}", found.browser));
    Ok(found.session)
}

/// Offer to open the login page, then ask for the cookies
fn browser_login_fallback(environment: &Environment) -> Result<SessionCredential> {
    heading("Browser Login");
    let payload = AuthRequired::for_browser_login(environment);
    println!("    {}: {}", "Login URL".dimmed(), payload.login_url.cyan());
    for step in payload.instructions.iter().take(3) {
        println!("    {}", step);
    }
    println!("    4. Copy the 'sessionid' and 'csrftoken' cookie values from DevTools");
    println!();

    let open_browser = Confirm::new()
        .with_prompt("Open browser to log in?")
        .default(true)
        .interact()?;
    if open_browser {
        if let Err(e) = open::that(&payload.login_url) {
            echo_warning(&format!("Failed to open browser automatically: {}", e));
        }
    }

    prompt_session()
}

fn prompt_session() -> Result<SessionCredential> {
    let session_id: String = Password::new()
        .with_prompt("Session ID (sessionid cookie)")
        .interact()?;
    let csrf_token: String = Password::new()
        .with_prompt("CSRF Token (csrftoken cookie)")
        .interact()?;

    let session = SessionCredential::new(session_id.trim(), csrf_token.trim());
    if !session.is_complete() {
        echo_error("Both session ID and CSRF token are required");
        anyhow::bail!("incomplete session cookies");
    }
    Ok(session)
}

async fn store_session(manager: &ClientManager, env: &str, session: &SessionCredential) -> Result<()> {
    let location = manager.login(env, session).await?;
    println!();
    match location {
        StorageLocation::Keyring => echo_success("Credentials stored in the system keyring"),
        StorageLocation::FallbackFile => {
            echo_warning("Keyring not available, credentials stored in the fallback file")
        }
    }

    if manager.injected().is_configured() {
        echo_warning("FINOS_* credential variables are set and take precedence over the stored session");
        return Ok(());
    }

    let client = manager.client(Some(env)).await?;
    let verified = with_spinner("Verifying session...", client.auth().ensure_valid_token()).await;
    if verified {
        echo_success(&format!("Session verified for {}", env));
    } else {
        echo_warning("Could not obtain an access token with these cookies; they may be stale");
        echo_info("Run 'financeos-cli status' to check again later");
    }
    Ok(())
}
