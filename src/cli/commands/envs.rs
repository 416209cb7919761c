use crate::cli::ui::{echo_info, heading};
use anyhow::Result;
use colored::*;
use financeos_cli::api::ClientManager;

pub fn envs_command(manager: &ClientManager) -> Result<()> {
    let active = manager.active_environment();

    heading("Available Environments");

    for env in manager.registry().environments() {
        let name = if env.name == active {
            format!("{} {}", env.name.bright_green().bold(), "(active)".bright_yellow())
        } else {
            env.name.white().to_string()
        };
        println!("  {}", name);
        println!("    {}: {}", "Display".dimmed(), env.display_name);
        println!("    {}: {}", "URL".dimmed(), env.base_url.cyan());
        println!("    {}: {}", "Auth".dimmed(), env.auth_url.cyan());
        println!();
    }

    echo_info(&format!(
        "To add custom environments, edit {}",
        manager.registry().config_path().display()
    ));
    Ok(())
}
