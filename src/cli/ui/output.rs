//! Colored status lines shared by the commands

use colored::*;

pub fn heading(title: &str) {
    println!();
    println!("  {}", title.bright_blue().bold());
    println!("  {}", "═".repeat(title.chars().count()).bright_blue());
    println!();
}

pub fn echo_success(message: &str) {
    println!("  {} {}", "✓".bright_green().bold(), message);
}

pub fn echo_error(message: &str) {
    println!("  {} {}", "✗".bright_red().bold(), message.red());
}

pub fn echo_warning(message: &str) {
    println!("  {} {}", "⚠".bright_yellow().bold(), message.yellow());
}

pub fn echo_info(message: &str) {
    println!("  {} {}", "ℹ".bright_blue(), message);
}
