pub mod doctor;
pub mod project;
pub mod search;

use anyhow::{bail, Result};
use chrono::Local;

use crate::app::AppContext;
use crate::commands::CommandRegistry;
use crate::config::AppConfig;

/// Print every loaded slash command with its syntax.
pub fn list_commands(config: &AppConfig) {
    let dir = config.resolved_commands_dir();
    let registry = CommandRegistry::load(&dir);

    if registry.is_empty() {
        println!("No command definitions found in {}", dir.display());
        println!("Built-in: /help, /search");
        return;
    }

    println!("{} command(s) from {}\n", registry.len(), dir.display());
    for command in registry.list() {
        println!("  /{}", command.name);
        println!("     {}", command.description);
        println!("     Usage: {}", command.syntax);
        println!();
    }
}

/// Send a one-off nudge, subject to the same throttle as scheduled ones.
pub async fn nudge(ctx: &AppContext, message: &str) -> Result<()> {
    if !ctx.nudging.is_enabled() {
        bail!("nudging is disabled: set telegram.chat_id and nudging.enabled");
    }
    if ctx.nudging.send_custom_nudge(message).await {
        println!("Nudge sent.");
    } else {
        let status = ctx.nudging.status(Local::now()).await;
        println!(
            "Nudge not sent (sent today: {}/{}, active hours {}, within window: {}).",
            status.nudges_sent_today,
            status.max_per_day,
            status.active_hours,
            status.within_active_hours
        );
    }
    Ok(())
}
