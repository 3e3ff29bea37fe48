//! CLI `doctor` command: check every configured service and print a report.

use anyhow::Result;
use chrono::Local;

use crate::app::AppContext;

pub async fn doctor(ctx: &AppContext) -> Result<()> {
    let config = &ctx.config;

    println!("vaultmate Health Report");
    println!("=======================");
    println!();
    println!("Vault:             {}", ctx.vault.root().display());
    if ctx.vault.exists() {
        let vault = ctx.vault.clone();
        let notes = tokio::task::spawn_blocking(move || vault.list_all_notes()).await?;
        match notes {
            Ok(notes) => println!("  Notes:           {}", notes.len()),
            Err(e) => println!("  Notes:           error ({e})"),
        }
        let vault = ctx.vault.clone();
        match tokio::task::spawn_blocking(move || vault.projects().active_projects()).await? {
            Ok(records) => println!("  Active records:  {}", records.len()),
            Err(e) => println!("  Active records:  error ({e})"),
        }
    } else {
        println!("  Status:          NOT FOUND");
        println!("  Set vault.path in the config file or OBSIDIAN_VAULT_PATH.");
    }
    println!();

    println!("Commands:          {}", config.resolved_commands_dir().display());
    println!("  Loaded:          {}", ctx.commands.len());
    println!();

    println!("LLM backend:       {}", ctx.llm.name());
    let healthy = ctx.llm.check_health().await;
    println!(
        "  Status:          {}",
        if healthy { "OK" } else { "UNREACHABLE" }
    );
    match &ctx.summarizer {
        Some(client) => {
            let limits = client.rate_limit_status();
            println!("  Summaries:       {} ({} requests left this minute)", client.model(), limits.remaining);
        }
        None => println!("  Summaries:       disabled (no Anthropic API key)"),
    }
    println!();

    println!(
        "Telegram bot:      {}",
        if ctx.telegram.is_some() { "configured" } else { "not configured" }
    );
    match config.telegram.chat_id {
        Some(id) => println!("  Chat id:         {id}"),
        None => println!("  Chat id:         (not set)"),
    }
    println!();

    let status = ctx.nudging.status(Local::now()).await;
    println!(
        "Nudging:           {}",
        if status.enabled { "enabled" } else { "disabled" }
    );
    println!("  Active hours:    {}", status.active_hours);
    println!(
        "  Sent today:      {}/{}",
        status.nudges_sent_today, status.max_per_day
    );

    Ok(())
}
