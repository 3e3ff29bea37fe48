//! CLI `project` subcommands.

use anyhow::Result;

use crate::vault::projects::Priority;
use crate::vault::Vault;

pub fn create(vault: &Vault, name: &str, description: &str, priority: &str) -> Result<()> {
    let priority: Priority = priority.parse()?;
    let path = vault.projects().create_project(name, description, priority)?;
    println!("Created project at {path}");
    Ok(())
}

pub fn goal(
    vault: &Vault,
    name: &str,
    description: &str,
    target: Option<&str>,
    habit: bool,
) -> Result<()> {
    let path = vault.projects().create_goal(name, description, target, habit)?;
    println!("Created goal at {path}");
    Ok(())
}

pub fn progress(vault: &Vault, name: &str, progress: i64, notes: &str) -> Result<()> {
    vault.projects().update_progress(name, progress, notes)?;
    println!("{name}: {progress}%");
    Ok(())
}

/// Print active records, or only stalled ones when `stalled_days` is set.
pub fn list(vault: &Vault, stalled_days: Option<i64>) -> Result<()> {
    let records = match stalled_days {
        Some(days) => vault.projects().stalled_projects(days)?,
        None => vault.projects().active_projects()?,
    };

    if records.is_empty() {
        println!("No records found.");
        return Ok(());
    }

    for record in &records {
        println!(
            "  [{}] {} {}% (priority: {}, updated: {})",
            record.kind.as_str(),
            record.name,
            record.progress,
            record.priority,
            record.last_updated.as_deref().unwrap_or("never"),
        );
    }
    Ok(())
}
