use anyhow::Result;

use crate::config::AppConfig;
use crate::vault::Vault;

/// Run a vault search from the terminal.
pub fn search(config: &AppConfig, query: &str, limit: usize) -> Result<()> {
    let vault = Vault::new(config.resolved_vault_path());
    let found = vault.search_vault(query, limit)?;

    if found.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} match(es) in {}\n", found.count, vault.root().display());

    for (i, result) in found.results.iter().enumerate() {
        println!("  {}. {}:{}", i + 1, result.file, result.line_number);
        println!("     {}", result.excerpt);
        println!();
    }

    Ok(())
}
