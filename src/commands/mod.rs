//! Slash-command parsing for chat input.
//!
//! Definitions are loaded once at startup from one `*.json` file per command
//! and never change afterwards. `/help` and `/search` are handled here; every
//! other recognized command only echoes its description back.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::vault::{SearchResults, Vault, DEFAULT_SEARCH_LIMIT};

/// Results listed in a rendered search reply.
const MAX_RENDERED_RESULTS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    pub syntax: String,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSummary {
    pub name: String,
    pub description: String,
    pub syntax: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: String,
    pub definition: Option<CommandDefinition>,
}

#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Unknown(String),
    HelpAll(Vec<CommandSummary>),
    HelpSpecific {
        name: String,
        definition: CommandDefinition,
    },
    HelpNotFound(String),
    SearchResults(SearchResults),
    SearchMissingQuery,
    SearchFailed(String),
    Recognized {
        name: String,
        description: String,
        args: String,
    },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            Self::Unknown(_) | Self::HelpNotFound(_) | Self::SearchMissingQuery | Self::SearchFailed(_)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDefinition>,
}

impl CommandRegistry {
    /// Load every `*.json` definition in `dir`. Unreadable files and files
    /// without a `name` are skipped; a missing directory yields an empty table.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "commands directory not found");
                return Self::default();
            }
        };

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut registry = Self::default();
        for path in paths {
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| {
                    serde_json::from_str::<CommandDefinition>(&text).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(def) if !def.name.trim().is_empty() => {
                    tracing::info!(command = %def.name, "loaded command");
                    registry.insert(def);
                }
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "command definition has no name, skipping")
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "failed to load command")
                }
            }
        }
        registry
    }

    pub fn from_definitions(defs: impl IntoIterator<Item = CommandDefinition>) -> Self {
        let mut registry = Self::default();
        for def in defs {
            registry.insert(def);
        }
        registry
    }

    fn insert(&mut self, def: CommandDefinition) {
        self.commands.insert(def.name.trim().to_string(), def);
    }

    pub fn get(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.get(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Every loaded command once, sorted by name.
    pub fn list(&self) -> Vec<CommandSummary> {
        self.commands
            .values()
            .map(|def| CommandSummary {
                name: def.name.clone(),
                description: def.description.clone(),
                syntax: def.syntax.clone(),
            })
            .collect()
    }

    /// `None` unless the trimmed text is `/<word>` optionally followed by
    /// arguments. Unknown names still parse, with no definition.
    pub fn parse(&self, text: &str) -> Option<ParsedCommand> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern =
            PATTERN.get_or_init(|| Regex::new(r"^/(\w+)(?:\s+(.*))?$").expect("valid regex"));

        let caps = pattern.captures(text.trim())?;
        let name = caps.get(1)?.as_str().to_string();
        let args = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let definition = self.commands.get(&name).cloned();
        Some(ParsedCommand {
            name,
            args,
            definition,
        })
    }

    pub fn execute(&self, parsed: &ParsedCommand, vault: &Vault) -> CommandOutcome {
        match parsed.name.as_str() {
            "help" => self.help(&parsed.args),
            "search" => search(&parsed.args, vault),
            _ => match &parsed.definition {
                Some(def) => CommandOutcome::Recognized {
                    name: parsed.name.clone(),
                    description: def.description.clone(),
                    args: parsed.args.clone(),
                },
                None => CommandOutcome::Unknown(parsed.name.clone()),
            },
        }
    }

    fn help(&self, args: &str) -> CommandOutcome {
        if args.is_empty() {
            return CommandOutcome::HelpAll(self.list());
        }
        let target = args.trim_start_matches('/');
        match self.commands.get(target) {
            Some(def) => CommandOutcome::HelpSpecific {
                name: target.to_string(),
                definition: def.clone(),
            },
            None => CommandOutcome::HelpNotFound(target.to_string()),
        }
    }
}

fn search(query: &str, vault: &Vault) -> CommandOutcome {
    if query.is_empty() {
        return CommandOutcome::SearchMissingQuery;
    }
    match vault.search_vault(query, DEFAULT_SEARCH_LIMIT) {
        Ok(results) => CommandOutcome::SearchResults(results),
        Err(e) => CommandOutcome::SearchFailed(e.message),
    }
}

/// Chat reply text for an outcome.
pub fn render(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::HelpAll(commands) => {
            let mut text = String::from("📚 Available Commands\n\n");
            for cmd in commands {
                text.push_str(&format!(
                    "/{}\n  {}\n  Usage: {}\n\n",
                    cmd.name, cmd.description, cmd.syntax
                ));
            }
            text.push_str("Type /help <command> for more details");
            text
        }
        CommandOutcome::HelpSpecific { name, definition } => {
            let mut text = format!(
                "📖 Help: /{name}\n\nDescription: {}\nUsage: {}\n\n",
                or_na(&definition.description),
                or_na(&definition.syntax)
            );
            if !definition.examples.is_empty() {
                text.push_str("Examples:\n");
                for example in &definition.examples {
                    text.push_str(&format!("  {example}\n"));
                }
            }
            text
        }
        CommandOutcome::SearchResults(found) => {
            let mut text = format!("🔍 Search Results: {} matches found\n\n", found.count);
            if found.count == 0 {
                text.push_str("No results found for your query.");
                return text;
            }
            for (i, hit) in found.results.iter().take(MAX_RENDERED_RESULTS).enumerate() {
                text.push_str(&format!(
                    "{}. {}\n   Line {}: {}\n\n",
                    i + 1,
                    hit.file,
                    hit.line_number,
                    hit.excerpt
                ));
            }
            if found.count > MAX_RENDERED_RESULTS {
                text.push_str(&format!(
                    "... and {} more results",
                    found.count - MAX_RENDERED_RESULTS
                ));
            }
            text
        }
        CommandOutcome::Recognized {
            name,
            description,
            args,
        } => {
            let args = if args.is_empty() { "none" } else { args.as_str() };
            format!(
                "✓ Command recognized: /{name}\n\n{description}\n\nArguments: {args}\n\n\
                 Note: Full command execution coming soon!"
            )
        }
        CommandOutcome::Unknown(name) => format!("✗ Unknown command: /{name}"),
        CommandOutcome::HelpNotFound(name) => format!("✗ Command not found: /{name}"),
        CommandOutcome::SearchMissingQuery => "✗ Search query is required".to_string(),
        CommandOutcome::SearchFailed(message) => format!("✗ {message}"),
    }
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        "N/A"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> CommandDefinition {
        CommandDefinition {
            name: name.into(),
            description: format!("{name} things"),
            syntax: format!("/{name} <arg>"),
            examples: vec![format!("/{name} example")],
        }
    }

    fn registry() -> CommandRegistry {
        CommandRegistry::from_definitions([def("search"), def("help"), def("journal")])
    }

    #[test]
    fn parse_splits_name_and_args() {
        let parsed = registry().parse("  /search   weekly plan  ").unwrap();
        assert_eq!(parsed.name, "search");
        assert_eq!(parsed.args, "weekly plan");
        assert!(parsed.definition.is_some());
    }

    #[test]
    fn parse_rejects_non_commands() {
        let reg = registry();
        assert!(reg.parse("hello /search").is_none());
        assert!(reg.parse("/").is_none());
        assert!(reg.parse("/!bang").is_none());
    }

    #[test]
    fn unknown_commands_parse_without_definition() {
        let reg = registry();
        let parsed = reg.parse("/frobnicate now").unwrap();
        assert!(parsed.definition.is_none());

        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path());
        let outcome = reg.execute(&parsed, &vault);
        assert!(!outcome.is_success());
        assert_eq!(render(&outcome), "✗ Unknown command: /frobnicate");
    }

    #[test]
    fn help_lists_each_command_once_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path());
        let reg = registry();
        let outcome = reg.execute(&reg.parse("/help").unwrap(), &vault);
        let CommandOutcome::HelpAll(list) = &outcome else {
            panic!("expected help listing, got {outcome:?}");
        };
        let names: Vec<&str> = list.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["help", "journal", "search"]);
        assert_eq!(render(&outcome).matches("/journal\n").count(), 1);
    }

    #[test]
    fn help_without_definitions_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path());
        let reg = CommandRegistry::default();
        let outcome = reg.execute(&reg.parse("/help").unwrap(), &vault);
        assert!(outcome.is_success());
    }

    #[test]
    fn help_for_specific_command() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path());
        let reg = registry();

        let found = reg.execute(&reg.parse("/help journal").unwrap(), &vault);
        let text = render(&found);
        assert!(text.starts_with("📖 Help: /journal"));
        assert!(text.contains("Examples:\n  /journal example"));

        let missing = reg.execute(&reg.parse("/help nope").unwrap(), &vault);
        assert_eq!(render(&missing), "✗ Command not found: /nope");
    }

    #[test]
    fn search_requires_query_and_shows_first_ten() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (0..15).map(|i| format!("apple line {i}\n")).collect();
        std::fs::write(dir.path().join("fruit.md"), body).unwrap();
        let vault = Vault::new(dir.path());
        let reg = registry();

        let missing = reg.execute(&reg.parse("/search").unwrap(), &vault);
        assert_eq!(render(&missing), "✗ Search query is required");

        let outcome = reg.execute(&reg.parse("/search apple").unwrap(), &vault);
        let text = render(&outcome);
        assert!(text.starts_with("🔍 Search Results: 15 matches found"));
        assert!(text.contains("10. fruit.md\n   Line 10: apple line 9"));
        assert!(!text.contains("11. fruit.md"));
        assert!(text.ends_with("... and 5 more results"));
    }

    #[test]
    fn other_commands_echo_description() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(dir.path());
        let reg = registry();
        let outcome = reg.execute(&reg.parse("/journal").unwrap(), &vault);
        let text = render(&outcome);
        assert!(text.starts_with("✓ Command recognized: /journal"));
        assert!(text.contains("Arguments: none"));
    }

    #[test]
    fn load_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"name":"alpha","description":"A"}"#).unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"description":"nameless"}"#).unwrap();
        std::fs::write(dir.path().join("c.json"), "not json").unwrap();
        std::fs::write(dir.path().join("d.txt"), r#"{"name":"ignored"}"#).unwrap();

        let reg = CommandRegistry::load(dir.path());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("alpha").unwrap().description, "A");
    }

    #[test]
    fn missing_directory_is_empty() {
        assert!(CommandRegistry::load("/no/such/commands").is_empty());
    }
}
