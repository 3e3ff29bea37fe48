//! Keyword-table classification of conversation text.
//!
//! [`extract_all`] derives mood, category, priority, action items, and tags
//! from free text. It is a pure function; the tables below are fixed.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

const MOOD_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "stressed",
        &[
            "stress", "worried", "anxious", "overwhelm", "pressure", "difficult", "struggle",
            "frustrated", "tired", "exhausted",
        ],
    ),
    (
        "excited",
        &[
            "excited", "amazing", "great", "awesome", "love", "fantastic", "excellent", "happy",
            "thrilled", "pumped",
        ],
    ),
    (
        "focused",
        &[
            "plan", "goal", "organize", "structure", "focus", "work on", "complete", "finish",
            "progress", "productive",
        ],
    ),
    (
        "confused",
        &[
            "confused", "not sure", "unclear", "don't understand", "lost", "help", "stuck",
            "can't figure", "uncertain",
        ],
    ),
    (
        "reflective",
        &[
            "think", "realize", "understand", "learn", "reflect", "consider", "wondering",
            "looking back", "appreciate",
        ],
    ),
];

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "work",
        &[
            "work", "project", "meeting", "deadline", "task", "client", "business", "job",
            "office", "team",
        ],
    ),
    (
        "personal",
        &[
            "personal", "family", "friend", "relationship", "life", "home", "kids", "spouse",
            "partner",
        ],
    ),
    (
        "learning",
        &[
            "learn", "study", "course", "tutorial", "practice", "skill", "knowledge", "education",
            "class", "book",
        ],
    ),
    (
        "health",
        &[
            "health", "fitness", "exercise", "workout", "diet", "sleep", "mental", "meditation",
            "wellness", "gym",
        ],
    ),
    (
        "finance",
        &[
            "money", "budget", "finance", "invest", "expense", "income", "cost", "save", "bank",
            "crypto",
        ],
    ),
    (
        "creative",
        &[
            "creative", "write", "design", "art", "music", "create", "build", "make", "draw",
            "compose",
        ],
    ),
];

/// Checked in order; the first tier with any hit wins.
const PRIORITY_TIERS: &[(&str, &[&str])] = &[
    (
        "high",
        &[
            "urgent", "asap", "immediately", "critical", "important", "must", "deadline", "today",
            "now", "emergency",
        ],
    ),
    ("medium", &["soon", "should", "need to", "this week", "plan to"]),
    (
        "low",
        &["eventually", "someday", "maybe", "would be nice", "when possible"],
    ),
];

const ACTION_PATTERNS: &[&str] = &[
    r"(?im)I need to (.+?)(?:\.|$)",
    r"(?im)I should (.+?)(?:\.|$)",
    r"(?im)I will (.+?)(?:\.|$)",
    r"(?im)I have to (.+?)(?:\.|$)",
    r"(?im)I must (.+?)(?:\.|$)",
    r"(?im)- \[ \] (.+?)$",
    r"(?im)TODO:?[ \t]*(.+?)$",
    r"(?im)remind me to (.+?)(?:\.|$)",
    r"(?im)don't forget to (.+?)(?:\.|$)",
];

pub const NEUTRAL_MOOD: &str = "neutral";
pub const GENERAL_CATEGORY: &str = "general";
pub const DEFAULT_PRIORITY: &str = "medium";
const MAX_ACTION_ITEMS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationMetadata {
    pub mood: String,
    pub category: String,
    pub priority: String,
    pub action_items: Vec<String>,
    pub tags: Vec<String>,
}

pub fn extract_all(text: &str) -> ConversationMetadata {
    let lower = text.to_lowercase();

    let mood = best_scoring(&lower, MOOD_KEYWORDS).unwrap_or(NEUTRAL_MOOD);
    let category = best_scoring(&lower, CATEGORY_KEYWORDS);
    let priority = detect_priority(&lower);
    let action_items = extract_action_items(text);

    let mut tags = vec!["ai".to_string(), "conversation".to_string()];
    if mood != NEUTRAL_MOOD {
        tags.push(mood.to_string());
    }
    if let Some(category) = category {
        tags.push(category.to_string());
    }

    ConversationMetadata {
        mood: mood.to_string(),
        category: category.unwrap_or(GENERAL_CATEGORY).to_string(),
        priority: priority.to_string(),
        action_items,
        tags,
    }
}

/// Additive keyword-bag scoring. Highest score wins; ties go to the
/// lexicographically smallest label. `None` when nothing scored.
fn best_scoring(text: &str, table: &[(&'static str, &[&str])]) -> Option<&'static str> {
    table
        .iter()
        .map(|(label, keywords)| {
            let score = keywords.iter().filter(|k| text.contains(*k)).count();
            (*label, score)
        })
        .filter(|(_, score)| *score > 0)
        .max_by(|(a_label, a), (b_label, b)| a.cmp(b).then_with(|| b_label.cmp(a_label)))
        .map(|(label, _)| label)
}

fn detect_priority(text: &str) -> &'static str {
    PRIORITY_TIERS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(tier, _)| *tier)
        .unwrap_or(DEFAULT_PRIORITY)
}

fn action_regexes() -> &'static [Regex] {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        ACTION_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("action pattern is valid"))
            .collect()
    })
}

fn extract_action_items(text: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for re in action_regexes() {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let item = m.as_str().trim();
            if item.chars().count() > 3 && !items.iter().any(|i| i == item) {
                items.push(item.to_string());
            }
        }
    }
    items.truncate(MAX_ACTION_ITEMS);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let meta = extract_all("");
        assert_eq!(meta.priority, "medium");
        assert_eq!(meta.mood, "neutral");
        assert_eq!(meta.category, "general");
        assert!(meta.action_items.is_empty());
        assert_eq!(meta.tags, vec!["ai", "conversation"]);
    }

    #[test]
    fn urgent_text_is_high_priority() {
        assert_eq!(extract_all("This is urgent").priority, "high");
    }

    #[test]
    fn priority_tiers_are_first_match() {
        // "should" is medium, "maybe" is low: medium tier is checked first.
        assert_eq!(extract_all("maybe I should").priority, "medium");
        assert_eq!(extract_all("someday, maybe").priority, "low");
    }

    #[test]
    fn mood_and_category_scoring() {
        let meta = extract_all("I'm so stressed and worried about the client meeting");
        assert_eq!(meta.mood, "stressed");
        assert_eq!(meta.category, "work");
        assert_eq!(meta.tags, vec!["ai", "conversation", "stressed", "work"]);
    }

    #[test]
    fn ties_break_lexicographically() {
        // One hit each for "excited" (great) and "stressed" (tired).
        let meta = extract_all("great but tired");
        assert_eq!(meta.mood, "excited");
        // One hit each for "health" (gym) and "finance" (budget).
        let meta = extract_all("gym budget");
        assert_eq!(meta.category, "finance");
    }

    #[test]
    fn action_items_are_extracted_and_deduplicated() {
        let text = "I need to call the bank. I need to call the bank.\n\
                    - [ ] write the report\n\
                    TODO: fix the sink\n\
                    remind me to water plants.";
        let meta = extract_all(text);
        assert_eq!(
            meta.action_items,
            vec![
                "call the bank",
                "write the report",
                "fix the sink",
                "water plants"
            ]
        );
    }

    #[test]
    fn short_items_are_dropped_and_list_is_capped() {
        assert!(extract_all("I must go.").action_items.is_empty());

        let text: String = (0..15)
            .map(|i| format!("- [ ] task number {i}\n"))
            .collect();
        assert_eq!(extract_all(&text).action_items.len(), 10);
    }
}
