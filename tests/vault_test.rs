mod helpers;

use chrono::{Local, TimeZone};
use helpers::{test_vault, write_note};
use vaultmate::conversation::ConversationContext;
use vaultmate::error::ErrorKind;
use vaultmate::llm::ChatMessage;
use vaultmate::vault::conversations::SaveRequest;
use vaultmate::vault::projects::{Priority, RecordKind};
use vaultmate::vault::Vault;

#[test]
fn read_note_rejects_traversal_outside_vault() {
    let dir = test_vault();
    let vault = Vault::new(dir.path());

    let err = vault.read_note("../../etc/passwd").unwrap_err();
    assert_eq!(err.kind, ErrorKind::PathNotAllowed);

    let err = vault.read_note("Areas/Missing.md").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let content = vault.read_note("Areas/../Inbox.md").unwrap();
    assert!(content.contains("buy milk"));
}

#[test]
fn missing_vault_reports_not_found() {
    let dir = test_vault();
    let vault = Vault::new(dir.path().join("nope"));
    assert!(!vault.exists());
    assert_eq!(vault.list_all_notes().unwrap_err().kind, ErrorKind::NotFound);
    assert_eq!(
        vault.search_vault("milk", 10).unwrap_err().kind,
        ErrorKind::NotFound
    );
}

#[test]
fn recent_notes_are_limited() {
    let dir = test_vault();
    let vault = Vault::new(dir.path());
    let recent = vault.list_recent_notes(2).unwrap();
    assert_eq!(recent.len(), 2);
    let all = vault.list_all_notes().unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn created_project_reads_back_with_todays_log_entry() {
    let dir = test_vault();
    let vault = Vault::new(dir.path());
    let projects = vault.projects();

    projects.create_project("X", "", Priority::Low).unwrap();
    let record = projects.read_project("X").unwrap();
    assert_eq!(record.name, "X");
    assert_eq!(record.kind, RecordKind::Project);
    assert_eq!(record.progress, 0);
    assert_eq!(record.priority, "low");
    assert!(record.related_conversations.is_empty());

    let text = projects.read_project_text("X").unwrap();
    let entry = format!("- **{}** (0%): Project created", Local::now().format("%Y-%m-%d"));
    let log = text.find("## Progress Log").unwrap();
    let created = text.find(&entry).unwrap();
    assert!(log < created);
    assert!(text.contains("Project description here."));
}

#[test]
fn project_lifecycle() {
    let dir = test_vault();
    let vault = Vault::new(dir.path());
    let projects = vault.projects();

    let path = projects
        .create_project("Website Redesign", "New landing page", Priority::High)
        .unwrap();
    assert!(path.ends_with(".md"));
    assert_eq!(
        projects
            .create_project("Website Redesign", "", Priority::Low)
            .unwrap_err()
            .kind,
        ErrorKind::AlreadyExists
    );

    projects
        .update_progress("Website Redesign", 40, "wireframes done")
        .unwrap();
    let record = projects.read_project("Website Redesign").unwrap();
    assert_eq!(record.kind, RecordKind::Project);
    assert_eq!(record.progress, 40);
    assert_eq!(record.priority, "high");

    let text = projects.read_project_text("Website Redesign").unwrap();
    assert!(text.contains("(40%): wireframes done"));

    let err = projects
        .update_progress("Website Redesign", 101, "")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    projects.update_progress("Website Redesign", 100, "").unwrap();
    assert!(projects.active_projects().unwrap().is_empty());
}

#[test]
fn goals_and_projects_sort_by_priority() {
    let dir = test_vault();
    let vault = Vault::new(dir.path());
    let projects = vault.projects();

    projects.create_project("Garden", "", Priority::Low).unwrap();
    projects
        .create_goal("Learn Japanese N3", "", Some("2025-12-31"), true)
        .unwrap();

    let active = projects.active_projects().unwrap();
    let names: Vec<&str> = active.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Learn Japanese N3", "Garden"]);
    assert_eq!(active[0].kind, RecordKind::Goal);
}

#[test]
fn saved_conversation_links_daily_note_and_project() {
    let dir = test_vault();
    let vault = Vault::new(dir.path());
    vault
        .projects()
        .create_project("Website Redesign", "", Priority::Medium)
        .unwrap();

    let request = SaveRequest {
        messages: vec![
            ChatMessage::user("I need to finish the landing page copy by Friday"),
            ChatMessage::assistant("TODO: draft the hero section first."),
        ],
        topic: String::new(),
        context: Some(ConversationContext {
            kind: RecordKind::Project,
            name: "Website Redesign".to_string(),
        }),
        platform: "telegram".to_string(),
        summary: None,
        key_insights: Vec::new(),
        existing: None,
    };
    let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();
    let path = vault
        .conversations()
        .save_conversation_at(&request, now)
        .unwrap();
    assert!(path.starts_with("AI-Conversations/2024-03-05-143000-"));

    let transcript = vault.read_note(&path).unwrap();
    assert!(transcript.contains("platform: telegram"));
    assert!(transcript.contains("draft the hero section first"));

    let daily = vault.read_note("Daily-Notes/2024-03-05.md").unwrap();
    assert!(daily.contains("Worked on the vault plugin."));
    assert!(daily.contains("[[AI-Conversations/"));

    let record = vault.projects().read_project("Website Redesign").unwrap();
    assert!(record.related_conversations.contains(&path));
}

#[test]
fn stalled_projects_ignore_fresh_records() {
    let dir = test_vault();
    write_note(
        dir.path(),
        "Projects/Old Thing.md",
        "---\ntitle: Old Thing\ntype: project\nprogress: 10\npriority: medium\nstatus: active\nlast_updated: 2020-01-01T09:00:00\n---\n# Old Thing\n",
    );
    let vault = Vault::new(dir.path());
    vault
        .projects()
        .create_project("Fresh Thing", "", Priority::Medium)
        .unwrap();

    let stalled = vault.projects().stalled_projects(7).unwrap();
    let names: Vec<&str> = stalled.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Old Thing"]);
}
