//! Integration tests covering end-to-end protection scenarios

use chrono::{Duration, Utc};
use keepsake::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn provider_with(articles: Vec<serde_json::Value>) -> Arc<InMemoryProvider> {
    Arc::new(InMemoryProvider::new(ContentCollections {
        articles,
        ..Default::default()
    }))
}

/// Drive a reproducible random edit workload against the monitor
fn apply_random_edits(workspace: &Workspace, rng: &mut StdRng, count: usize) -> anyhow::Result<()> {
    for _ in 0..count {
        let path = format!("pages/page-{}.html", rng.random_range(0..12u32));
        let body = "x".repeat(rng.random_range(1..400usize));
        workspace
            .monitor()
            .create_file_version(&path, &body, ChangeType::Modified)?;
    }
    Ok(())
}

#[test]
fn test_full_protection_lifecycle() {
    init_tracing();
    let provider = provider_with(vec![json!({"id": "a1", "body": "first draft"})]);
    let workspace = session::WorkspaceBuilder::new()
        .content_provider(provider.clone())
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    // Record a content version, then back the workspace up
    workspace
        .versions()
        .create_version(
            ContentType::Article,
            "a1",
            "Article One",
            json!({"id": "a1", "body": "first draft"}),
            vec!["initial draft".to_string()],
            "editor",
        )
        .unwrap();
    let backup = workspace
        .backups()
        .create_full_backup("daily snapshot", "editor")
        .unwrap();
    assert_eq!(backup.item_count, 1);

    // The user keeps editing, then regrets it
    provider.replace(ContentCollections {
        articles: vec![json!({"id": "a1", "body": "ruined"})],
        ..Default::default()
    });

    let points = workspace.restore().available_restore_points();
    assert!(points.iter().any(|p| p.id == backup.id));

    let prepared = workspace
        .restore()
        .prepare_restore(&backup.id, &RestoreOptions::default());
    assert!(prepared.success);
    assert_eq!(prepared.preview.unwrap().estimated_items, 1);

    let outcome = workspace.restore_from(&backup.id, &RestoreOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert!(outcome.backup_created.is_some());
    assert_eq!(
        provider.snapshot().articles[0]["body"],
        json!("first draft")
    );

    workspace.shutdown(true).unwrap();
    assert!(workspace
        .backups()
        .last_successful_backup(Some(BackupType::Manual))
        .is_some());
}

#[test]
fn test_incremental_backup_only_carries_changes() {
    let provider = provider_with(vec![
        json!({"id": "a1", "body": "stable"}),
        json!({"id": "a2", "body": "volatile"}),
    ]);
    let workspace = session::WorkspaceBuilder::new()
        .content_provider(provider.clone())
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    workspace
        .backups()
        .create_full_backup("base", "tester")
        .unwrap();

    provider.replace(ContentCollections {
        articles: vec![
            json!({"id": "a1", "body": "stable"}),
            json!({"id": "a2", "body": "changed"}),
            json!({"id": "a3", "body": "brand new"}),
        ],
        ..Default::default()
    });

    let incremental = workspace
        .backups()
        .create_incremental_backup("delta", "tester")
        .unwrap();
    assert_eq!(incremental.backup_type, BackupType::Incremental);
    assert_eq!(incremental.item_count, 2);

    // Restoring the incremental merges over current content by id
    provider.replace(ContentCollections {
        articles: vec![
            json!({"id": "a1", "body": "stable"}),
            json!({"id": "a2", "body": "mangled later"}),
        ],
        ..Default::default()
    });
    let options = RestoreOptions {
        create_safety_backup: false,
        ..Default::default()
    };
    let outcome = workspace.restore_from(&incremental.id, &options);
    assert!(outcome.success, "errors: {:?}", outcome.errors);

    let articles = provider.snapshot().articles;
    assert_eq!(articles.len(), 3);
    assert!(articles
        .iter()
        .any(|a| a["id"] == json!("a2") && a["body"] == json!("changed")));
    assert!(articles.iter().any(|a| a["id"] == json!("a3")));
}

#[test]
fn test_first_incremental_without_base_is_a_full_backup() {
    let workspace = session::WorkspaceBuilder::new()
        .content_provider(provider_with(vec![json!({"id": "a1"})]))
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    let backup = workspace
        .backups()
        .create_incremental_backup("no base yet", "tester")
        .unwrap();
    assert_eq!(backup.backup_type, BackupType::Full);
}

#[test]
fn test_quota_exhaustion_degrades_instead_of_failing() {
    // Durable tier with a tiny quota: history writes must degrade down the
    // ladder and raise warnings, never surface an error to the caller.
    let durable: Arc<MemoryStore> = Arc::new(MemoryStore::with_capacity(256));
    let workspace = session::WorkspaceBuilder::new()
        .durable_store(durable)
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    for i in 0..30 {
        workspace
            .monitor()
            .create_file_version(
                &format!("page-{i}.html"),
                &format!("<html>{}</html>", "x".repeat(200)),
                ChangeType::Modified,
            )
            .unwrap();
    }

    assert_eq!(workspace.monitor().active_files().len(), 30);
    assert!(
        !workspace.monitor().all_warnings().is_empty(),
        "degraded persistence should have raised warnings"
    );
}

#[test]
fn test_protected_path_restore_respects_refusal() {
    let workspace = session::WorkspaceBuilder::new()
        .confirmation(Arc::new(NeverConfirm))
        .monitor_config(MonitorConfig {
            protected_patterns: vec!["config/**".to_string()],
            ..Default::default()
        })
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    let monitor = workspace.monitor();
    let v1 = monitor
        .create_file_version("config/site.json", "{\"v\":1}", ChangeType::Created)
        .unwrap();
    monitor
        .create_file_version("config/site.json", "{\"v\":2}", ChangeType::Modified)
        .unwrap();

    // Refused confirmation: no restore, and the refusal is recorded
    assert!(!monitor.restore_file_version("config/site.json", &v1.id).unwrap());
    assert!(workspace
        .monitor()
        .all_warnings()
        .iter()
        .any(|w| w.response == Some(WarningResponse::Cancel)));
    assert_eq!(monitor.get_file_history("config/site.json").len(), 2);
}

#[test]
fn test_critical_change_gets_emergency_backup() {
    let workspace = session::WorkspaceBuilder::new()
        .content_provider(provider_with(vec![json!({"id": "a1"})]))
        .monitor_config(MonitorConfig {
            protected_patterns: vec!["**/*.json".to_string()],
            critical_patterns: vec!["**/theme.json".to_string()],
            ..Default::default()
        })
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    workspace
        .monitor()
        .create_file_version("design/theme.json", "{}", ChangeType::Deleted)
        .unwrap();

    let warnings = workspace.monitor().critical_warnings();
    assert!(!warnings.is_empty());
    assert!(workspace
        .backups()
        .all_backups()
        .iter()
        .any(|m| m.description.contains("Emergency backup")));
}

#[test]
fn test_undo_last_restore_end_to_end() {
    let provider = provider_with(vec![json!({"id": "a1", "body": "v1"})]);
    let workspace = session::WorkspaceBuilder::new()
        .content_provider(provider.clone())
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    let backup = workspace
        .backups()
        .create_full_backup("v1 state", "tester")
        .unwrap();
    provider.replace(ContentCollections {
        articles: vec![json!({"id": "a1", "body": "v2"})],
        ..Default::default()
    });

    assert!(workspace.restore_from(&backup.id, &RestoreOptions::default()).success);
    assert_eq!(provider.snapshot().articles[0]["body"], json!("v1"));

    assert!(workspace.restore().undo_last_restore().unwrap());
    assert_eq!(provider.snapshot().articles[0]["body"], json!("v2"));
}

#[test]
fn test_state_survives_workspace_rebuild() {
    let durable: Arc<MemoryStore> = Arc::new(MemoryStore::new());

    let backup_id = {
        let workspace = session::WorkspaceBuilder::new()
            .durable_store(durable.clone())
            .content_provider(provider_with(vec![json!({"id": "a1"})]))
            .build()
            .unwrap();
        workspace.initialize().unwrap();
        workspace
            .versions()
            .create_version(
                ContentType::Article,
                "a1",
                "Article",
                json!({"id": "a1"}),
                vec![],
                "editor",
            )
            .unwrap();
        let backup = workspace
            .backups()
            .create_full_backup("before reload", "editor")
            .unwrap();
        workspace.shutdown(false).unwrap();
        backup.id
    };

    // Same durable store, fresh process
    let workspace = session::WorkspaceBuilder::new()
        .durable_store(durable)
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    assert_eq!(workspace.versions().len(), 1);
    assert!(workspace
        .backups()
        .all_backups()
        .iter()
        .any(|m| m.id == backup_id));
    assert!(workspace
        .restore()
        .available_restore_points()
        .iter()
        .any(|p| p.id == backup_id));
}

#[test]
fn test_heartbeat_schedule_over_a_simulated_hour() {
    let workspace = session::WorkspaceBuilder::new()
        .content_provider(provider_with(vec![json!({"id": "a1"})]))
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    let start = Utc::now();
    for minute in 1..=60 {
        workspace
            .heartbeat(start + Duration::minutes(minute))
            .unwrap();
    }

    // 5-minute autosaves and 30-minute backups both fired repeatedly
    assert!(workspace.backups().autosave_points().len() >= 10);
    let scheduled = workspace
        .backups()
        .all_backups()
        .iter()
        .filter(|m| m.description == "Scheduled backup")
        .count();
    assert_eq!(scheduled, 2);
}

#[test]
fn test_file_history_ring_keeps_newest_five() {
    let workspace = session::WorkspaceBuilder::new().build().unwrap();
    workspace.initialize().unwrap();

    for i in 0..8 {
        workspace
            .monitor()
            .create_file_version("draft.txt", &format!("rev {i}"), ChangeType::Modified)
            .unwrap();
    }

    let history = workspace.monitor().get_file_history("draft.txt");
    assert_eq!(history.len(), 5);
    // Newest first
    assert_eq!(history[0].checksum, checksum("rev 7"));
    assert_eq!(history[4].checksum, checksum("rev 3"));
}

#[test]
fn test_randomized_edit_workload_keeps_invariants() {
    init_tracing();
    let workspace = session::WorkspaceBuilder::new().build().unwrap();
    workspace.initialize().unwrap();

    let mut rng = StdRng::seed_from_u64(0x5EED);
    apply_random_edits(&workspace, &mut rng, 200).unwrap();

    let config = workspace.config();
    let active = workspace.monitor().active_files();
    assert!(!active.is_empty());
    assert!(active.len() <= config.max_tracked_paths);
    for path in &active {
        let history = workspace.monitor().get_file_history(path);
        assert!(!history.is_empty());
        assert!(history.len() <= config.per_path_history);

        // Every retained version restores cleanly
        let version = &history[rng.random_range(0..history.len())];
        assert!(workspace
            .monitor()
            .restore_file_version(path, &version.id)
            .unwrap());
    }
}

#[test]
fn test_oversized_content_stays_recoverable() {
    let workspace = session::WorkspaceBuilder::new()
        .config(KeepsakeConfig {
            inline_threshold: 64,
            ..Default::default()
        })
        .build()
        .unwrap();
    workspace.initialize().unwrap();

    let big = "paragraph ".repeat(100);
    let v1 = workspace
        .monitor()
        .create_file_version("long.txt", &big, ChangeType::Created)
        .unwrap();
    workspace
        .monitor()
        .create_file_version("long.txt", "short now", ChangeType::Modified)
        .unwrap();

    assert!(workspace
        .monitor()
        .restore_file_version("long.txt", &v1.id)
        .unwrap());
}
