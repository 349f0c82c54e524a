//! Main test module for Keepsake
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end protection scenarios
//! - Property-based tests for invariants
//! - Edge-case tests for boundary conditions

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use keepsake::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_empty_workspace_has_nothing_to_restore() {
        let workspace = session::WorkspaceBuilder::new().build().unwrap();
        workspace.initialize().unwrap();

        assert!(workspace.restore().available_restore_points().is_empty());
        assert!(workspace.backups().all_backups().is_empty());
        assert!(workspace.monitor().active_files().is_empty());
        assert!(workspace.versions().is_empty());
    }

    #[test]
    fn test_backup_of_empty_collections() {
        let workspace = session::WorkspaceBuilder::new().build().unwrap();
        workspace.initialize().unwrap();

        let metadata = workspace
            .backups()
            .create_full_backup("empty workspace", "tester")
            .unwrap();
        assert_eq!(metadata.item_count, 0);
        assert_eq!(metadata.status, BackupStatus::Completed);

        let outcome = workspace.restore_from(&metadata.id, &RestoreOptions::default());
        assert!(outcome.success);
    }

    #[test]
    fn test_unicode_content_roundtrip() {
        let workspace = session::WorkspaceBuilder::new().build().unwrap();
        workspace.initialize().unwrap();

        let content = "ÅÄÖ smörgåsbord: \u{1F600} \u{4F60}\u{597D}";
        let version = workspace
            .monitor()
            .create_file_version("innehåll/sida.txt", content, ChangeType::Created)
            .unwrap();
        assert_eq!(version.checksum, checksum(content));

        let history = workspace.monitor().get_file_history("innehåll/sida.txt");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_zero_capacity_store_never_errors_version_recording() {
        // A durable tier that rejects everything still must not make
        // version recording fail; data lands further down the ladder.
        let durable: Arc<MemoryStore> = Arc::new(MemoryStore::with_capacity(0));
        let workspace = session::WorkspaceBuilder::new()
            .durable_store(durable)
            .build()
            .unwrap();
        workspace.initialize().unwrap();

        for i in 0..10 {
            workspace
                .monitor()
                .create_file_version(
                    &format!("file{i}.txt"),
                    &format!("content {i}"),
                    ChangeType::Created,
                )
                .unwrap();
        }
        assert_eq!(workspace.monitor().active_files().len(), 10);
    }

    #[test]
    fn test_dismissing_twice_is_false_the_second_time() {
        let workspace = session::WorkspaceBuilder::new()
            .monitor_config(MonitorConfig {
                protected_patterns: vec!["*.cfg".to_string()],
                ..Default::default()
            })
            .build()
            .unwrap();
        workspace.initialize().unwrap();

        workspace
            .monitor()
            .create_file_version("site.cfg", "a=1", ChangeType::Modified)
            .unwrap();
        let warning = workspace.monitor().all_warnings().pop().unwrap();
        assert!(workspace.monitor().dismiss_warning(&warning.id));
        assert!(!workspace.monitor().dismiss_warning(&warning.id));
    }

    #[test]
    fn test_content_without_id_survives_restore() {
        let provider = Arc::new(InMemoryProvider::new(ContentCollections {
            pages: vec![json!({"title": "no id here"})],
            ..Default::default()
        }));
        let workspace = session::WorkspaceBuilder::new()
            .content_provider(provider.clone())
            .build()
            .unwrap();
        workspace.initialize().unwrap();

        let metadata = workspace
            .backups()
            .create_full_backup("anon items", "tester")
            .unwrap();
        provider.replace(ContentCollections::default());

        let outcome = workspace.restore_from(&metadata.id, &RestoreOptions::default());
        assert!(outcome.success);
        assert_eq!(provider.snapshot().pages.len(), 1);
    }
}
