//! Property-based testing for Keepsake
//!
//! Uses proptest to verify invariants and properties across
//! randomly generated inputs and operations.

use keepsake::*;
use proptest::prelude::*;
use std::sync::Arc;

/// A randomly generated edit against the revision monitor
#[derive(Debug, Clone)]
pub enum EditOperation {
    Write { path: String, content: String },
    Delete { path: String },
}

fn path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "pages/[a-z]{1,8}\\.html",
        "content/[a-z]{1,6}/[a-z]{1,6}\\.md",
        "[a-z]{2,10}\\.txt",
    ]
}

fn content_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 \n]{1,500}",
        // Repetitive content that compresses well
        (any::<char>().prop_filter("printable", |c| !c.is_control()), 1..2000usize)
            .prop_map(|(c, n)| c.to_string().repeat(n)),
    ]
}

fn edit_strategy() -> impl Strategy<Value = EditOperation> {
    prop_oneof![
        3 => (path_strategy(), content_strategy())
            .prop_map(|(path, content)| EditOperation::Write { path, content }),
        1 => path_strategy().prop_map(|path| EditOperation::Delete { path }),
    ]
}

fn monitor() -> RevisionMonitor {
    let tiers = TieredStore::standard(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()));
    let blob_tiers = TieredStore::new(vec![StorageTier::new(
        "session",
        Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>,
    )]);
    let blobs = Arc::new(BlobStore::new(blob_tiers, 256));
    RevisionMonitor::open(tiers, blobs, Arc::new(AlwaysConfirm), MonitorConfig::default()).unwrap()
}

proptest! {
    /// Identical input always hashes to the same 64-hex-char digest,
    /// distinct input practically never collides with a known digest
    #[test]
    fn prop_checksum_is_stable_and_hex(content in ".{0,2000}") {
        let a = checksum(&content);
        let b = checksum(&content);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), 64);
        prop_assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    /// Content survives the inline/out-of-line decision untouched
    #[test]
    fn prop_blob_roundtrip(content in "[ -~åäöÅÄÖ]{0,4000}", threshold in 0usize..1024) {
        let tiers = TieredStore::new(vec![StorageTier::new(
            "session",
            Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>,
        )]);
        let blobs = BlobStore::new(tiers, threshold);

        let (r, _) = blobs.put("prop", &content).unwrap();
        prop_assert_eq!(r.is_inline(), content.len() <= threshold);
        prop_assert_eq!(r.size(), content.len() as u64);
        prop_assert_eq!(blobs.get(&r).unwrap().unwrap(), content);
    }

    /// Revisions per item are exactly 1..=n in creation order
    #[test]
    fn prop_revisions_are_dense_and_monotonic(edits in prop::collection::vec(("id[0-9]", "[a-z]{1,20}"), 1..40)) {
        let tiers = TieredStore::new(vec![StorageTier::new(
            "local",
            Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>,
        )]);
        let store = VersionStore::open(tiers);

        for (id, body) in &edits {
            store
                .create_version(
                    ContentType::Article,
                    id,
                    "Prop",
                    serde_json::json!({ "body": body }),
                    vec![],
                    "prop",
                )
                .unwrap();
        }

        let ids: std::collections::BTreeSet<_> = edits.iter().map(|(id, _)| id.clone()).collect();
        for id in ids {
            let revisions: Vec<u64> = store
                .all_versions(ContentType::Article, &id)
                .iter()
                .map(|v| v.revision)
                .collect();
            let expected: Vec<u64> = (1..=revisions.len() as u64).collect();
            prop_assert_eq!(revisions, expected);
        }
    }

    /// Per-path history and the tracked-path set stay inside their rings
    /// no matter what sequence of edits arrives
    #[test]
    fn prop_history_rings_stay_bounded(ops in prop::collection::vec(edit_strategy(), 1..120)) {
        let monitor = monitor();

        for op in &ops {
            match op {
                EditOperation::Write { path, content } => {
                    monitor
                        .create_file_version(path, content, ChangeType::Modified)
                        .unwrap();
                }
                EditOperation::Delete { path } => {
                    // Deleting an untracked path is a legal no-op edit
                    monitor
                        .create_file_version(path, "", ChangeType::Deleted)
                        .unwrap();
                }
            }
        }

        let config = MonitorConfig::default();
        let paths = monitor.all_versions();
        let tracked: std::collections::BTreeSet<_> =
            paths.iter().map(|v| v.file_path.clone()).collect();
        prop_assert!(tracked.len() <= config.max_tracked_paths);
        for path in tracked {
            prop_assert!(monitor.get_file_history(&path).len() <= config.per_path_history);
        }
    }

    /// Restore points always come back newest-first regardless of how
    /// many were recorded
    #[test]
    fn prop_restore_listing_is_sorted(count in 1usize..30) {
        let workspace = session::WorkspaceBuilder::new().build().unwrap();
        workspace.initialize().unwrap();

        for i in 0..count {
            workspace
                .restore()
                .create_restore_point(&format!("point {i}"), "", None)
                .unwrap();
        }

        let points = workspace.restore().available_restore_points();
        prop_assert_eq!(points.len(), count.min(workspace.config().restore_history_capacity));
        for pair in points.windows(2) {
            prop_assert!(
                (pair[0].timestamp, pair[0].seq) >= (pair[1].timestamp, pair[1].seq)
            );
        }
    }
}
