//! Unified restore management
//!
//! The [`RestoreManager`] merges every recoverable past state - backups,
//! autosave points, manually recorded points, file versions of warned
//! paths, and content versions - into one addressable, newest-first list of
//! [`RestorePoint`]s, and drives restoration with a safety-backup-first
//! policy.
//!
//! ## Aggregation
//!
//! Aggregation is partial, not all-or-nothing: a source that fails to
//! enumerate contributes nothing and is logged, while the other sources
//! still populate the result. Listing sorts by timestamp descending with a
//! monotonic sequence number as the tie-break.
//!
//! ## Restoration policy
//!
//! Unless explicitly disabled, [`perform_restore`] creates a full
//! "insurance" backup before touching anything. A failing insurance backup
//! is folded into the errors list and restoration proceeds anyway: the
//! design trades "can't guarantee a safety net" for "don't block the user's
//! explicit restore request". Every successful restore is itself recorded
//! as a synthetic restore point carrying the insurance-backup linkage, which
//! is what makes [`undo_last_restore`] possible.
//!
//! [`perform_restore`]: RestoreManager::perform_restore
//! [`undo_last_restore`]: RestoreManager::undo_last_restore

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backup::{BackupService, ContentProvider};
use crate::error::Result;
use crate::monitor::RevisionMonitor;
use crate::storage::TieredStore;
use crate::types::{
    BackupStatus, ContentCollections, ContentType, KeepsakeConfig, PrepareOutcome, RestoreOptions,
    RestoreOutcome, RestorePoint, RestorePointKind, RestorePreview, TriggeredBy,
};
use crate::versions::VersionStore;

const HISTORY_KEY: &str = "keepsake:restore-history";
const SEQ_KEY: &str = "keepsake:restore-seq";

/// Aggregates restore points and performs restorations
pub struct RestoreManager {
    tiers: TieredStore,
    backups: Arc<BackupService>,
    monitor: Arc<RevisionMonitor>,
    versions: Arc<VersionStore>,
    provider: Arc<dyn ContentProvider>,
    config: KeepsakeConfig,
    /// Manual and synthetic restore points, bounded ring
    history: RwLock<Vec<RestorePoint>>,
    /// Monotonic tie-break counter for identical timestamps
    seq: AtomicU64,
}

impl std::fmt::Debug for RestoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreManager")
            .field("history", &self.history.read().len())
            .field("seq", &self.seq.load(Ordering::Relaxed))
            .finish()
    }
}

impl RestoreManager {
    /// Open the manager, loading persisted restore history
    pub fn open(
        tiers: TieredStore,
        backups: Arc<BackupService>,
        monitor: Arc<RevisionMonitor>,
        versions: Arc<VersionStore>,
        provider: Arc<dyn ContentProvider>,
        config: KeepsakeConfig,
    ) -> Self {
        let history: Vec<RestorePoint> = tiers
            .read(HISTORY_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let stored_seq: u64 = tiers
            .read(SEQ_KEY)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let seq = stored_seq.max(history.iter().map(|p| p.seq).max().unwrap_or(0));

        debug!(history = history.len(), seq, "restore manager opened");

        Self {
            tiers,
            backups,
            monitor,
            versions,
            provider,
            config,
            history: RwLock::new(history),
            seq: AtomicU64::new(seq),
        }
    }

    /// Merge every source into one newest-first list of restore points
    ///
    /// Tolerates any single source being empty or erroring: the failing
    /// source is skipped and the rest still populate the result.
    pub fn available_restore_points(&self) -> Vec<RestorePoint> {
        let mut points = Vec::new();

        // Backups: restoreable only when the attempt completed. Projected
        // points derive seq from source creation order so ties within one
        // source still list newest first.
        let backups = self.backups.all_backups();
        let backup_count = backups.len();
        for (index, metadata) in backups.iter().enumerate() {
            points.push(RestorePoint {
                id: metadata.id.clone(),
                kind: RestorePointKind::Backup,
                timestamp: metadata.timestamp,
                seq: (backup_count - index) as u64,
                description: metadata.description.clone(),
                size: metadata.file_size,
                checksum: Some(metadata.checksum.clone()),
                protected: false,
                restoreable: metadata.status == BackupStatus::Completed,
                content: None,
            });
        }

        for (index, point) in self.backups.autosave_points().iter().enumerate() {
            points.push(RestorePoint {
                id: point.id.clone(),
                kind: RestorePointKind::AutoSave,
                timestamp: point.timestamp,
                seq: index as u64,
                description: point.description.clone(),
                size: 0,
                checksum: None,
                protected: false,
                restoreable: true,
                content: None,
            });
        }

        points.extend(self.history.read().iter().cloned());

        // File versions of every path the monitor has ever warned about.
        // A path can be warned without being protected (e.g. a storage
        // degradation), so the protected flag comes from the glob match.
        for path in self.monitor.warned_paths() {
            let protected = self.monitor.is_protected(&path);
            let history = self.monitor.get_file_history(&path);
            let version_count = history.len();
            for (index, version) in history.iter().enumerate() {
                points.push(RestorePoint {
                    id: version.id.clone(),
                    kind: RestorePointKind::FileVersion,
                    timestamp: version.timestamp,
                    seq: (version_count - index) as u64,
                    description: format!("{} ({:?})", version.file_path, version.change_type),
                    size: version.size,
                    checksum: Some(version.checksum.clone()),
                    protected,
                    restoreable: true,
                    content: None,
                });
            }
        }

        for (index, version) in self.versions.export_ledger().iter().enumerate() {
            points.push(RestorePoint {
                id: version.id.clone(),
                kind: RestorePointKind::ContentVersion,
                timestamp: version.timestamp,
                seq: index as u64,
                description: format!(
                    "{} '{}' v{} (r{})",
                    version.content_type, version.title, version.version, version.revision
                ),
                size: 0,
                checksum: None,
                protected: false,
                restoreable: true,
                content: None,
            });
        }

        points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.seq.cmp(&a.seq)));

        // One entry per underlying record; mirrored autosaves appear in two
        // sources and keep only their best-sorted projection
        let mut seen = std::collections::BTreeSet::new();
        points.retain(|p| seen.insert(p.id.clone()));
        points
    }

    /// Non-mutating dry-run step: resolve, preview and warn
    ///
    /// Unknown ids produce `success: false`, not an error.
    pub fn prepare_restore(&self, id: &str, options: &RestoreOptions) -> PrepareOutcome {
        let Some(mut point) = self.find_restore_point(id) else {
            return PrepareOutcome {
                success: false,
                restore_point: None,
                preview: None,
                warnings: vec![format!("Restore point '{}' not found", id)],
                estimated_secs: None,
            };
        };

        let mut warnings = Vec::new();
        let mut estimated_items = 0;

        if point.kind == RestorePointKind::Backup {
            // Lazy content load, backups only
            match self.backups.load_payload(id) {
                Ok(Some(content)) => {
                    estimated_items = content.collections.item_count();
                    point.content = serde_json::to_value(&content).ok();
                }
                Ok(None) => warnings.push("Backup payload is no longer available".to_string()),
                Err(err) => warnings.push(format!("Backup payload unreadable: {err}")),
            }
        } else if let Some(metadata) = self.backups.get_autosave(id) {
            estimated_items = metadata.content.collections.item_count();
        } else {
            estimated_items = 1;
        }

        if point.protected {
            warnings.push("This restore touches protected content".to_string());
        }
        if !options.create_safety_backup {
            warnings.push("No pre-restore backup will be made".to_string());
        }
        if options.dry_run {
            warnings.push("This is a dry run; nothing will be restored".to_string());
        }

        let preview = RestorePreview {
            estimated_items,
            kind: point.kind,
            description: point.description.clone(),
        };

        PrepareOutcome {
            success: true,
            restore_point: Some(point),
            preview: Some(preview),
            estimated_secs: Some(1 + (estimated_items as u64) / 100),
            warnings,
        }
    }

    /// The mutating restore path
    ///
    /// See the module docs for the safety-backup-first policy. Subsystem
    /// errors never escape the dispatch; they are folded into the returned
    /// errors list.
    pub fn perform_restore(&self, id: &str, options: &RestoreOptions) -> RestoreOutcome {
        let Some(point) = self.find_restore_point(id) else {
            return RestoreOutcome {
                success: false,
                message: format!("Restore point '{}' not found", id),
                restored_items: Vec::new(),
                errors: vec![format!("Restore point '{}' not found", id)],
                backup_created: None,
            };
        };

        if !point.restoreable {
            return RestoreOutcome {
                success: false,
                message: format!("Restore point '{}' is not restoreable", id),
                restored_items: Vec::new(),
                errors: vec![format!(
                    "Restore point '{}' ({:?}) cannot be restored",
                    id, point.kind
                )],
                backup_created: None,
            };
        }

        if options.dry_run {
            return RestoreOutcome {
                success: true,
                message: "Dry run; nothing was restored".to_string(),
                restored_items: Vec::new(),
                errors: Vec::new(),
                backup_created: None,
            };
        }

        let mut errors = Vec::new();
        let mut backup_created = None;

        if options.create_safety_backup {
            match self
                .backups
                .create_full_backup("Pre-restore insurance backup", "restore-manager")
            {
                Ok(metadata) => backup_created = Some(metadata.id),
                Err(err) => {
                    // Non-fatal: don't block the user's explicit request
                    warn!(%err, "insurance backup failed, proceeding with restore");
                    errors.push(format!("Insurance backup could not be created: {err}"));
                }
            }
        }

        let mut restored_items = Vec::new();
        let restored = match self.dispatch_restore(&point, &mut restored_items) {
            Ok(done) => done,
            Err(err) => {
                error!(id, %err, "restore dispatch failed");
                errors.push(format!("Restore failed: {err}"));
                false
            }
        };

        if restored {
            if let Err(err) = self.record_restore_marker(&point, backup_created.as_deref()) {
                errors.push(format!("Restore succeeded but history update failed: {err}"));
            }
            info!(id, kind = ?point.kind, "restore completed");
        }

        RestoreOutcome {
            success: restored,
            message: if restored {
                format!("Restored from {:?} point '{}'", point.kind, id)
            } else {
                format!("Restore from '{}' did not complete", id)
            },
            restored_items,
            errors,
            backup_created,
        }
    }

    /// Restore from the insurance backup taken just before the last restore
    ///
    /// Best-effort: returns `Ok(false)` when no restore has been recorded,
    /// or when the most recent restore was made with the safety backup
    /// disabled. Undo never reaches past the last restore to an older
    /// insurance backup.
    pub fn undo_last_restore(&self) -> Result<bool> {
        let marker_insurance = {
            let history = self.history.read();
            history
                .iter()
                .rev()
                .find(|p| {
                    p.kind == RestorePointKind::Manual
                        && p.content
                            .as_ref()
                            .map(|c| c.get("restored").is_some())
                            .unwrap_or(false)
                })
                .map(|p| {
                    p.content
                        .as_ref()
                        .and_then(|c| c.get("insurance_backup"))
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                })
        };
        let Some(insurance) = marker_insurance else {
            debug!("no restore recorded, nothing to undo");
            return Ok(false);
        };
        let Some(backup_id) = insurance else {
            debug!("last restore carried no insurance backup, cannot undo");
            return Ok(false);
        };
        info!(backup_id, "undoing last restore via insurance backup");
        self.backups.restore_from_backup(&backup_id)
    }

    /// Record a manual restore point
    ///
    /// A manual point is restoreable only when it carries content that
    /// parses as content collections.
    pub fn create_restore_point(
        &self,
        title: &str,
        description: &str,
        content: Option<serde_json::Value>,
    ) -> Result<RestorePoint> {
        let restoreable = content
            .as_ref()
            .map(|c| serde_json::from_value::<ContentCollections>(c.clone()).is_ok())
            .unwrap_or(false);
        let size = content
            .as_ref()
            .map(|c| c.to_string().len() as u64)
            .unwrap_or(0);

        let point = RestorePoint {
            id: Uuid::new_v4().to_string(),
            kind: RestorePointKind::Manual,
            timestamp: chrono::Utc::now(),
            seq: self.next_seq(),
            description: if description.is_empty() {
                title.to_string()
            } else {
                format!("{title}: {description}")
            },
            size,
            checksum: None,
            protected: false,
            restoreable,
            content,
        };
        self.push_history(point.clone())?;
        debug!(id = %point.id, "manual restore point recorded");
        Ok(point)
    }

    /// Record an autosave point and mirror it into the restore history
    pub fn create_autosave_point(&self, description: &str) -> Result<RestorePoint> {
        let autosave = self
            .backups
            .record_autosave_point(TriggeredBy::System, description)?;
        let point = RestorePoint {
            id: autosave.id.clone(),
            kind: RestorePointKind::AutoSave,
            timestamp: autosave.timestamp,
            seq: self.next_seq(),
            description: autosave.description.clone(),
            size: 0,
            checksum: None,
            protected: false,
            restoreable: true,
            content: None,
        };
        self.push_history(point.clone())?;
        Ok(point)
    }

    /// Number of recorded (manual + synthetic) restore points
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    fn find_restore_point(&self, id: &str) -> Option<RestorePoint> {
        self.available_restore_points()
            .into_iter()
            .find(|p| p.id == id)
    }

    fn dispatch_restore(
        &self,
        point: &RestorePoint,
        restored_items: &mut Vec<String>,
    ) -> Result<bool> {
        match point.kind {
            RestorePointKind::Backup => {
                let done = self.backups.restore_from_backup(&point.id)?;
                if done {
                    restored_items.push(format!("backup:{}", point.id));
                }
                Ok(done)
            }
            RestorePointKind::AutoSave => {
                let done = self.backups.restore_from_autosave(&point.id)?;
                if done {
                    restored_items.push(format!("autosave:{}", point.id));
                }
                Ok(done)
            }
            RestorePointKind::FileVersion => {
                let Some(version) = self
                    .monitor
                    .all_versions()
                    .into_iter()
                    .find(|v| v.id == point.id)
                else {
                    return Ok(false);
                };
                let done = self
                    .monitor
                    .restore_file_version(&version.file_path, &point.id)?;
                if done {
                    restored_items.push(version.file_path);
                }
                Ok(done)
            }
            RestorePointKind::ContentVersion => self.restore_content_version(point, restored_items),
            RestorePointKind::Manual => {
                let Some(content) = point.content.clone() else {
                    return Ok(false);
                };
                let collections: ContentCollections = serde_json::from_value(content)?;
                let written = self.provider.apply(&collections)?;
                restored_items.push(format!("manual:{} ({} items)", point.id, written));
                Ok(true)
            }
        }
    }

    /// Apply one content version as the item's current content
    ///
    /// The version store only reports what to apply; the manager writes it
    /// through the provider and forward-records a new version describing
    /// the restoration.
    fn restore_content_version(
        &self,
        point: &RestorePoint,
        restored_items: &mut Vec<String>,
    ) -> Result<bool> {
        let Some(version) = self.versions.restore_version(&point.id) else {
            return Ok(false);
        };

        let mut item = version.content.clone();
        if let serde_json::Value::Object(ref mut map) = item {
            map.entry("id")
                .or_insert_with(|| serde_json::Value::String(version.content_id.clone()));
        }
        let collections = collections_for(version.content_type, item);
        self.provider.apply(&collections)?;

        self.versions.create_version(
            version.content_type,
            &version.content_id,
            &version.title,
            version.content.clone(),
            vec![format!(
                "Restored from version {} (revision {})",
                version.version, version.revision
            )],
            "restore-manager",
        )?;

        restored_items.push(format!("{}:{}", version.content_type, version.content_id));
        Ok(true)
    }

    /// Append the synthetic point that makes the restore undoable
    fn record_restore_marker(
        &self,
        restored: &RestorePoint,
        insurance_backup: Option<&str>,
    ) -> Result<()> {
        let marker = RestorePoint {
            id: Uuid::new_v4().to_string(),
            kind: RestorePointKind::Manual,
            timestamp: chrono::Utc::now(),
            seq: self.next_seq(),
            description: format!("Restore of {:?} point '{}'", restored.kind, restored.id),
            size: 0,
            checksum: None,
            protected: false,
            restoreable: false,
            content: Some(serde_json::json!({
                "restored": restored.id,
                "restored_kind": restored.kind,
                "insurance_backup": insurance_backup,
            })),
        };
        self.push_history(marker)
    }

    fn push_history(&self, point: RestorePoint) -> Result<()> {
        let snapshot = {
            let mut history = self.history.write();
            history.push(point);
            while history.len() > self.config.restore_history_capacity {
                history.remove(0);
            }
            history.clone()
        };
        let serialized = serde_json::to_string(&snapshot)?;
        if let Err(err) = self.tiers.write_with_fallback(HISTORY_KEY, &serialized) {
            warn!(%err, "failed to persist restore history");
        }
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        let next = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        if let Err(err) = self.tiers.write_with_fallback(SEQ_KEY, &next.to_string()) {
            debug!(%err, "failed to persist restore sequence counter");
        }
        next
    }
}

fn collections_for(content_type: ContentType, item: serde_json::Value) -> ContentCollections {
    let mut collections = ContentCollections::default();
    match content_type {
        ContentType::Course => collections.courses.push(item),
        ContentType::Article => collections.articles.push(item),
        ContentType::Product => collections.products.push(item),
        ContentType::Page => collections.pages.push(item),
        ContentType::Document => collections.documents.push(item),
    }
    collections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::InMemoryProvider;
    use crate::blob::BlobStore;
    use crate::monitor::{MonitorConfig, RevisionMonitor};
    use crate::storage::{KeyValueStore, MemoryStore, StorageTier};
    use crate::types::{
        AlwaysConfirm, ChangeType, ProtectionAction, ProtectionRule, WarningSeverity,
    };
    use serde_json::json;

    fn fresh_tiers() -> TieredStore {
        TieredStore::new(vec![StorageTier::new(
            "local",
            Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>,
        )])
    }

    fn test_manager() -> (RestoreManager, Arc<InMemoryProvider>, Arc<BackupService>) {
        let provider = Arc::new(InMemoryProvider::new(ContentCollections {
            articles: vec![json!({"id": "a1", "body": "original"})],
            ..Default::default()
        }));
        let versions = Arc::new(VersionStore::open(fresh_tiers()));
        let backups = Arc::new(BackupService::open(
            fresh_tiers(),
            provider.clone(),
            versions.clone(),
            KeepsakeConfig::default(),
        ));
        let blobs = Arc::new(BlobStore::new(fresh_tiers(), 100 * 1024));
        let monitor = Arc::new(
            RevisionMonitor::open(
                fresh_tiers(),
                blobs,
                Arc::new(AlwaysConfirm),
                MonitorConfig::default(),
            )
            .unwrap(),
        );
        let manager = RestoreManager::open(
            fresh_tiers(),
            backups.clone(),
            monitor,
            versions,
            provider.clone(),
            KeepsakeConfig::default(),
        );
        (manager, provider, backups)
    }

    fn test_manager_with_monitor(
        monitor_config: MonitorConfig,
    ) -> (RestoreManager, Arc<RevisionMonitor>) {
        let provider = Arc::new(InMemoryProvider::default());
        let versions = Arc::new(VersionStore::open(fresh_tiers()));
        let backups = Arc::new(BackupService::open(
            fresh_tiers(),
            provider.clone(),
            versions.clone(),
            KeepsakeConfig::default(),
        ));
        let blobs = Arc::new(BlobStore::new(fresh_tiers(), 100 * 1024));
        let monitor = Arc::new(
            RevisionMonitor::open(fresh_tiers(), blobs, Arc::new(AlwaysConfirm), monitor_config)
                .unwrap(),
        );
        let manager = RestoreManager::open(
            fresh_tiers(),
            backups,
            monitor.clone(),
            versions,
            provider,
            KeepsakeConfig::default(),
        );
        (manager, monitor)
    }

    #[test]
    fn test_aggregation_merges_sources_newest_first() {
        let (manager, _, backups) = test_manager();
        backups.create_full_backup("first", "tester").unwrap();
        manager.create_autosave_point("auto").unwrap();
        manager
            .create_restore_point("manual", "by hand", None)
            .unwrap();

        let points = manager.available_restore_points();
        assert!(points.len() >= 3);
        for pair in points.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        // Autosave appears once despite living in two sources
        let autosaves = points
            .iter()
            .filter(|p| p.kind == RestorePointKind::AutoSave)
            .count();
        assert_eq!(autosaves, 1);
    }

    #[test]
    fn test_prepare_restore_unknown_id() {
        let (manager, _, _) = test_manager();
        let outcome = manager.prepare_restore("missing", &RestoreOptions::default());
        assert!(!outcome.success);
        assert!(outcome.restore_point.is_none());
        assert!(!outcome.warnings.is_empty());
    }

    #[test]
    fn test_prepare_restore_loads_backup_content_lazily() {
        let (manager, _, backups) = test_manager();
        let metadata = backups.create_full_backup("snapshot", "tester").unwrap();

        let listed = manager.find_restore_point(&metadata.id).unwrap();
        assert!(listed.content.is_none());

        let outcome = manager.prepare_restore(&metadata.id, &RestoreOptions::default());
        assert!(outcome.success);
        assert!(outcome.restore_point.unwrap().content.is_some());
        assert_eq!(outcome.preview.unwrap().estimated_items, 1);
    }

    #[test]
    fn test_prepare_warns_without_safety_backup_and_on_dry_run() {
        let (manager, _, backups) = test_manager();
        let metadata = backups.create_full_backup("snapshot", "tester").unwrap();
        let options = RestoreOptions {
            dry_run: true,
            create_safety_backup: false,
        };
        let outcome = manager.prepare_restore(&metadata.id, &options);
        assert!(outcome.warnings.iter().any(|w| w.contains("No pre-restore")));
        assert!(outcome.warnings.iter().any(|w| w.contains("dry run")));
    }

    #[test]
    fn test_perform_restore_unknown_id_mutates_nothing() {
        let (manager, _, _) = test_manager();
        let before = manager.history_len();
        let outcome = manager.perform_restore("does-not-exist", &RestoreOptions::default());
        assert!(!outcome.success);
        assert!(!outcome.errors.is_empty());
        assert!(outcome.backup_created.is_none());
        assert_eq!(manager.history_len(), before);
    }

    #[test]
    fn test_perform_restore_creates_insurance_backup() {
        let (manager, provider, backups) = test_manager();
        let metadata = backups.create_full_backup("snapshot", "tester").unwrap();

        // Mutate after the snapshot
        provider.replace(ContentCollections {
            articles: vec![json!({"id": "a1", "body": "mutated"})],
            ..Default::default()
        });

        let outcome = manager.perform_restore(&metadata.id, &RestoreOptions::default());
        assert!(outcome.success, "errors: {:?}", outcome.errors);
        assert!(outcome.backup_created.is_some());
        assert_eq!(
            provider.snapshot().articles[0],
            json!({"id": "a1", "body": "original"})
        );
    }

    #[test]
    fn test_undo_last_restore_uses_insurance_backup() {
        let (manager, provider, backups) = test_manager();
        let metadata = backups.create_full_backup("snapshot", "tester").unwrap();

        provider.replace(ContentCollections {
            articles: vec![json!({"id": "a1", "body": "mutated"})],
            ..Default::default()
        });

        let outcome = manager.perform_restore(&metadata.id, &RestoreOptions::default());
        assert!(outcome.success);
        assert_eq!(
            provider.snapshot().articles[0],
            json!({"id": "a1", "body": "original"})
        );

        // Undo brings back the pre-restore ("mutated") state
        assert!(manager.undo_last_restore().unwrap());
        assert_eq!(
            provider.snapshot().articles[0],
            json!({"id": "a1", "body": "mutated"})
        );
    }

    #[test]
    fn test_undo_without_recorded_restore_is_false() {
        let (manager, _, _) = test_manager();
        assert!(!manager.undo_last_restore().unwrap());
    }

    #[test]
    fn test_undo_stops_at_restore_without_insurance() {
        let (manager, provider, backups) = test_manager();
        let first = backups.create_full_backup("first", "tester").unwrap();

        provider.replace(ContentCollections {
            articles: vec![json!({"id": "a1", "body": "mutated"})],
            ..Default::default()
        });
        let outcome = manager.perform_restore(&first.id, &RestoreOptions::default());
        assert!(outcome.success);

        // Second restore skips the safety backup
        let second = backups.create_full_backup("second", "tester").unwrap();
        provider.replace(ContentCollections {
            articles: vec![json!({"id": "a1", "body": "again"})],
            ..Default::default()
        });
        let options = RestoreOptions {
            create_safety_backup: false,
            ..Default::default()
        };
        let outcome = manager.perform_restore(&second.id, &options);
        assert!(outcome.success);
        let state = provider.snapshot();

        // Undo must not reach past it to the first restore's insurance
        assert!(!manager.undo_last_restore().unwrap());
        assert_eq!(provider.snapshot().articles, state.articles);
    }

    #[test]
    fn test_warned_unprotected_path_lists_as_unprotected() {
        let config = MonitorConfig {
            protected_patterns: vec!["vault/*".to_string()],
            rules: vec![ProtectionRule {
                id: "flag-plain".to_string(),
                name: "Flag plain files".to_string(),
                content_type: None,
                pattern: "plain.txt".to_string(),
                action: ProtectionAction::Warn,
                severity: WarningSeverity::Medium,
                bypass_allowed: false,
            }],
            ..Default::default()
        };
        let (manager, monitor) = test_manager_with_monitor(config);

        monitor
            .create_file_version("vault/keys.txt", "secret", ChangeType::Created)
            .unwrap();
        monitor
            .create_file_version("plain.txt", "ordinary", ChangeType::Created)
            .unwrap();

        let points = manager.available_restore_points();
        let by_path = |needle: &str| {
            points
                .iter()
                .find(|p| p.kind == RestorePointKind::FileVersion && p.description.contains(needle))
                .unwrap()
        };
        assert!(by_path("vault/keys.txt").protected);
        assert!(!by_path("plain.txt").protected);

        // No protected-content advisory for the merely-warned path
        let outcome = manager.prepare_restore(&by_path("plain.txt").id, &RestoreOptions::default());
        assert!(outcome.success);
        assert!(!outcome
            .warnings
            .iter()
            .any(|w| w.contains("protected content")));
    }

    #[test]
    fn test_restore_content_version_is_forward_recorded() {
        let (manager, provider, _) = test_manager();
        let v1 = manager
            .versions
            .create_version(
                ContentType::Article,
                "a1",
                "Article",
                json!({"id": "a1", "body": "v1"}),
                vec!["initial".to_string()],
                "author",
            )
            .unwrap();
        manager
            .versions
            .create_version(
                ContentType::Article,
                "a1",
                "Article",
                json!({"id": "a1", "body": "v2"}),
                vec!["edit".to_string()],
                "author",
            )
            .unwrap();

        let options = RestoreOptions {
            create_safety_backup: false,
            ..Default::default()
        };
        let outcome = manager.perform_restore(&v1.id, &options);
        assert!(outcome.success, "errors: {:?}", outcome.errors);
        assert_eq!(
            provider.snapshot().articles[0],
            json!({"id": "a1", "body": "v1"})
        );
        // The restoration appended revision 3
        let latest = manager
            .versions
            .latest_version(ContentType::Article, "a1")
            .unwrap();
        assert_eq!(latest.revision, 3);
    }

    #[test]
    fn test_restore_history_ring_is_bounded() {
        let (manager, _, _) = test_manager();
        for i in 0..55 {
            manager
                .create_restore_point(&format!("point {i}"), "", None)
                .unwrap();
        }
        assert_eq!(manager.history_len(), 50);
    }

    #[test]
    fn test_dry_run_perform_mutates_nothing() {
        let (manager, provider, backups) = test_manager();
        let metadata = backups.create_full_backup("snapshot", "tester").unwrap();
        provider.replace(ContentCollections::default());

        let options = RestoreOptions {
            dry_run: true,
            ..Default::default()
        };
        let outcome = manager.perform_restore(&metadata.id, &options);
        assert!(outcome.success);
        assert!(outcome.backup_created.is_none());
        assert_eq!(provider.snapshot().item_count(), 0);
    }
}
