//! Backup service: full/incremental snapshots and autosave points
//!
//! Backups separate metadata from payloads: metadata is small and lives in
//! a history list so that listing backups never loads full payloads, while
//! each payload is persisted under its backup id. Failed attempts are
//! recorded too - history shows what was *attempted*, not just what
//! succeeded.
//!
//! Content flows through the [`ContentProvider`] trait in both directions:
//! `collect` gathers the aggregate state (a provider is free to prefer a
//! fast local read path over slower external calls), and `apply` writes a
//! payload back using last-writer-wins semantics at content-item
//! granularity - items present in the payload replace same-id items, items
//! absent from the payload are left untouched. The pre-restore insurance
//! backup is the sole conflict-recovery mechanism.
//!
//! Autosave points are lightweight truncated snapshots (a handful of items
//! per collection) kept in a bounded ring buffer of 20, oldest evicted
//! first.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::blob::checksum;
use crate::error::{KeepsakeError, Result};
use crate::storage::TieredStore;
use crate::types::{
    AutoSavePoint, BackupContent, BackupMetadata, BackupStatus, BackupType, ContentCollections,
    KeepsakeConfig, TriggeredBy,
};
use crate::versions::VersionStore;

const HISTORY_KEY: &str = "keepsake:backup-history";
const AUTOSAVE_KEY: &str = "keepsake:autosave-points";
const PAYLOAD_PREFIX: &str = "keepsake:backup:";

/// How many trailing version-ledger entries an autosave snapshot embeds
const AUTOSAVE_LEDGER_TAIL: usize = 20;

/// Read and write access to the aggregate content state
///
/// The engine treats every record as `{id, ...opaque fields}`; it counts
/// items and compares JSON values but never inspects internal schemas.
pub trait ContentProvider: Send + Sync {
    /// Gather the current aggregate content state
    fn collect(&self) -> Result<ContentCollections>;

    /// Apply collections back, last-writer-wins per item id
    ///
    /// Returns the number of items written.
    fn apply(&self, collections: &ContentCollections) -> Result<usize>;
}

/// Content provider backed by in-memory collections
///
/// The default provider for tests and for hosts that manage content
/// entirely client-side. `apply` merges by the `id` field of each record;
/// records without an `id` replace positionally nothing and are appended.
pub struct InMemoryProvider {
    collections: RwLock<ContentCollections>,
}

impl std::fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryProvider")
            .field("items", &self.collections.read().item_count())
            .finish()
    }
}

impl InMemoryProvider {
    /// Create a provider over the given initial collections
    pub fn new(collections: ContentCollections) -> Self {
        Self {
            collections: RwLock::new(collections),
        }
    }

    /// Snapshot the current collections
    pub fn snapshot(&self) -> ContentCollections {
        self.collections.read().clone()
    }

    /// Replace the current collections wholesale
    pub fn replace(&self, collections: ContentCollections) {
        *self.collections.write() = collections;
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(ContentCollections::default())
    }
}

impl ContentProvider for InMemoryProvider {
    fn collect(&self) -> Result<ContentCollections> {
        Ok(self.collections.read().clone())
    }

    fn apply(&self, incoming: &ContentCollections) -> Result<usize> {
        let mut guard = self.collections.write();
        // Reborrow past the guard so the per-collection borrows are disjoint
        let current = &mut *guard;
        let mut written = 0;
        for (ours, theirs) in [
            (&mut current.courses, &incoming.courses),
            (&mut current.articles, &incoming.articles),
            (&mut current.products, &incoming.products),
            (&mut current.pages, &incoming.pages),
            (&mut current.documents, &incoming.documents),
            (&mut current.personal_courses, &incoming.personal_courses),
        ] {
            written += merge_by_id(ours, theirs);
        }
        if !incoming.user_data.is_null() {
            current.user_data = incoming.user_data.clone();
        }
        if !incoming.settings.is_null() {
            current.settings = incoming.settings.clone();
        }
        Ok(written)
    }
}

/// Merge `incoming` into `target`, last-writer-wins by `id`
fn merge_by_id(target: &mut Vec<serde_json::Value>, incoming: &[serde_json::Value]) -> usize {
    let mut written = 0;
    for item in incoming {
        let id = item.get("id").cloned();
        match id.as_ref().and_then(|id| {
            target
                .iter()
                .position(|existing| existing.get("id") == Some(id))
        }) {
            Some(pos) => {
                if &target[pos] != item {
                    target[pos] = item.clone();
                    written += 1;
                }
            }
            None => {
                target.push(item.clone());
                written += 1;
            }
        }
    }
    written
}

/// Snapshots the aggregate content state, on demand or on a timer
pub struct BackupService {
    tiers: TieredStore,
    provider: Arc<dyn ContentProvider>,
    versions: Arc<VersionStore>,
    config: KeepsakeConfig,
    history: RwLock<Vec<BackupMetadata>>,
    autosaves: RwLock<Vec<AutoSavePoint>>,
}

impl std::fmt::Debug for BackupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupService")
            .field("backups", &self.history.read().len())
            .field("autosaves", &self.autosaves.read().len())
            .finish()
    }
}

impl BackupService {
    /// Open the service, loading persisted backup history and autosaves
    pub fn open(
        tiers: TieredStore,
        provider: Arc<dyn ContentProvider>,
        versions: Arc<VersionStore>,
        config: KeepsakeConfig,
    ) -> Self {
        let history: Vec<BackupMetadata> = tiers
            .read(HISTORY_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let autosaves: Vec<AutoSavePoint> = tiers
            .read(AUTOSAVE_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        info!(
            backups = history.len(),
            autosaves = autosaves.len(),
            "backup service opened"
        );

        Self {
            tiers,
            provider,
            versions,
            config,
            history: RwLock::new(history),
            autosaves: RwLock::new(autosaves),
        }
    }

    /// Create a full backup of the aggregate state
    ///
    /// On collection failure a `Failed` metadata entry is recorded *and*
    /// the error propagates - the one place in the engine where an error
    /// crosses the component boundary, so callers can react immediately
    /// while history still reflects the attempt.
    pub fn create_full_backup(
        &self,
        description: &str,
        created_by: &str,
    ) -> Result<BackupMetadata> {
        self.create_backup(BackupType::Full, description, created_by)
    }

    /// Create an explicitly user-triggered backup
    pub fn create_manual_backup(
        &self,
        description: &str,
        created_by: &str,
    ) -> Result<BackupMetadata> {
        self.create_backup(BackupType::Manual, description, created_by)
    }

    /// Create an incremental backup against the last successful full backup
    ///
    /// Delegates to a full backup when no completed full backup exists.
    /// The diff is best-effort: an item is included when its id is absent
    /// from the base payload or its JSON value differs.
    pub fn create_incremental_backup(
        &self,
        description: &str,
        created_by: &str,
    ) -> Result<BackupMetadata> {
        let Some(base_meta) = self.last_successful_backup(Some(BackupType::Full)) else {
            debug!("no full backup exists, incremental delegates to full");
            return self.create_full_backup(description, created_by);
        };

        let base = match self.load_payload(&base_meta.id) {
            Ok(Some(content)) => content,
            Ok(None) | Err(_) => {
                warn!(
                    base = %base_meta.id,
                    "base payload unavailable, incremental delegates to full"
                );
                return self.create_full_backup(description, created_by);
            }
        };

        let collections = match self.provider.collect() {
            Ok(c) => c,
            Err(err) => {
                self.record_failed_attempt(BackupType::Incremental, description, created_by);
                return Err(KeepsakeError::BackupFailed(format!(
                    "content collection failed: {err}"
                )));
            }
        };

        let diffed = diff_collections(&collections, &base.collections);
        self.persist_backup(BackupType::Incremental, diffed, description, created_by)
    }

    fn create_backup(
        &self,
        backup_type: BackupType,
        description: &str,
        created_by: &str,
    ) -> Result<BackupMetadata> {
        let collections = match self.provider.collect() {
            Ok(c) => c,
            Err(err) => {
                error!(%err, "content collection failed, recording failed backup");
                self.record_failed_attempt(backup_type, description, created_by);
                return Err(KeepsakeError::BackupFailed(format!(
                    "content collection failed: {err}"
                )));
            }
        };
        self.persist_backup(backup_type, collections, description, created_by)
    }

    fn persist_backup(
        &self,
        backup_type: BackupType,
        collections: ContentCollections,
        description: &str,
        created_by: &str,
    ) -> Result<BackupMetadata> {
        let content = BackupContent {
            version_history: self.versions.export_ledger(),
            collections,
            timestamp: chrono::Utc::now(),
        };
        let payload = serde_json::to_string(&content)?;
        let id = Uuid::new_v4().to_string();

        let receipt = self
            .tiers
            .write_with_fallback(&format!("{PAYLOAD_PREFIX}{id}"), &payload)?;
        if receipt.degraded() {
            warn!(backup_id = %id, tier = %receipt.tier_name, "backup payload stored at reduced durability");
        }

        let metadata = BackupMetadata {
            id: id.clone(),
            timestamp: content.timestamp,
            backup_type,
            content_types: content.collections.content_types(),
            item_count: content.collections.item_count(),
            file_size: payload.len() as u64,
            checksum: checksum(&payload),
            status: BackupStatus::Completed,
            description: description.to_string(),
            created_by: created_by.to_string(),
        };

        {
            let mut history = self.history.write();
            history.push(metadata.clone());
            self.persist_history(&history);
        }

        info!(
            backup_id = %id,
            ?backup_type,
            items = metadata.item_count,
            bytes = metadata.file_size,
            "backup created"
        );
        Ok(metadata)
    }

    fn record_failed_attempt(&self, backup_type: BackupType, description: &str, created_by: &str) {
        let metadata = BackupMetadata {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            backup_type,
            content_types: Vec::new(),
            item_count: 0,
            file_size: 0,
            checksum: String::new(),
            status: BackupStatus::Failed,
            description: description.to_string(),
            created_by: created_by.to_string(),
        };
        let mut history = self.history.write();
        history.push(metadata);
        self.persist_history(&history);
    }

    /// Record an autosave point: a truncated snapshot of the current state
    pub fn record_autosave_point(
        &self,
        triggered_by: TriggeredBy,
        description: &str,
    ) -> Result<AutoSavePoint> {
        let collections = self.provider.collect()?;
        let ledger = self.versions.export_ledger();
        let tail_start = ledger.len().saturating_sub(AUTOSAVE_LEDGER_TAIL);

        let point = AutoSavePoint {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            content: BackupContent {
                collections: collections.truncated(self.config.autosave_items_per_collection),
                version_history: ledger[tail_start..].to_vec(),
                timestamp: chrono::Utc::now(),
            },
            description: description.to_string(),
            triggered_by,
        };

        let mut autosaves = self.autosaves.write();
        autosaves.push(point.clone());
        while autosaves.len() > self.config.autosave_capacity {
            autosaves.remove(0);
        }
        self.persist_autosaves(&autosaves);
        debug!(autosave_id = %point.id, ?triggered_by, "autosave point recorded");
        Ok(point)
    }

    /// Restore the aggregate state from a backup payload
    ///
    /// Payload-first: when metadata for the id is missing the restoration
    /// still proceeds from the payload alone - bookkeeping can diverge from
    /// payload storage after quota evictions, and that divergence is a
    /// warning condition, not a hard failure. Returns `Ok(false)` when the
    /// payload itself is gone.
    pub fn restore_from_backup(&self, backup_id: &str) -> Result<bool> {
        let Some(content) = self.load_payload(backup_id)? else {
            warn!(backup_id, "backup payload not found");
            return Ok(false);
        };

        if self.get_metadata(backup_id).is_none() {
            warn!(backup_id, "restoring backup without metadata entry");
        }

        let written = self.provider.apply(&content.collections)?;
        if !content.version_history.is_empty() {
            self.versions.import_ledger(content.version_history)?;
        }
        info!(backup_id, items = written, "restored from backup");
        Ok(true)
    }

    /// Restore the truncated state of an autosave point
    pub fn restore_from_autosave(&self, autosave_id: &str) -> Result<bool> {
        let point = {
            let autosaves = self.autosaves.read();
            autosaves.iter().find(|p| p.id == autosave_id).cloned()
        };
        let Some(point) = point else {
            debug!(autosave_id, "autosave point not found");
            return Ok(false);
        };
        let written = self.provider.apply(&point.content.collections)?;
        info!(autosave_id, items = written, "restored from autosave point");
        Ok(true)
    }

    /// All backup metadata, newest first
    pub fn all_backups(&self) -> Vec<BackupMetadata> {
        let mut history = self.history.read().clone();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history
    }

    /// Most recent completed backup, optionally filtered by type
    pub fn last_successful_backup(&self, backup_type: Option<BackupType>) -> Option<BackupMetadata> {
        self.all_backups()
            .into_iter()
            .find(|m| {
                m.status == BackupStatus::Completed
                    && backup_type.map(|t| m.backup_type == t).unwrap_or(true)
            })
    }

    /// Metadata for one backup id
    pub fn get_metadata(&self, backup_id: &str) -> Option<BackupMetadata> {
        self.history.read().iter().find(|m| m.id == backup_id).cloned()
    }

    /// Load and parse a backup payload
    pub fn load_payload(&self, backup_id: &str) -> Result<Option<BackupContent>> {
        match self.tiers.read(&format!("{PAYLOAD_PREFIX}{backup_id}")) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Autosave points, oldest first
    pub fn autosave_points(&self) -> Vec<AutoSavePoint> {
        self.autosaves.read().clone()
    }

    /// The most recent autosave point
    pub fn latest_autosave_point(&self) -> Option<AutoSavePoint> {
        self.autosaves.read().last().cloned()
    }

    /// Look up one autosave point by id
    pub fn get_autosave(&self, autosave_id: &str) -> Option<AutoSavePoint> {
        self.autosaves.read().iter().find(|p| p.id == autosave_id).cloned()
    }

    /// Drop metadata entries and payloads older than the retention window
    ///
    /// Returns the number of backups removed. Payload blobs are deleted
    /// together with their metadata so retention actually frees storage.
    pub fn cleanup_old_backups(&self) -> usize {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.config.retention_days);
        let mut history = self.history.write();
        let before = history.len();
        let (expired, retained): (Vec<_>, Vec<_>) =
            history.drain(..).partition(|m| m.timestamp < cutoff);
        *history = retained;

        for metadata in &expired {
            self.tiers.remove(&format!("{PAYLOAD_PREFIX}{}", metadata.id));
        }
        if !expired.is_empty() {
            self.persist_history(&history);
            info!(removed = expired.len(), "expired backups cleaned up");
        }
        before - history.len()
    }

    fn persist_history(&self, history: &[BackupMetadata]) {
        match serde_json::to_string(history) {
            Ok(serialized) => {
                if let Err(err) = self.tiers.write_with_fallback(HISTORY_KEY, &serialized) {
                    error!(%err, "failed to persist backup history");
                }
            }
            Err(err) => error!(%err, "failed to serialize backup history"),
        }
    }

    fn persist_autosaves(&self, autosaves: &[AutoSavePoint]) {
        match serde_json::to_string(autosaves) {
            Ok(serialized) => {
                if let Err(err) = self.tiers.write_with_fallback(AUTOSAVE_KEY, &serialized) {
                    error!(%err, "failed to persist autosave points");
                }
            }
            Err(err) => error!(%err, "failed to serialize autosave points"),
        }
    }
}

/// Best-effort diff: items absent from the base, or differing by value
fn diff_collections(current: &ContentCollections, base: &ContentCollections) -> ContentCollections {
    ContentCollections {
        courses: diff_items(&current.courses, &base.courses),
        articles: diff_items(&current.articles, &base.articles),
        products: diff_items(&current.products, &base.products),
        pages: diff_items(&current.pages, &base.pages),
        documents: diff_items(&current.documents, &base.documents),
        personal_courses: diff_items(&current.personal_courses, &base.personal_courses),
        user_data: if current.user_data != base.user_data {
            current.user_data.clone()
        } else {
            serde_json::Value::Null
        },
        settings: if current.settings != base.settings {
            current.settings.clone()
        } else {
            serde_json::Value::Null
        },
    }
}

fn diff_items(current: &[serde_json::Value], base: &[serde_json::Value]) -> Vec<serde_json::Value> {
    current
        .iter()
        .filter(|item| match item.get("id") {
            Some(id) => base
                .iter()
                .find(|b| b.get("id") == Some(id))
                .map(|b| b != *item)
                .unwrap_or(true),
            None => !base.contains(item),
        })
        .cloned()
        .collect()
}
