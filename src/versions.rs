//! Append-only version ledger for content items
//!
//! Every accepted content mutation appends one immutable [`ContentVersion`]
//! to a per-(type, id) history. Versions are never mutated or deleted; later
//! versions supersede earlier ones. Restoration is informational: the store
//! reports what content a chosen version held, and the caller applies it.
//!
//! ## Numbering
//!
//! - `revision` is a strictly increasing integer per (type, id): previous
//!   max + 1, where the max of an empty history is 0.
//! - `version` is a semantic string bumped minor-wise on each create:
//!   "1.0" → "1.1" → "1.2" → ...
//!
//! Lookups on unknown items return `None` or an empty sequence, never an
//! error.

use parking_lot::RwLock;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::storage::TieredStore;
use crate::types::{ContentStatus, ContentType, ContentVersion};

const LEDGER_KEY: &str = "keepsake:content-versions";

/// Append-only, per-(type, id) content version ledger
pub struct VersionStore {
    tiers: TieredStore,
    ledger: RwLock<Vec<ContentVersion>>,
}

impl std::fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionStore")
            .field("versions", &self.ledger.read().len())
            .finish()
    }
}

impl VersionStore {
    /// Open the ledger, loading any previously persisted history
    ///
    /// An unreadable persisted ledger is logged and replaced with an empty
    /// one rather than failing startup.
    pub fn open(tiers: TieredStore) -> Self {
        let ledger = match tiers.read(LEDGER_KEY) {
            Some(raw) => match serde_json::from_str::<Vec<ContentVersion>>(&raw) {
                Ok(versions) => {
                    debug!(count = versions.len(), "loaded content version ledger");
                    versions
                }
                Err(err) => {
                    warn!(%err, "content version ledger unreadable, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Self {
            tiers,
            ledger: RwLock::new(ledger),
        }
    }

    /// Append a new version for a content item
    ///
    /// Revision is the item's previous max + 1 (1 for the first version);
    /// the semantic version gets a minor bump per create.
    pub fn create_version(
        &self,
        content_type: ContentType,
        content_id: &str,
        title: &str,
        content: serde_json::Value,
        change_list: Vec<String>,
        author: &str,
    ) -> Result<ContentVersion> {
        let mut ledger = self.ledger.write();
        let latest = ledger
            .iter()
            .rev()
            .find(|v| v.content_type == content_type && v.content_id == content_id);

        let revision = latest.map(|v| v.revision).unwrap_or(0) + 1;
        let version = match latest {
            Some(prev) => bump_minor(&prev.version),
            None => "1.0".to_string(),
        };

        let entry = ContentVersion {
            id: Uuid::new_v4().to_string(),
            content_type,
            content_id: content_id.to_string(),
            title: title.to_string(),
            content,
            change_list,
            author: author.to_string(),
            timestamp: chrono::Utc::now(),
            version,
            revision,
            status: ContentStatus::Draft,
        };

        trace!(
            content_type = %content_type,
            content_id,
            revision,
            version = %entry.version,
            "created content version"
        );

        ledger.push(entry.clone());
        self.persist(&ledger)?;
        Ok(entry)
    }

    /// Latest version of an item, or `None` when it has no history
    pub fn latest_version(
        &self,
        content_type: ContentType,
        content_id: &str,
    ) -> Option<ContentVersion> {
        self.ledger
            .read()
            .iter()
            .rev()
            .find(|v| v.content_type == content_type && v.content_id == content_id)
            .cloned()
    }

    /// All versions of an item, oldest to newest; empty when absent
    pub fn all_versions(&self, content_type: ContentType, content_id: &str) -> Vec<ContentVersion> {
        self.ledger
            .read()
            .iter()
            .filter(|v| v.content_type == content_type && v.content_id == content_id)
            .cloned()
            .collect()
    }

    /// Look up a version by its id
    pub fn get_version(&self, version_id: &str) -> Option<ContentVersion> {
        self.ledger.read().iter().find(|v| v.id == version_id).cloned()
    }

    /// Resolve a version for restoration
    ///
    /// The store does not mutate history here; it only tells the caller
    /// which content to apply as current. Unknown ids return `None`.
    pub fn restore_version(&self, version_id: &str) -> Option<ContentVersion> {
        let found = self.get_version(version_id);
        if let Some(ref version) = found {
            debug!(
                version_id,
                content_id = %version.content_id,
                revision = version.revision,
                "resolved content version for restore"
            );
        }
        found
    }

    /// Snapshot of the entire ledger, for embedding into backups
    pub fn export_ledger(&self) -> Vec<ContentVersion> {
        self.ledger.read().clone()
    }

    /// Replace the in-memory ledger (used when restoring from a backup)
    pub fn import_ledger(&self, versions: Vec<ContentVersion>) -> Result<()> {
        let mut ledger = self.ledger.write();
        *ledger = versions;
        self.persist(&ledger)
    }

    /// Total number of versions across all items
    pub fn len(&self) -> usize {
        self.ledger.read().len()
    }

    /// Whether the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.ledger.read().is_empty()
    }

    fn persist(&self, ledger: &[ContentVersion]) -> Result<()> {
        let serialized = serde_json::to_string(ledger)?;
        let receipt = self.tiers.write_with_fallback(LEDGER_KEY, &serialized)?;
        if receipt.degraded() {
            warn!(tier = %receipt.tier_name, "content version ledger persisted at reduced durability");
        }
        Ok(())
    }
}

/// Minor-bump a "major.minor" version string; unparsable input restarts at "1.0"
fn bump_minor(version: &str) -> String {
    let mut parts = version.splitn(2, '.');
    let major: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
    let minor: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    format!("{}.{}", major, minor + 1)
}
