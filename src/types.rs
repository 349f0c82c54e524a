//! Core data types used throughout the keepsake library
//!
//! This module contains the data model shared across components:
//!
//! - **Version records**: [`ContentVersion`], [`FileVersion`] - immutable
//!   snapshots of content items and virtual files
//! - **Backups**: [`BackupMetadata`], [`BackupContent`], [`AutoSavePoint`] -
//!   point-in-time exports of the aggregate content state
//! - **Restore**: [`RestorePoint`], [`RestoreOptions`], [`PrepareOutcome`],
//!   [`RestoreOutcome`] - the unified restore read model and its results
//! - **Protection**: [`ProtectionRule`], [`ProtectionWarning`] - declarative
//!   policy objects and the runtime records of rules firing
//! - **Hooks**: [`MonitorHook`], [`ConfirmationProvider`] - extensibility
//!   points for emergency backups and user confirmation
//!
//! All persistent types serialize to JSON since the backing key-value store
//! holds strings.
//!
//! # Examples
//!
//! ```rust
//! use keepsake::types::{RestoreOptions, ContentType};
//!
//! // Dry-run restore with the default safety backup
//! let options = RestoreOptions {
//!     dry_run: true,
//!     ..Default::default()
//! };
//! assert!(options.create_safety_backup);
//! assert_eq!(ContentType::Course.to_string(), "course");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blob::ContentRef;
use crate::error::Result;

/// Category of a content item tracked by the version store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Course content
    Course,
    /// Article content
    Article,
    /// Product content
    Product,
    /// Static page content
    Page,
    /// Personal-development document
    Document,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentType::Course => "course",
            ContentType::Article => "article",
            ContentType::Product => "product",
            ContentType::Page => "page",
            ContentType::Document => "document",
        };
        write!(f, "{}", s)
    }
}

/// Publication status of a content version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    /// Not yet published
    Draft,
    /// Live content
    Published,
    /// Superseded content kept for history
    Archived,
}

/// One immutable snapshot of a named content item
///
/// Created on every accepted content mutation; never mutated after creation.
/// Later versions supersede (not delete) earlier ones. The `(content_type,
/// content_id)` pair has a strictly increasing `revision` sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentVersion {
    /// Unique identifier for this version (UUID v4)
    pub id: String,
    /// Category of the content item
    pub content_type: ContentType,
    /// Identifier of the content item this version belongs to
    pub content_id: String,
    /// Human-readable title at the time of the snapshot
    pub title: String,
    /// Opaque content blob (the store never inspects its schema)
    pub content: serde_json::Value,
    /// Ordered list of human-readable change descriptions
    pub change_list: Vec<String>,
    /// Author of the change
    pub author: String,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Semantic version string ("1.0", "1.1", ...); minor bump per create
    pub version: String,
    /// Monotonic position in this item's own history
    pub revision: u64,
    /// Publication status
    pub status: ContentStatus,
}

/// Kind of change detected for a virtual file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Path appeared with content for the first time
    Created,
    /// Content differs from the latest known version
    Modified,
    /// Path disappeared from the store
    Deleted,
}

/// A snapshot of one virtual file (a key in the backing store)
///
/// The checksum always covers the *original* content, even when the stored
/// form went out of line through the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    /// Unique identifier for this version (UUID v4)
    pub id: String,
    /// Logical path of the file (the store key)
    pub file_path: String,
    /// Reference to the stored content
    pub content: ContentRef,
    /// Detection timestamp
    pub timestamp: DateTime<Utc>,
    /// Author attributed to the change
    pub author: String,
    /// Kind of change this version records
    pub change_type: ChangeType,
    /// SHA-256 of the original content, hex-encoded
    pub checksum: String,
    /// Size of the original content in bytes
    pub size: u64,
    /// Back-reference to the preceding version id (lookup only, no ownership)
    pub previous_version: Option<String>,
}

/// A change event produced by one monitor poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Logical path that changed
    pub path: String,
    /// What happened to it
    pub change_type: ChangeType,
}

/// Kind of backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    /// Complete aggregate state
    Full,
    /// Best-effort diff against the last full backup
    Incremental,
    /// Explicitly user-triggered full backup
    Manual,
}

/// Outcome status of a backup attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    /// Payload persisted and metadata recorded
    Completed,
    /// Collection or persistence failed; recorded so history shows attempts
    Failed,
    /// Backup currently being written
    InProgress,
}

/// Metadata describing one backup, kept separately from its payload
///
/// Metadata is small and lives in a history list so that listing backups
/// never requires loading full payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Unique identifier (also the payload key suffix)
    pub id: String,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Kind of backup
    pub backup_type: BackupType,
    /// Content categories included
    pub content_types: Vec<ContentType>,
    /// Number of content items captured
    pub item_count: usize,
    /// Serialized payload size in bytes
    pub file_size: u64,
    /// SHA-256 of the serialized payload, hex-encoded
    pub checksum: String,
    /// Outcome of the attempt
    pub status: BackupStatus,
    /// Human-readable description
    pub description: String,
    /// Author of the backup
    pub created_by: String,
}

/// The opaque content collections gathered from content providers
///
/// Each collection is an array of opaque records; the engine only counts
/// items and compares JSON values, it never inspects internal schemas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentCollections {
    /// Course records
    pub courses: Vec<serde_json::Value>,
    /// Article records
    pub articles: Vec<serde_json::Value>,
    /// Product records
    pub products: Vec<serde_json::Value>,
    /// Page records
    pub pages: Vec<serde_json::Value>,
    /// Personal-development documents
    pub documents: Vec<serde_json::Value>,
    /// Personal-development courses
    pub personal_courses: Vec<serde_json::Value>,
    /// Opaque user data
    pub user_data: serde_json::Value,
    /// Opaque settings
    pub settings: serde_json::Value,
}

impl ContentCollections {
    /// Total number of items across all collections
    pub fn item_count(&self) -> usize {
        self.courses.len()
            + self.articles.len()
            + self.products.len()
            + self.pages.len()
            + self.documents.len()
            + self.personal_courses.len()
    }

    /// Content categories with at least one item
    pub fn content_types(&self) -> Vec<ContentType> {
        let mut types = Vec::new();
        if !self.courses.is_empty() || !self.personal_courses.is_empty() {
            types.push(ContentType::Course);
        }
        if !self.articles.is_empty() {
            types.push(ContentType::Article);
        }
        if !self.products.is_empty() {
            types.push(ContentType::Product);
        }
        if !self.pages.is_empty() {
            types.push(ContentType::Page);
        }
        if !self.documents.is_empty() {
            types.push(ContentType::Document);
        }
        types
    }

    /// Keep only the first `n` items of every collection
    ///
    /// Used by autosave, which captures a lightweight partial snapshot
    /// rather than the whole aggregate state.
    pub fn truncated(&self, n: usize) -> Self {
        Self {
            courses: self.courses.iter().take(n).cloned().collect(),
            articles: self.articles.iter().take(n).cloned().collect(),
            products: self.products.iter().take(n).cloned().collect(),
            pages: self.pages.iter().take(n).cloned().collect(),
            documents: self.documents.iter().take(n).cloned().collect(),
            personal_courses: self.personal_courses.iter().take(n).cloned().collect(),
            user_data: self.user_data.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// A point-in-time export of the whole aggregate state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupContent {
    /// Collected content collections
    pub collections: ContentCollections,
    /// Embedded copy of the full content-version ledger
    pub version_history: Vec<ContentVersion>,
    /// Collection timestamp
    pub timestamp: DateTime<Utc>,
}

/// Who/what triggered an autosave point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    /// Periodic timer
    Auto,
    /// Explicit user action
    Manual,
    /// Lifecycle event (backgrounding, shutdown)
    System,
}

/// A lightweight, truncated snapshot taken on a fixed interval
///
/// Bounded ring buffer of at most 20 points; oldest evicted first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSavePoint {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Truncated snapshot content
    pub content: BackupContent,
    /// Human-readable description
    pub description: String,
    /// Trigger source
    pub triggered_by: TriggeredBy,
}

/// The kind of underlying record a restore point projects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePointKind {
    /// A full or incremental backup
    Backup,
    /// An autosave point
    AutoSave,
    /// A single file version
    FileVersion,
    /// A single content version
    ContentVersion,
    /// A manually-inserted restore point
    Manual,
}

/// A normalized, type-tagged projection over any recoverable past state
///
/// Restore points are a read-only view, never an owner, of the underlying
/// backup/autosave/file-version/content-version records. The `content`
/// field is lazy: listings leave it empty and [`prepare_restore`] loads it
/// on demand for backups.
///
/// [`prepare_restore`]: crate::restore::RestoreManager::prepare_restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorePoint {
    /// Identifier of the underlying record
    pub id: String,
    /// Kind of the underlying record
    pub kind: RestorePointKind,
    /// Timestamp of the underlying record
    pub timestamp: DateTime<Utc>,
    /// Monotonic sequence number used as a tie-break for identical timestamps
    pub seq: u64,
    /// Human-readable description
    pub description: String,
    /// Size of the underlying record in bytes (0 when unknown)
    pub size: u64,
    /// Checksum of the underlying record, when one was computed
    pub checksum: Option<String>,
    /// Whether the underlying record matches a protection rule
    pub protected: bool,
    /// Whether this point can actually be restored
    pub restoreable: bool,
    /// Lazily-loaded content; `None` until explicitly loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

/// Severity of a protection warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    /// Informational
    Low,
    /// Degraded durability or missing metadata
    Medium,
    /// Protected content touched
    High,
    /// Protected content deleted or last storage tier reached
    Critical,
}

/// Action a protection rule prescribes when it matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionAction {
    /// Record a warning, allow the operation
    Warn,
    /// Refuse the operation
    Block,
    /// Ask the user before proceeding
    RequireConfirmation,
}

/// User's eventual response to a fired protection rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningResponse {
    /// User cancelled the operation
    Cancel,
    /// User confirmed and the operation proceeded
    Proceed,
    /// User bypassed the rule entirely
    Bypass,
}

/// Declarative pattern-based protection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionRule {
    /// Rule identifier
    pub id: String,
    /// Human-readable rule name
    pub name: String,
    /// Content category the rule applies to, or all when `None`
    pub content_type: Option<ContentType>,
    /// Glob pattern matched against logical paths / item names
    pub pattern: String,
    /// Prescribed action on match
    pub action: ProtectionAction,
    /// Severity of the warnings this rule produces
    pub severity: WarningSeverity,
    /// Whether the user may bypass the rule
    pub bypass_allowed: bool,
}

/// Runtime record of one rule firing against one attempted action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionWarning {
    /// Warning identifier (UUID v4)
    pub id: String,
    /// Rule that fired, when the warning came from a configured rule
    pub rule_id: Option<String>,
    /// Severity at the time of firing
    pub severity: WarningSeverity,
    /// Human-readable message
    pub message: String,
    /// Logical path or item the warning is about
    pub target: String,
    /// Firing timestamp
    pub timestamp: DateTime<Utc>,
    /// Whether the warning demands user action
    pub action_required: bool,
    /// Whether the hosting UI acknowledged the warning
    pub acknowledged: bool,
    /// User's eventual response, once captured
    pub response: Option<WarningResponse>,
}

/// Options for restore operations
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Preview only; no mutation happens
    pub dry_run: bool,
    /// Create a full insurance backup before restoring (default true)
    pub create_safety_backup: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            create_safety_backup: true,
        }
    }
}

/// Preview of what a restore would touch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorePreview {
    /// Estimated number of affected content items
    pub estimated_items: usize,
    /// Kind of the restore point being previewed
    pub kind: RestorePointKind,
    /// Description carried over from the restore point
    pub description: String,
}

/// Result of the non-mutating restore preparation step
#[derive(Debug, Clone)]
pub struct PrepareOutcome {
    /// Whether the restore point resolved
    pub success: bool,
    /// The resolved restore point, with content loaded for backups
    pub restore_point: Option<RestorePoint>,
    /// Preview of the impact
    pub preview: Option<RestorePreview>,
    /// Advisory warnings (protected content, no safety backup, dry run)
    pub warnings: Vec<String>,
    /// Rough restore duration estimate in seconds
    pub estimated_secs: Option<u64>,
}

/// Result of the mutating restore path
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// Overall success of the dispatched restoration
    pub success: bool,
    /// Human-readable outcome summary
    pub message: String,
    /// Items (or collections) that were restored
    pub restored_items: Vec<String>,
    /// Non-fatal and fatal errors accumulated along the way
    pub errors: Vec<String>,
    /// Id of the insurance backup, when one was created
    pub backup_created: Option<String>,
}

/// Workspace state persisted across sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceState {
    /// Last time the session was active
    pub last_active: Option<DateTime<Utc>>,
    /// Accumulated session duration in seconds
    pub session_duration_secs: u64,
    /// Paths modified during the last session
    pub modified_files: Vec<String>,
    /// Id of the last successful backup
    pub last_backup_id: Option<String>,
    /// Id of the last recorded restore point
    pub last_restore_point_id: Option<String>,
}

/// Hook trait for monitor events
///
/// Lets the composition root react to protection events without the monitor
/// depending on the backup service directly. The workspace wires a hook that
/// triggers an emergency incremental backup on critical changes and surfaces
/// critical warnings immediately.
pub trait MonitorHook: Send + Sync {
    /// Called when a critical-pattern path changes
    ///
    /// Errors are logged by the monitor, never propagated; a failing
    /// emergency backup must not block version recording.
    fn on_critical_change(&self, path: &str, change_type: ChangeType) -> Result<()>;

    /// Called for every warning the monitor emits
    fn on_warning(&self, _warning: &ProtectionWarning) {}
}

/// Default hook that does nothing
#[derive(Debug)]
pub struct NoOpHook;

impl MonitorHook for NoOpHook {
    fn on_critical_change(&self, _path: &str, _change_type: ChangeType) -> Result<()> {
        Ok(())
    }
}

/// Blocking yes/no prompt capability
///
/// Used for protected-path restore confirmation, page-unload warnings and
/// destructive-action bypasses. The hosting UI supplies the real prompt.
pub trait ConfirmationProvider: Send + Sync {
    /// Ask the user to confirm; `true` means proceed
    fn confirm(&self, message: &str) -> bool;
}

/// Confirmation provider that accepts everything (headless default)
#[derive(Debug)]
pub struct AlwaysConfirm;

impl ConfirmationProvider for AlwaysConfirm {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

/// Confirmation provider that refuses everything
#[derive(Debug)]
pub struct NeverConfirm;

impl ConfirmationProvider for NeverConfirm {
    fn confirm(&self, _message: &str) -> bool {
        false
    }
}

/// Tunable limits and intervals for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepsakeConfig {
    /// Content at or below this byte length stays inline (default 100 KB)
    pub inline_threshold: usize,
    /// Versions retained per file path (default 5)
    pub per_path_history: usize,
    /// Distinct tracked paths before LRU eviction (default 50)
    pub max_tracked_paths: usize,
    /// Monitor poll interval in seconds (default 10)
    pub poll_interval_secs: u64,
    /// Autosave interval in seconds (default 300)
    pub autosave_interval_secs: u64,
    /// Scheduled backup interval in seconds (default 1800)
    pub backup_interval_secs: u64,
    /// Autosave ring-buffer capacity (default 20)
    pub autosave_capacity: usize,
    /// Items kept per collection in autosave snapshots (default 5)
    pub autosave_items_per_collection: usize,
    /// Manual restore-history ring-buffer capacity (default 50)
    pub restore_history_capacity: usize,
    /// Backup metadata retention window in days (default 365)
    pub retention_days: i64,
    /// Informational session duration cap in minutes (default 480)
    pub session_duration_cap_mins: u64,
    /// Re-apply the last session's restore point during initialization
    /// (default off)
    pub auto_restore_on_startup: bool,
}

impl Default for KeepsakeConfig {
    fn default() -> Self {
        Self {
            inline_threshold: 100 * 1024,
            per_path_history: 5,
            max_tracked_paths: 50,
            poll_interval_secs: 10,
            autosave_interval_secs: 300,
            backup_interval_secs: 1800,
            autosave_capacity: 20,
            autosave_items_per_collection: 5,
            restore_history_capacity: 50,
            retention_days: 365,
            session_duration_cap_mins: 480,
            auto_restore_on_startup: false,
        }
    }
}
