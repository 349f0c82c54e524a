//! Revision monitoring for virtual files
//!
//! A "file" here is a logical path: a key in the backing key-value store.
//! The [`RevisionMonitor`] polls watched paths, detects create/modify/delete
//! transitions against the latest known version, and retains a bounded
//! history per path. Deleted paths stay queryable but drop out of the
//! active-file listing.
//!
//! ## Per-path state machine
//!
//! Unknown → Tracked(created) → Tracked(modified)* → Tracked(deleted)
//!
//! ## Bounds
//!
//! - Per path: at most N most-recent versions (default 5), ring semantics.
//! - Globally: at most M distinct tracked paths (default 50);
//!   least-recently-modified paths are evicted first.
//!
//! ## Degradation on quota
//!
//! Persisting the version ledger follows a fixed ladder when the store
//! rejects the write: prune every path's history to its 2 most recent
//! versions and retry, then fall back to less durable tiers, finally to the
//! in-memory copy only. Each rung emits an escalating warning; the ladder
//! never lets a quota error escape `create_file_version`.
//!
//! ## Protection
//!
//! Paths matching the configured protected patterns raise a high-severity
//! warning on change (critical on deletion, which also demands action).
//! Paths matching the critical subset additionally fire the
//! [`MonitorHook::on_critical_change`] hook, which the workspace wires to an
//! emergency incremental backup.
//!
//! Beyond the raw pattern lists, [`MonitorConfig::rules`] accepts declarative
//! [`ProtectionRule`]s. A matching rule records a warning carrying its rule
//! id; on restore, a `Block` rule refuses the operation (confirmable when
//! `bypass_allowed`) and a `RequireConfirmation` rule asks first. Rules
//! scoped to a content type are skipped for path checks and consulted
//! through [`RevisionMonitor::matching_rules`] instead.

use globset::{Glob, GlobSet, GlobSetBuilder};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::blob::{checksum, BlobStore};
use crate::error::Result;
use crate::storage::TieredStore;
use crate::types::{
    ChangeType, ConfirmationProvider, ContentType, FileChange, FileVersion, MonitorHook,
    ProtectionAction, ProtectionRule, ProtectionWarning, WarningResponse, WarningSeverity,
};

const HISTORY_KEY: &str = "keepsake:file-revisions";
const WARNINGS_KEY: &str = "keepsake:revision-warnings";

/// How many versions each path keeps after an emergency prune
const EMERGENCY_RETAIN: usize = 2;

/// Configuration for the revision monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Versions retained per path (ring semantics)
    pub per_path_history: usize,
    /// Distinct tracked paths before LRU eviction
    pub max_tracked_paths: usize,
    /// Glob patterns marking protected paths
    pub protected_patterns: Vec<String>,
    /// Glob patterns marking the critical subset
    pub critical_patterns: Vec<String>,
    /// Declarative protection rules with per-rule action and severity
    pub rules: Vec<ProtectionRule>,
    /// Author attributed to detected changes
    pub author: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            per_path_history: 5,
            max_tracked_paths: 50,
            protected_patterns: Vec::new(),
            critical_patterns: Vec::new(),
            rules: Vec::new(),
            author: "system".to_string(),
        }
    }
}

/// Polls a virtual filesystem for changes and retains bounded history
pub struct RevisionMonitor {
    tiers: TieredStore,
    blobs: Arc<BlobStore>,
    confirm: Arc<dyn ConfirmationProvider>,
    config: MonitorConfig,
    protected: GlobSet,
    critical: GlobSet,
    rules: Vec<(ProtectionRule, GlobSet)>,
    watched: RwLock<BTreeSet<String>>,
    /// Per-path version history, oldest to newest
    history: RwLock<BTreeMap<String, Vec<FileVersion>>>,
    warnings: RwLock<Vec<ProtectionWarning>>,
    hooks: RwLock<Vec<Arc<dyn MonitorHook>>>,
}

impl std::fmt::Debug for RevisionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionMonitor")
            .field("watched", &self.watched.read().len())
            .field("tracked_paths", &self.history.read().len())
            .field("warnings", &self.warnings.read().len())
            .finish()
    }
}

impl RevisionMonitor {
    /// Open the monitor, compiling protection patterns and loading any
    /// persisted history and warnings
    ///
    /// # Errors
    ///
    /// [`crate::error::KeepsakeError::InvalidPattern`] when a protection
    /// pattern fails to compile.
    pub fn open(
        tiers: TieredStore,
        blobs: Arc<BlobStore>,
        confirm: Arc<dyn ConfirmationProvider>,
        config: MonitorConfig,
    ) -> Result<Self> {
        let protected = build_globset(&config.protected_patterns)?;
        let critical = build_globset(&config.critical_patterns)?;
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                let glob = build_globset(std::slice::from_ref(&rule.pattern))?;
                Ok((rule.clone(), glob))
            })
            .collect::<Result<Vec<_>>>()?;

        let history: BTreeMap<String, Vec<FileVersion>> = tiers
            .read(HISTORY_KEY)
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(map) => Some(map),
                Err(err) => {
                    warn!(%err, "file revision ledger unreadable, starting empty");
                    None
                }
            })
            .unwrap_or_default();

        let warnings: Vec<ProtectionWarning> = tiers
            .read(WARNINGS_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        info!(
            tracked = history.len(),
            warnings = warnings.len(),
            "revision monitor opened"
        );

        Ok(Self {
            tiers,
            blobs,
            confirm,
            config,
            protected,
            critical,
            rules,
            watched: RwLock::new(BTreeSet::new()),
            history: RwLock::new(history),
            warnings: RwLock::new(warnings),
            hooks: RwLock::new(Vec::new()),
        })
    }

    /// Register a hook for protection events
    pub fn add_hook(&self, hook: Arc<dyn MonitorHook>) {
        self.hooks.write().push(hook);
    }

    /// Register a path for polling
    pub fn watch(&self, path: &str) {
        self.watched.write().insert(path.to_string());
    }

    /// Compare every monitored path against its latest known version and
    /// record any transitions
    ///
    /// Returns the changes detected in this pass. Paths already known from
    /// history are polled even without an explicit [`watch`] registration.
    ///
    /// [`watch`]: RevisionMonitor::watch
    pub fn poll_once(&self) -> Result<Vec<FileChange>> {
        let paths: BTreeSet<String> = {
            let watched = self.watched.read();
            let history = self.history.read();
            watched
                .iter()
                .cloned()
                .chain(history.keys().cloned())
                .collect()
        };

        let mut changes = Vec::new();
        for path in paths {
            // Read through the whole ladder: content degraded to a lower
            // tier is still present, not deleted
            let current = self.tiers.read(&path);
            let latest = self.latest_version(&path);

            let change_type = match (&current, &latest) {
                (Some(_), None) => Some(ChangeType::Created),
                (Some(content), Some(last)) if checksum(content) != last.checksum => {
                    Some(ChangeType::Modified)
                }
                (None, Some(last)) if last.change_type != ChangeType::Deleted => {
                    Some(ChangeType::Deleted)
                }
                _ => None,
            };

            if let Some(change_type) = change_type {
                let content = current.unwrap_or_default();
                self.create_file_version(&path, &content, change_type)?;
                changes.push(FileChange {
                    path,
                    change_type,
                });
            }
        }

        if !changes.is_empty() {
            debug!(count = changes.len(), "poll detected changes");
        }
        Ok(changes)
    }

    /// Record a new version for a path
    ///
    /// The ordering within one call is fixed: checksum over the original
    /// content, content placement, per-path ring trim, global path-cap
    /// prune, warning emission, then ledger persistence (with the quota
    /// ladder). Quota exhaustion never escapes this method.
    pub fn create_file_version(
        &self,
        path: &str,
        content: &str,
        change_type: ChangeType,
    ) -> Result<FileVersion> {
        let digest = checksum(content);
        let (content_ref, receipt) = self.blobs.put(path, content)?;

        if let Some(receipt) = receipt.filter(|r| r.degraded()) {
            self.record_warning(
                None,
                WarningSeverity::Medium,
                format!(
                    "Oversized content for '{}' stored in volatile tier '{}'",
                    path, receipt.tier_name
                ),
                path,
                false,
            );
        }

        let version = FileVersion {
            id: Uuid::new_v4().to_string(),
            file_path: path.to_string(),
            content: content_ref,
            timestamp: chrono::Utc::now(),
            author: self.config.author.clone(),
            change_type,
            checksum: digest,
            size: content.len() as u64,
            previous_version: self.latest_version(path).map(|v| v.id),
        };

        {
            let mut history = self.history.write();
            let entry = history.entry(path.to_string()).or_default();
            entry.push(version.clone());

            // Per-path ring buffer
            while entry.len() > self.config.per_path_history {
                let evicted = entry.remove(0);
                self.blobs.remove(&evicted.content);
            }

            // Global path cap, least-recently-modified first
            while history.len() > self.config.max_tracked_paths {
                let lru = history
                    .iter()
                    .min_by_key(|(_, versions)| {
                        versions.last().map(|v| v.timestamp).unwrap_or_default()
                    })
                    .map(|(p, _)| p.clone());
                let Some(lru) = lru else { break };
                if let Some(versions) = history.remove(&lru) {
                    for v in versions {
                        self.blobs.remove(&v.content);
                    }
                }
                debug!(path = %lru, "evicted least-recently-modified path");
            }
        }

        trace!(path, ?change_type, size = version.size, "recorded file version");

        if self.protected.is_match(path) {
            let (severity, action_required) = if change_type == ChangeType::Deleted {
                (WarningSeverity::Critical, true)
            } else {
                (WarningSeverity::High, false)
            };
            self.record_warning(
                None,
                severity,
                format!("Protected path '{}' was {}", path, describe_change(change_type)),
                path,
                action_required,
            );
        }

        for rule in self.matching_rules(path, None) {
            self.record_warning(
                Some(rule.id.clone()),
                rule.severity,
                format!(
                    "Rule '{}': '{}' was {}",
                    rule.name,
                    path,
                    describe_change(change_type)
                ),
                path,
                rule.action == ProtectionAction::Block,
            );
        }

        if self.critical.is_match(path) {
            for hook in self.hooks.read().iter() {
                if let Err(err) = hook.on_critical_change(path, change_type) {
                    error!(path, %err, "critical-change hook failed");
                }
            }
        }

        self.persist_history();
        Ok(version)
    }

    /// Restore a path to the content of one of its recorded versions
    ///
    /// Protected paths require explicit confirmation; refusal aborts with no
    /// state change. Restoration is always forward-recorded: the write is
    /// itself captured as a new `Modified` version, never a silent rollback.
    ///
    /// Returns `Ok(false)` when the version is unknown, its content is no
    /// longer available, or the user declined.
    pub fn restore_file_version(&self, path: &str, version_id: &str) -> Result<bool> {
        let version = {
            let history = self.history.read();
            history
                .get(path)
                .and_then(|versions| versions.iter().find(|v| v.id == version_id).cloned())
        };
        let Some(version) = version else {
            debug!(path, version_id, "file version not found");
            return Ok(false);
        };

        let Some(content) = self.blobs.get(&version.content)? else {
            self.record_warning(
                None,
                WarningSeverity::Medium,
                format!(
                    "Content of version {} for '{}' is no longer available",
                    version_id, path
                ),
                path,
                false,
            );
            return Ok(false);
        };

        if !self.rules_permit_restore(path) {
            return Ok(false);
        }

        if self.protected.is_match(path) {
            let message = format!(
                "'{}' is protected. Restore it to the version from {}?",
                path,
                version.timestamp.to_rfc3339()
            );
            let confirmed = self.confirm.confirm(&message);
            let warning_id = self.record_warning(
                None,
                WarningSeverity::High,
                format!("Restore requested for protected path '{}'", path),
                path,
                false,
            );
            self.set_warning_response(
                &warning_id,
                if confirmed {
                    WarningResponse::Proceed
                } else {
                    WarningResponse::Cancel
                },
            );
            if !confirmed {
                info!(path, version_id, "protected restore declined by user");
                return Ok(false);
            }
        }

        let receipt = self.tiers.write_with_fallback(path, &content)?;
        if receipt.degraded() {
            self.record_warning(
                None,
                WarningSeverity::High,
                format!(
                    "Restored content for '{}' landed in volatile tier '{}'",
                    path, receipt.tier_name
                ),
                path,
                false,
            );
        }

        self.create_file_version(path, &content, ChangeType::Modified)?;
        info!(path, version_id, "restored file version");
        Ok(true)
    }

    /// Whether a path matches the protected patterns
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.is_match(path)
    }

    /// Latest recorded version for a path
    pub fn latest_version(&self, path: &str) -> Option<FileVersion> {
        self.history.read().get(path).and_then(|v| v.last().cloned())
    }

    /// Version history for a path, newest first; empty when untracked
    pub fn get_file_history(&self, path: &str) -> Vec<FileVersion> {
        self.history
            .read()
            .get(path)
            .map(|versions| versions.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Every version across every tracked path
    pub fn all_versions(&self) -> Vec<FileVersion> {
        self.history
            .read()
            .values()
            .flat_map(|versions| versions.iter().cloned())
            .collect()
    }

    /// Paths whose latest version is not a deletion
    pub fn active_files(&self) -> Vec<String> {
        self.history
            .read()
            .iter()
            .filter(|(_, versions)| {
                versions
                    .last()
                    .map(|v| v.change_type != ChangeType::Deleted)
                    .unwrap_or(false)
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Number of distinct tracked paths (deleted ones included)
    pub fn tracked_path_count(&self) -> usize {
        self.history.read().len()
    }

    /// Distinct tracked paths that any warning has ever targeted
    pub fn warned_paths(&self) -> Vec<String> {
        let history = self.history.read();
        let mut paths: Vec<String> = self
            .warnings
            .read()
            .iter()
            .map(|w| w.target.clone())
            .filter(|target| history.contains_key(target))
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Timestamp of the most recent recorded change across all paths
    pub fn latest_modification(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.history
            .read()
            .values()
            .filter_map(|versions| versions.last())
            .map(|v| v.timestamp)
            .max()
    }

    /// All warnings, newest first
    pub fn all_warnings(&self) -> Vec<ProtectionWarning> {
        let mut warnings = self.warnings.read().clone();
        warnings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        warnings
    }

    /// Critical warnings that still demand action
    pub fn critical_warnings(&self) -> Vec<ProtectionWarning> {
        self.all_warnings()
            .into_iter()
            .filter(|w| w.severity == WarningSeverity::Critical && w.action_required)
            .collect()
    }

    /// Whether any critical warning remains unacknowledged
    pub fn has_unacknowledged_critical(&self) -> bool {
        self.warnings
            .read()
            .iter()
            .any(|w| w.severity == WarningSeverity::Critical && w.action_required && !w.acknowledged)
    }

    /// Acknowledge a warning; returns whether it existed
    pub fn dismiss_warning(&self, warning_id: &str) -> bool {
        let mut warnings = self.warnings.write();
        let Some(warning) = warnings.iter_mut().find(|w| w.id == warning_id) else {
            return false;
        };
        warning.acknowledged = true;
        let snapshot = warnings.clone();
        drop(warnings);
        self.persist_warnings(&snapshot);
        true
    }

    /// Configured rules matching a target
    ///
    /// Path checks pass `None` and only see untyped rules; callers restoring
    /// typed content pass the content type and also see rules scoped to it.
    pub fn matching_rules(
        &self,
        target: &str,
        content_type: Option<ContentType>,
    ) -> Vec<ProtectionRule> {
        self.rules
            .iter()
            .filter(|(rule, glob)| {
                glob.is_match(target)
                    && match rule.content_type {
                        None => true,
                        Some(scoped) => content_type == Some(scoped),
                    }
            })
            .map(|(rule, _)| rule.clone())
            .collect()
    }

    /// Evaluate rule actions against a restore of `path`
    ///
    /// `Warn` records and proceeds. `RequireConfirmation` asks; a refusal
    /// aborts. `Block` aborts outright unless the rule allows bypass and the
    /// user confirms it. Every firing is recorded with the rule id and the
    /// user's response.
    fn rules_permit_restore(&self, path: &str) -> bool {
        for rule in self.matching_rules(path, None) {
            match rule.action {
                ProtectionAction::Warn => {
                    self.record_warning(
                        Some(rule.id.clone()),
                        rule.severity,
                        format!("Rule '{}' flagged restore of '{}'", rule.name, path),
                        path,
                        false,
                    );
                }
                ProtectionAction::RequireConfirmation => {
                    let confirmed = self
                        .confirm
                        .confirm(&format!("Rule '{}' applies to '{}'. Restore anyway?", rule.name, path));
                    let warning_id = self.record_warning(
                        Some(rule.id.clone()),
                        rule.severity,
                        format!("Rule '{}' required confirmation for '{}'", rule.name, path),
                        path,
                        false,
                    );
                    self.set_warning_response(
                        &warning_id,
                        if confirmed {
                            WarningResponse::Proceed
                        } else {
                            WarningResponse::Cancel
                        },
                    );
                    if !confirmed {
                        info!(path, rule = %rule.id, "restore declined under rule");
                        return false;
                    }
                }
                ProtectionAction::Block => {
                    let bypassed = rule.bypass_allowed
                        && self.confirm.confirm(&format!(
                            "Rule '{}' blocks restoring '{}'. Bypass it?",
                            rule.name, path
                        ));
                    let warning_id = self.record_warning(
                        Some(rule.id.clone()),
                        rule.severity,
                        format!("Rule '{}' blocked restore of '{}'", rule.name, path),
                        path,
                        !bypassed,
                    );
                    if bypassed {
                        self.set_warning_response(&warning_id, WarningResponse::Bypass);
                    } else {
                        self.set_warning_response(&warning_id, WarningResponse::Cancel);
                        info!(path, rule = %rule.id, "restore blocked by rule");
                        return false;
                    }
                }
            }
        }
        true
    }

    fn record_warning(
        &self,
        rule_id: Option<String>,
        severity: WarningSeverity,
        message: String,
        target: &str,
        action_required: bool,
    ) -> String {
        let warning = ProtectionWarning {
            id: Uuid::new_v4().to_string(),
            rule_id,
            severity,
            message: message.clone(),
            target: target.to_string(),
            timestamp: chrono::Utc::now(),
            action_required,
            acknowledged: false,
            response: None,
        };
        warn!(target, ?severity, "{message}");

        for hook in self.hooks.read().iter() {
            hook.on_warning(&warning);
        }

        let id = warning.id.clone();
        let snapshot = {
            let mut warnings = self.warnings.write();
            warnings.push(warning);
            warnings.clone()
        };
        self.persist_warnings(&snapshot);
        id
    }

    fn set_warning_response(&self, warning_id: &str, response: WarningResponse) {
        let mut warnings = self.warnings.write();
        if let Some(warning) = warnings.iter_mut().find(|w| w.id == warning_id) {
            warning.response = Some(response);
        }
    }

    /// Persist the ledger through the quota ladder; never propagates
    ///
    /// Ladder: primary as-is → prune every path to its 2 most recent and
    /// retry → less durable tiers → in-memory copy only. Each rung records
    /// an escalating warning.
    fn persist_history(&self) {
        let serialized = match serde_json::to_string(&*self.history.read()) {
            Ok(s) => s,
            Err(err) => {
                error!(%err, "failed to serialize file revision ledger");
                return;
            }
        };

        match self.tiers.primary().set(HISTORY_KEY, &serialized) {
            Ok(()) => return,
            Err(err) if err.is_quota() => {
                debug!("quota hit persisting revision ledger, pruning history");
            }
            Err(err) => {
                error!(%err, "failed to persist file revision ledger");
                return;
            }
        }

        // Rung 1: prune and retry the durable tier
        self.prune_all_paths(EMERGENCY_RETAIN);
        self.record_warning(
            None,
            WarningSeverity::Medium,
            format!(
                "Storage quota exhausted; file histories pruned to {} versions per path",
                EMERGENCY_RETAIN
            ),
            HISTORY_KEY,
            false,
        );

        let pruned = match serde_json::to_string(&*self.history.read()) {
            Ok(s) => s,
            Err(err) => {
                error!(%err, "failed to serialize pruned revision ledger");
                return;
            }
        };
        if self.tiers.primary().set(HISTORY_KEY, &pruned).is_ok() {
            return;
        }

        // Rung 2: walk the remaining tiers
        match self.tiers.write_with_fallback(HISTORY_KEY, &pruned) {
            Ok(receipt) if receipt.degraded() => {
                self.record_warning(
                    None,
                    WarningSeverity::High,
                    format!(
                        "File revision ledger persisted in volatile tier '{}'",
                        receipt.tier_name
                    ),
                    HISTORY_KEY,
                    false,
                );
            }
            Ok(_) => {}
            Err(_) => {
                // Rung 3: in-memory copy only
                self.record_warning(
                    None,
                    WarningSeverity::Critical,
                    "All storage tiers exhausted; file revisions held in memory only".to_string(),
                    HISTORY_KEY,
                    true,
                );
            }
        }
    }

    fn prune_all_paths(&self, retain: usize) {
        let mut history = self.history.write();
        for versions in history.values_mut() {
            while versions.len() > retain {
                let evicted = versions.remove(0);
                self.blobs.remove(&evicted.content);
            }
        }
    }

    fn persist_warnings(&self, warnings: &[ProtectionWarning]) {
        let serialized = match serde_json::to_string(warnings) {
            Ok(s) => s,
            Err(err) => {
                error!(%err, "failed to serialize warnings");
                return;
            }
        };
        if let Err(err) = self.tiers.write_with_fallback(WARNINGS_KEY, &serialized) {
            // Warnings stay queryable in memory even when unpersistable
            debug!(%err, "failed to persist warnings");
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn describe_change(change_type: ChangeType) -> &'static str {
    match change_type {
        ChangeType::Created => "created",
        ChangeType::Modified => "modified",
        ChangeType::Deleted => "deleted",
    }
}
