//! Workspace composition and session lifecycle
//!
//! The [`Workspace`] is the composition root: it owns one instance of every
//! subsystem, wires the monitor's emergency-backup hook, and drives the
//! periodic work. Nothing in this crate spawns threads or timers; the host
//! calls [`Workspace::heartbeat`] with the current time and the workspace
//! fires whatever deadlines have passed (monitor poll, autosave, scheduled
//! backup).
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized -> Initializing -> Active <-> Backgrounded -> ShuttingDown
//!       ^                                                          |
//!       +----------------------------------------------------------+
//! ```
//!
//! [`initialize`] is idempotent; calling it on an active workspace is a
//! no-op. Backgrounding pauses the periodic work and records a checkpoint;
//! foregrounding resumes it. [`before_unload`] implements the
//! "unsaved changes" prompt, and [`shutdown`] takes an optional exit backup,
//! persists the final session summary and returns the workspace to
//! `Uninitialized`, from which a new session can start.
//!
//! # Examples
//!
//! ```rust
//! use keepsake::session::WorkspaceBuilder;
//!
//! let workspace = WorkspaceBuilder::new().build().unwrap();
//! workspace.initialize().unwrap();
//! workspace.heartbeat(chrono::Utc::now()).unwrap();
//! workspace.shutdown(false).unwrap();
//! ```
//!
//! [`initialize`]: Workspace::initialize
//! [`before_unload`]: Workspace::before_unload
//! [`shutdown`]: Workspace::shutdown

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backup::{BackupService, ContentProvider, InMemoryProvider};
use crate::blob::BlobStore;
use crate::error::Result;
use crate::monitor::{MonitorConfig, RevisionMonitor};
use crate::restore::RestoreManager;
use crate::storage::{KeyValueStore, MemoryStore, TieredStore};
use crate::types::{
    AlwaysConfirm, ChangeType, ConfirmationProvider, KeepsakeConfig, MonitorHook,
    ProtectionWarning, RestoreOptions, RestoreOutcome, WarningSeverity, WorkspaceState,
};
use crate::versions::VersionStore;

const STATE_KEY: &str = "keepsake:workspace-state";

/// Lifecycle state of a workspace session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built but not yet initialized
    Uninitialized,
    /// Initialization in progress
    Initializing,
    /// Periodic work running
    Active,
    /// Hidden; periodic work paused
    Backgrounded,
    /// Shutdown in progress; ends back at `Uninitialized`
    ShuttingDown,
}

/// Builder wiring every subsystem from explicit parts
///
/// All collaborators are injectable; the defaults give a fully in-memory
/// workspace suitable for tests and headless use.
pub struct WorkspaceBuilder {
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    provider: Arc<dyn ContentProvider>,
    confirm: Arc<dyn ConfirmationProvider>,
    config: KeepsakeConfig,
    monitor_config: MonitorConfig,
}

impl Default for WorkspaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceBuilder {
    /// Start from all-in-memory defaults
    pub fn new() -> Self {
        Self {
            durable: Arc::new(MemoryStore::new()),
            session: Arc::new(MemoryStore::new()),
            provider: Arc::new(InMemoryProvider::default()),
            confirm: Arc::new(AlwaysConfirm),
            config: KeepsakeConfig::default(),
            monitor_config: MonitorConfig::default(),
        }
    }

    /// The durable (most persistent) key-value store
    pub fn durable_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.durable = store;
        self
    }

    /// The session-scoped key-value store
    pub fn session_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.session = store;
        self
    }

    /// Where current content is read from and written back to
    pub fn content_provider(mut self, provider: Arc<dyn ContentProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// The yes/no prompt capability
    pub fn confirmation(mut self, confirm: Arc<dyn ConfirmationProvider>) -> Self {
        self.confirm = confirm;
        self
    }

    /// Engine limits and intervals
    pub fn config(mut self, config: KeepsakeConfig) -> Self {
        self.config = config;
        self
    }

    /// Monitor-specific limits and protection patterns
    pub fn monitor_config(mut self, config: MonitorConfig) -> Self {
        self.monitor_config = config;
        self
    }

    /// Wire everything together
    ///
    /// # Errors
    ///
    /// [`crate::KeepsakeError::InvalidPattern`] when a protection glob does
    /// not compile.
    pub fn build(self) -> Result<Workspace> {
        let ladder = || TieredStore::standard(self.durable.clone(), self.session.clone());

        // Oversized content starts one rung down: session first, then memory
        let blob_tiers = TieredStore::new(vec![
            crate::storage::StorageTier::new("session", self.session.clone()),
            crate::storage::StorageTier::new("memory", Arc::new(MemoryStore::new())),
        ]);
        let blobs = Arc::new(BlobStore::new(blob_tiers, self.config.inline_threshold));

        let versions = Arc::new(VersionStore::open(ladder()));
        let backups = Arc::new(BackupService::open(
            ladder(),
            self.provider.clone(),
            versions.clone(),
            self.config.clone(),
        ));
        let monitor = Arc::new(RevisionMonitor::open(
            ladder(),
            blobs,
            self.confirm.clone(),
            self.monitor_config,
        )?);
        let restore = Arc::new(RestoreManager::open(
            ladder(),
            backups.clone(),
            monitor.clone(),
            versions.clone(),
            self.provider.clone(),
            self.config.clone(),
        ));

        monitor.add_hook(Arc::new(EmergencyBackupHook {
            backups: backups.clone(),
        }));

        Ok(Workspace {
            tiers: ladder(),
            monitor,
            backups,
            versions,
            restore,
            confirm: self.confirm,
            config: self.config,
            state: RwLock::new(SessionState::Uninitialized),
            session_started: RwLock::new(None),
            last_autosave: RwLock::new(None),
            last_backup: RwLock::new(None),
            last_poll: RwLock::new(None),
            cap_warned: RwLock::new(false),
            workspace_state: RwLock::new(WorkspaceState::default()),
        })
    }
}

/// Hook wired by the builder: critical changes trigger an emergency
/// incremental backup, and critical warnings surface in the log immediately
struct EmergencyBackupHook {
    backups: Arc<BackupService>,
}

impl MonitorHook for EmergencyBackupHook {
    fn on_critical_change(&self, path: &str, change_type: ChangeType) -> Result<()> {
        info!(path, ?change_type, "critical change, taking emergency backup");
        self.backups.create_incremental_backup(
            &format!("Emergency backup after critical change to '{path}'"),
            "monitor",
        )?;
        Ok(())
    }

    fn on_warning(&self, warning: &ProtectionWarning) {
        if warning.severity == WarningSeverity::Critical {
            warn!(target = %warning.target, message = %warning.message, "critical protection warning");
        }
    }
}

/// The assembled engine plus its session lifecycle
pub struct Workspace {
    tiers: TieredStore,
    monitor: Arc<RevisionMonitor>,
    backups: Arc<BackupService>,
    versions: Arc<VersionStore>,
    restore: Arc<RestoreManager>,
    confirm: Arc<dyn ConfirmationProvider>,
    config: KeepsakeConfig,
    state: RwLock<SessionState>,
    session_started: RwLock<Option<DateTime<Utc>>>,
    last_autosave: RwLock<Option<DateTime<Utc>>>,
    last_backup: RwLock<Option<DateTime<Utc>>>,
    last_poll: RwLock<Option<DateTime<Utc>>>,
    cap_warned: RwLock<bool>,
    workspace_state: RwLock<WorkspaceState>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("state", &*self.state.read())
            .finish()
    }
}

impl Workspace {
    /// Bring the session up; calling again while active is a no-op
    ///
    /// Loads the persisted [`WorkspaceState`] and validates its recorded
    /// last restore point: a stale id (one whose underlying record no
    /// longer exists) is discarded with a warning rather than kept around
    /// to fail later. When [`KeepsakeConfig::auto_restore_on_startup`] is
    /// set, a validated restore point is re-applied during initialization;
    /// a failing startup restore is logged and initialization proceeds.
    pub fn initialize(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Active | SessionState::Initializing => return Ok(()),
                _ => *state = SessionState::Initializing,
            }
        }

        let mut loaded: WorkspaceState = self
            .tiers
            .read(STATE_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        if let Some(id) = loaded.last_restore_point_id.clone() {
            let still_exists = self
                .restore
                .available_restore_points()
                .iter()
                .any(|p| p.id == id);
            if !still_exists {
                warn!(id, "recorded restore point no longer exists, discarding");
                loaded.last_restore_point_id = None;
            } else if self.config.auto_restore_on_startup {
                let outcome = self.restore.perform_restore(&id, &RestoreOptions::default());
                if outcome.success {
                    info!(id, "re-applied last session's restore point");
                } else {
                    warn!(id, errors = ?outcome.errors, "startup restore did not complete");
                }
            }
        }

        let now = Utc::now();
        loaded.last_active = Some(now);
        *self.workspace_state.write() = loaded;
        *self.session_started.write() = Some(now);
        *self.last_autosave.write() = Some(now);
        *self.last_backup.write() = Some(now);
        *self.last_poll.write() = Some(now);
        *self.cap_warned.write() = false;

        self.persist_state()?;
        *self.state.write() = SessionState::Active;
        info!("workspace session active");
        Ok(())
    }

    /// Drive all periodic work that has come due at `now`
    ///
    /// A no-op unless the session is active. Individual deadline failures
    /// are logged and do not stop the remaining deadlines from firing.
    pub fn heartbeat(&self, now: DateTime<Utc>) -> Result<()> {
        if *self.state.read() != SessionState::Active {
            return Ok(());
        }

        if self.due(&self.last_poll, now, self.config.poll_interval_secs) {
            *self.last_poll.write() = Some(now);
            if let Err(err) = self.monitor.poll_once() {
                warn!(%err, "monitor poll failed");
            }
        }

        if self.due(&self.last_autosave, now, self.config.autosave_interval_secs) {
            *self.last_autosave.write() = Some(now);
            match self.restore.create_autosave_point("Periodic autosave") {
                Ok(point) => debug!(id = %point.id, "autosave point recorded"),
                Err(err) => warn!(%err, "autosave failed"),
            }
        }

        if self.due(&self.last_backup, now, self.config.backup_interval_secs) {
            *self.last_backup.write() = Some(now);
            match self.backups.create_full_backup("Scheduled backup", "scheduler") {
                Ok(metadata) => {
                    self.workspace_state.write().last_backup_id = Some(metadata.id);
                }
                Err(err) => warn!(%err, "scheduled backup failed"),
            }
        }

        self.check_session_cap(now);

        {
            let mut state = self.workspace_state.write();
            state.last_active = Some(now);
            if let Some(started) = *self.session_started.read() {
                state.session_duration_secs = (now - started).num_seconds().max(0) as u64;
            }
        }
        self.persist_state()
    }

    /// React to the host's visibility signal
    ///
    /// Hiding records a checkpoint and pauses periodic work; showing
    /// resumes it.
    pub fn visibility_changed(&self, visible: bool) {
        let mut state = self.state.write();
        match (*state, visible) {
            (SessionState::Active, false) => {
                *state = SessionState::Backgrounded;
                drop(state);
                debug!("workspace backgrounded, recording checkpoint");
                if let Err(err) = self.restore.create_autosave_point("Visibility checkpoint") {
                    warn!(%err, "background checkpoint failed");
                }
                if let Err(err) = self.persist_state() {
                    warn!(%err, "failed to persist state on background");
                }
            }
            (SessionState::Backgrounded, true) => {
                *state = SessionState::Active;
                drop(state);
                self.workspace_state.write().last_active = Some(Utc::now());
                debug!("workspace foregrounded");
            }
            _ => {}
        }
    }

    /// The "unsaved changes" gate for page unload
    ///
    /// Returns `true` when leaving is fine. Changes newer than the last
    /// successful backup, or an unacknowledged critical warning, route
    /// through the confirmation provider instead.
    pub fn before_unload(&self) -> bool {
        let unsaved = match (
            self.monitor.latest_modification(),
            self.backups.last_successful_backup(None),
        ) {
            (Some(modified), Some(backup)) => modified > backup.timestamp,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if unsaved || self.monitor.has_unacknowledged_critical() {
            return self
                .confirm
                .confirm("You have unsaved changes. Leave anyway?");
        }
        true
    }

    /// End the session, optionally taking an exit backup first
    ///
    /// Idempotent: a workspace that never started, or already shut down, is
    /// a no-op. A failing exit backup is logged and shutdown proceeds. The
    /// workspace ends back at `Uninitialized`, so [`initialize`] starts a
    /// fresh session over the same stores.
    ///
    /// [`initialize`]: Workspace::initialize
    pub fn shutdown(&self, exit_backup: bool) -> Result<()> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Uninitialized | SessionState::ShuttingDown => return Ok(()),
                _ => *state = SessionState::ShuttingDown,
            }
        }

        if exit_backup {
            match self
                .backups
                .create_manual_backup("Session exit backup", "workspace")
            {
                Ok(metadata) => {
                    self.workspace_state.write().last_backup_id = Some(metadata.id);
                }
                Err(err) => warn!(%err, "exit backup failed"),
            }
        }

        let removed = self.backups.cleanup_old_backups();
        if removed > 0 {
            debug!(removed, "expired backups removed at shutdown");
        }

        {
            let mut state = self.workspace_state.write();
            let now = Utc::now();
            state.last_active = Some(now);
            if let Some(started) = *self.session_started.read() {
                state.session_duration_secs = (now - started).num_seconds().max(0) as u64;
            }
            state.modified_files = self.monitor.active_files();
        }
        self.persist_state()?;
        *self.state.write() = SessionState::Uninitialized;
        info!("workspace session ended");
        Ok(())
    }

    /// Restore through the workspace so the session records the outcome
    pub fn restore_from(&self, id: &str, options: &RestoreOptions) -> RestoreOutcome {
        let outcome = self.restore.perform_restore(id, options);
        if outcome.success {
            self.workspace_state.write().last_restore_point_id = Some(id.to_string());
            if let Err(err) = self.persist_state() {
                warn!(%err, "failed to persist state after restore");
            }
        }
        outcome
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Snapshot of the persisted session summary
    pub fn workspace_state(&self) -> WorkspaceState {
        self.workspace_state.read().clone()
    }

    /// The revision monitor
    pub fn monitor(&self) -> &Arc<RevisionMonitor> {
        &self.monitor
    }

    /// The backup service
    pub fn backups(&self) -> &Arc<BackupService> {
        &self.backups
    }

    /// The content version store
    pub fn versions(&self) -> &Arc<VersionStore> {
        &self.versions
    }

    /// The restore manager
    pub fn restore(&self) -> &Arc<RestoreManager> {
        &self.restore
    }

    /// The active configuration
    pub fn config(&self) -> &KeepsakeConfig {
        &self.config
    }

    fn due(&self, last: &RwLock<Option<DateTime<Utc>>>, now: DateTime<Utc>, secs: u64) -> bool {
        match *last.read() {
            Some(then) => now - then >= Duration::seconds(secs as i64),
            None => true,
        }
    }

    /// Long sessions get one advisory log line; nothing is enforced
    fn check_session_cap(&self, now: DateTime<Utc>) {
        if *self.cap_warned.read() {
            return;
        }
        let Some(started) = *self.session_started.read() else {
            return;
        };
        let cap = Duration::minutes(self.config.session_duration_cap_mins as i64);
        if now - started >= cap {
            warn!(
                mins = self.config.session_duration_cap_mins,
                "session has exceeded the advisory duration cap"
            );
            *self.cap_warned.write() = true;
        }
    }

    fn persist_state(&self) -> Result<()> {
        let serialized = serde_json::to_string(&*self.workspace_state.read())?;
        if let Err(err) = self.tiers.write_with_fallback(STATE_KEY, &serialized) {
            warn!(%err, "failed to persist workspace state");
        }
        Ok(())
    }
}
