//! Host-facing command surface
//!
//! A thin façade over [`Workspace`] for hosts that talk JSON rather than
//! Rust types (embedded scripting, IPC bridges, debug consoles). Every
//! command returns a uniform envelope and never panics or propagates an
//! error: failures come back as `{"success": false, "error": "..."}` so the
//! host can always parse the response.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::session::Workspace;
use crate::types::RestoreOptions;

/// JSON command façade over a workspace
#[derive(Debug)]
pub struct CommandSurface {
    workspace: Arc<Workspace>,
}

impl CommandSurface {
    /// Wrap an assembled workspace
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    /// Take a full backup now
    pub fn create_full_backup(&self, description: &str) -> Value {
        match self
            .workspace
            .backups()
            .create_full_backup(description, "command")
        {
            Ok(metadata) => ok(json!({ "backup": metadata })),
            Err(err) => fail(&err.to_string()),
        }
    }

    /// Take an incremental backup now
    pub fn create_incremental_backup(&self, description: &str) -> Value {
        match self
            .workspace
            .backups()
            .create_incremental_backup(description, "command")
        {
            Ok(metadata) => ok(json!({ "backup": metadata })),
            Err(err) => fail(&err.to_string()),
        }
    }

    /// All backup attempts, newest first
    pub fn list_backups(&self) -> Value {
        let backups = self.workspace.backups().all_backups();
        ok(json!({ "count": backups.len(), "backups": backups }))
    }

    /// Every restore point across every source, newest first
    pub fn list_restore_points(&self) -> Value {
        let points = self.workspace.restore().available_restore_points();
        ok(json!({ "count": points.len(), "restore_points": points }))
    }

    /// Restore from any restore point by id
    pub fn restore(&self, id: &str) -> Value {
        debug!(id, "restore requested through command surface");
        let outcome = self.workspace.restore_from(id, &RestoreOptions::default());
        json!({
            "success": outcome.success,
            "message": outcome.message,
            "restored_items": outcome.restored_items,
            "errors": outcome.errors,
            "backup_created": outcome.backup_created,
        })
    }

    /// Autosave points, oldest first
    pub fn list_autosave_points(&self) -> Value {
        let points: Vec<Value> = self
            .workspace
            .backups()
            .autosave_points()
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "timestamp": p.timestamp,
                    "description": p.description,
                    "triggered_by": p.triggered_by,
                    "items": p.content.collections.item_count(),
                })
            })
            .collect();
        ok(json!({ "count": points.len(), "autosave_points": points }))
    }

    /// Version history of one monitored path, newest first
    pub fn list_file_history(&self, path: &str) -> Value {
        let versions = self.workspace.monitor().get_file_history(path);
        ok(json!({ "path": path, "count": versions.len(), "versions": versions }))
    }

    /// Every protection warning, newest first
    pub fn list_warnings(&self) -> Value {
        let warnings = self.workspace.monitor().all_warnings();
        ok(json!({ "count": warnings.len(), "warnings": warnings }))
    }

    /// Acknowledge one warning by id
    pub fn dismiss_warning(&self, warning_id: &str) -> Value {
        if self.workspace.monitor().dismiss_warning(warning_id) {
            ok(json!({ "dismissed": warning_id }))
        } else {
            fail(&format!("warning '{warning_id}' not found"))
        }
    }

    /// Put one file version's content back as current
    pub fn restore_file_version(&self, path: &str, version_id: &str) -> Value {
        match self
            .workspace
            .monitor()
            .restore_file_version(path, version_id)
        {
            Ok(true) => ok(json!({ "path": path, "version": version_id })),
            Ok(false) => fail(&format!(
                "version '{version_id}' for '{path}' could not be restored"
            )),
            Err(err) => fail(&err.to_string()),
        }
    }
}

fn ok(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

fn fail(error: &str) -> Value {
    json!({ "success": false, "error": error })
}
