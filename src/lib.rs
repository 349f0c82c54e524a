//! # Keepsake - Content revision, backup and restore engine
//!
//! A client-side safety net for content-editing applications: it versions
//! every accepted change, takes periodic and emergency backups, and can put
//! any past state back, all on top of nothing more than string key-value
//! storage.
//!
//! ## Overview
//!
//! Keepsake gives a content workspace a layered protection model:
//! - Record an immutable version of every content mutation
//! - Poll logical file paths for changes and keep bounded per-path history
//! - Take full, incremental and emergency backups of the whole workspace
//! - Aggregate every recoverable state into one addressable restore-point list
//! - Restore any point with an automatic pre-restore insurance backup
//! - Warn about (and gate) changes to protected and critical paths
//!
//! ## Architecture
//!
//! The engine is built around a few deliberate constraints:
//!
//! - **String key-value storage only**: Every persistence concern bottoms
//!   out in a [`storage::KeyValueStore`], the least common denominator of
//!   browser-style storage. No filesystem, no database.
//! - **Tiered degradation**: Writes go through an explicit ladder of
//!   [`storage::StorageTier`]s ordered most-durable-first. Quota exhaustion
//!   is an expected outcome, not an exceptional one: writes degrade down
//!   the ladder and the [`storage::WriteReceipt`] says where the data
//!   landed.
//! - **Uniform content refs**: Whether a payload is small enough to stay
//!   inline or must be compressed out of line is hidden behind
//!   [`blob::ContentRef`]; call sites resolve both the same way.
//! - **Host-driven time**: Nothing here spawns threads or timers. The host
//!   calls [`session::Workspace::heartbeat`] with the current time and the
//!   workspace fires whatever deadlines have passed.
//! - **Explicit composition**: Every collaborator is injected through
//!   [`session::WorkspaceBuilder`]; there are no globals.
//!
//! ## Quick Start
//!
//! ```rust
//! use keepsake::session::WorkspaceBuilder;
//! use keepsake::types::RestoreOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let workspace = WorkspaceBuilder::new().build()?;
//! workspace.initialize()?;
//!
//! // Take a backup of the current workspace content
//! let backup = workspace.backups().create_full_backup("Initial state", "me")?;
//!
//! // Later: list everything that can be restored and go back
//! let points = workspace.restore().available_restore_points();
//! assert!(points.iter().any(|p| p.id == backup.id));
//!
//! let outcome = workspace.restore_from(&backup.id, &RestoreOptions::default());
//! assert!(outcome.success);
//!
//! workspace.shutdown(true)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Restore points
//!
//! A restore point is any recoverable past state, regardless of which
//! subsystem recorded it: a backup, an autosave snapshot, a file version,
//! a content version or a manually recorded point. The
//! [`restore::RestoreManager`] merges them all into one newest-first list
//! and restores any of them by id.
//!
//! ### Protection rules
//!
//! The [`monitor::RevisionMonitor`] matches paths against protected and
//! critical glob patterns. Protected paths warn on change and require
//! confirmation to restore over; critical paths additionally trigger an
//! emergency backup through the workspace's hook.
//!
//! ### Quota degradation
//!
//! Running out of storage must never lose the user's work. Version history
//! writes that hit quota prune history, retry, fall down the tier ladder,
//! and in the worst case keep the data in process memory, raising warnings
//! of increasing severity along the way.
//!
//! ## Error Handling
//!
//! Operations return `Result<T, KeepsakeError>`. Lookups of unknown ids
//! are `None`/`false`, not errors; quota exhaustion is
//! [`KeepsakeError::QuotaExceeded`] and is handled internally wherever the
//! design requires degradation instead of failure.
//!
//! ## Module Organization
//!
//! - [`session`]: Workspace composition root and session lifecycle
//! - [`backup`]: Full/incremental/emergency backups and autosave snapshots
//! - [`restore`]: Restore-point aggregation and restoration
//! - [`monitor`]: Path polling, bounded file history, protection warnings
//! - [`versions`]: Append-only content version ledger
//! - [`blob`]: Checksums and inline/out-of-line content storage
//! - [`storage`]: Key-value abstraction and the tier ladder
//! - [`commands`]: JSON command façade for embedding hosts
//! - [`types`]: Common types and data structures
//! - [`error`]: Error types and handling

pub mod backup;
pub mod blob;
pub mod commands;
pub mod error;
pub mod monitor;
pub mod restore;
pub mod session;
pub mod storage;
pub mod types;
pub mod versions;

// Re-export main types for convenience
pub use backup::{BackupService, ContentProvider, InMemoryProvider};
pub use blob::{checksum, BlobStore, ContentRef};
pub use commands::CommandSurface;
pub use error::{KeepsakeError, Result};
pub use monitor::{MonitorConfig, RevisionMonitor};
pub use restore::RestoreManager;
pub use session::{SessionState, Workspace, WorkspaceBuilder};
pub use storage::{KeyValueStore, MemoryStore, StorageTier, TieredStore, WriteReceipt};
pub use types::*;
pub use versions::VersionStore;
