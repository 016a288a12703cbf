use std::fmt;
use std::path::PathBuf;

use bytesize::ByteSize;

use super::scan::Inventory;
use super::state::RemoteState;

/// An individual action determined by diffing the inventory against remote state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Local file never uploaded (or state was reset).
    UploadNew {
        path: String,
        local: PathBuf,
        size: u64,
    },
    /// Local file modified after its last confirmed upload.
    UploadChanged {
        path: String,
        local: PathBuf,
        size: u64,
    },
    /// Tracked remote file with no local counterpart.
    DeleteOrphan { path: String },
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::UploadNew { path, size, .. } => {
                write!(f, "  UPLOAD  {} ({})", path, ByteSize(*size))
            }
            SyncAction::UploadChanged { path, size, .. } => {
                write!(f, "  UPDATE  {} ({}, changed)", path, ByteSize(*size))
            }
            SyncAction::DeleteOrphan { path } => write!(f, "  DELETE  {}", path),
        }
    }
}

/// A computed pass: uploads first, then deletions.
#[derive(Debug)]
pub struct SyncPlan {
    pub actions: Vec<SyncAction>,
    pub total_upload_bytes: u64,
    pub files_to_upload: u64,
    pub files_to_update: u64,
    pub files_to_delete: u64,
    pub files_unchanged: u64,
}

impl SyncPlan {
    /// Diff `inventory` against `state`. `state` must already be seeded;
    /// an unset state is treated as empty.
    pub fn compute(inventory: &Inventory, state: &RemoteState) -> Self {
        let mut actions = Vec::new();
        let mut files_unchanged = 0u64;

        for record in inventory.iter() {
            if !state.needs_upload(record) {
                files_unchanged += 1;
                continue;
            }
            let action = if state.synced_at(&record.relative).is_some() {
                SyncAction::UploadChanged {
                    path: record.relative.clone(),
                    local: record.absolute.clone(),
                    size: record.size,
                }
            } else {
                SyncAction::UploadNew {
                    path: record.relative.clone(),
                    local: record.absolute.clone(),
                    size: record.size,
                }
            };
            actions.push(action);
        }

        for path in state.orphans(inventory) {
            actions.push(SyncAction::DeleteOrphan { path });
        }

        let mut plan = Self::from_actions(actions);
        plan.files_unchanged = files_unchanged;
        plan
    }

    /// Build a SyncPlan from a list of actions, computing summary counts.
    pub fn from_actions(actions: Vec<SyncAction>) -> Self {
        let mut total_upload_bytes = 0u64;
        let mut files_to_upload = 0u64;
        let mut files_to_update = 0u64;
        let mut files_to_delete = 0u64;

        for action in &actions {
            match action {
                SyncAction::UploadNew { size, .. } => {
                    files_to_upload += 1;
                    total_upload_bytes += size;
                }
                SyncAction::UploadChanged { size, .. } => {
                    files_to_update += 1;
                    total_upload_bytes += size;
                }
                SyncAction::DeleteOrphan { .. } => {
                    files_to_delete += 1;
                }
            }
        }

        Self {
            actions,
            total_upload_bytes,
            files_to_upload,
            files_to_update,
            files_to_delete,
            files_unchanged: 0,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Print a human-readable summary of the plan to stderr.
    pub fn print_summary(&self) {
        eprintln!("Sync plan:");
        for action in &self.actions {
            eprintln!("{}", action);
        }
        eprintln!();
        eprintln!(
            "  {} to upload, {} to update, {} to delete, {} unchanged",
            self.files_to_upload, self.files_to_update, self.files_to_delete, self.files_unchanged
        );
        if self.total_upload_bytes > 0 {
            eprintln!("  Total upload: {}", ByteSize(self.total_upload_bytes));
        }
    }
}

/// Result of applying a plan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub files_uploaded: u64,
    pub uploads_failed: u64,
    pub files_deleted: u64,
    pub directories_created: u64,
    pub bytes_uploaded: u64,
}

impl PassReport {
    pub fn is_noop(&self) -> bool {
        *self == PassReport::default()
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} uploaded ({}), {} failed, {} deleted, {} directories created",
            self.files_uploaded,
            ByteSize(self.bytes_uploaded),
            self.uploads_failed,
            self.files_deleted,
            self.directories_created
        )
    }
}
