use crate::config::types::SyncConfig;
use crate::error::MirrorError;
use crate::transport::{FtpCommand, Payload, ReplyCode, Transport};

use super::calibrate::{calibrate, CalibrationReport};
use super::clock::{Clock, SystemClock};
use super::filter::ExclusionFilter;
use super::plan::{PassReport, SyncAction, SyncPlan};
use super::scan::{scan, Inventory};
use super::schedule::RunToken;
use super::state::RemoteState;

/// What a trigger asks the mirror to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Upload what changed, delete what disappeared.
    Sync,
    /// Forget the remote state first, so every local file is uploaded.
    FullResync,
    /// Re-derive the remote state from server listings.
    Calibrate,
}

#[derive(Debug)]
pub enum PassOutcome {
    Synced(PassReport),
    Calibrated(CalibrationReport),
}

/// Owns everything a reconciliation pass touches.
///
/// The remote state lives here and is only reached through methods taking a
/// [`RunToken`], so it is never touched by two passes at once.
pub struct Mirror {
    config: SyncConfig,
    filter: ExclusionFilter,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    state: RemoteState,
}

impl Mirror {
    pub fn new(config: SyncConfig, transport: Box<dyn Transport>) -> Result<Self, MirrorError> {
        let filter = ExclusionFilter::new(config.exclude.as_deref(), &config.exclude_globs)?;
        Ok(Self {
            config,
            filter,
            transport,
            clock: Box::new(SystemClock),
            state: RemoteState::new(),
        })
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &RemoteState {
        &self.state
    }

    pub fn scan(&self) -> Result<Inventory, MirrorError> {
        scan(&self.config.local_root, self.config.recursive, &self.filter)
    }

    /// Scan and diff against the remote state, seeding it on first use.
    pub fn plan(&mut self, _token: &RunToken) -> Result<SyncPlan, MirrorError> {
        let inventory = self.scan()?;
        if !self.state.is_seeded() {
            tracing::info!(
                files = inventory.len(),
                "First pass: treating existing local files as already mirrored (use --full to upload them)"
            );
            self.state.seed_from(&inventory);
        }
        Ok(SyncPlan::compute(&inventory, &self.state))
    }

    /// The plan the next pass would execute. With `full`, the remote state
    /// is dropped first, exactly as a full resync would.
    pub fn preview(&mut self, full: bool, token: &RunToken) -> Result<SyncPlan, MirrorError> {
        if full {
            self.state.reset();
        }
        self.plan(token)
    }

    /// Apply `plan`. Transport failures are counted, never raised; a failed
    /// upload leaves its path as it was so the next pass tries again.
    pub fn execute(&mut self, plan: &SyncPlan, _token: &RunToken) -> PassReport {
        let mut report = PassReport::default();

        for action in &plan.actions {
            match action {
                SyncAction::UploadNew { path, local, size }
                | SyncAction::UploadChanged { path, local, size } => {
                    let payload = Payload::File(local.clone());
                    if self.upload(path, &payload, &mut report) {
                        report.files_uploaded += 1;
                        report.bytes_uploaded += size;
                    } else {
                        report.uploads_failed += 1;
                    }
                }
                SyncAction::DeleteOrphan { path } => {
                    let reply = self.transport.execute(FtpCommand::Delete, path, None);
                    if reply.is_success() {
                        report.files_deleted += 1;
                    }
                    self.state.remove(path);
                }
            }
        }

        report
    }

    pub fn sync_pass(&mut self, token: &RunToken) -> Result<PassReport, MirrorError> {
        let plan = self.plan(token)?;
        if !plan.has_changes() {
            tracing::debug!("Already in sync");
            return Ok(PassReport::default());
        }
        let report = self.execute(&plan, token);
        tracing::info!("Pass complete: {}", report);
        Ok(report)
    }

    pub fn full_resync(&mut self, token: &RunToken) -> Result<PassReport, MirrorError> {
        tracing::info!("Full resync: uploading every local file");
        self.state.reset();
        self.sync_pass(token)
    }

    pub fn calibrate(&mut self, _token: &RunToken) -> Result<CalibrationReport, MirrorError> {
        let inventory = self.scan()?;
        calibrate(
            self.transport.as_ref(),
            self.clock.as_ref(),
            &inventory,
            &self.filter,
            &mut self.state,
        )
    }

    pub fn run_pass(&mut self, kind: PassKind, token: &RunToken) -> Result<PassOutcome, MirrorError> {
        match kind {
            PassKind::Sync => self.sync_pass(token).map(PassOutcome::Synced),
            PassKind::FullResync => self.full_resync(token).map(PassOutcome::Synced),
            PassKind::Calibrate => self.calibrate(token).map(PassOutcome::Calibrated),
        }
    }

    /// Upload one file, creating missing parents and retrying once on 553.
    /// Records the instant taken before the first attempt on success.
    fn upload(&mut self, path: &str, payload: &Payload, report: &mut PassReport) -> bool {
        let started = self.clock.now();
        let mut reply = self.transport.execute(FtpCommand::Upload, path, Some(payload));

        if reply.code == ReplyCode::FILE_NAME_NOT_ALLOWED {
            report.directories_created += self.make_ancestors(path);
            reply = self.transport.execute(FtpCommand::Upload, path, Some(payload));
        }

        if reply.is_success() {
            self.state.record(path, started);
            true
        } else {
            false
        }
    }

    /// MKD every ancestor of `path`, root first. Failures are expected for
    /// directories that already exist and are ignored.
    fn make_ancestors(&self, path: &str) -> u64 {
        let mut created = 0;
        for (index, _) in path.match_indices('/') {
            let dir = &path[..index];
            if self
                .transport
                .execute(FtpCommand::MakeDirectory, dir, None)
                .is_success()
            {
                created += 1;
            }
        }
        created
    }
}
