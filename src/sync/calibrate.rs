//! Clock calibration against the server's directory listings.
//!
//! A listing reports modification times in the server's clock with no zone.
//! Instead of trusting those values, a probe file is uploaded at a known local
//! instant and found again in the listing; the difference between the two is
//! the offset that moves every other listed time into the local frame.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::error::MirrorError;
use crate::transport::{join_remote, FtpCommand, Payload, Transport};

use super::clock::Clock;
use super::filter::ExclusionFilter;
use super::listing::parse_listing;
use super::scan::Inventory;
use super::state::{PathKey, RemoteState};

const PROBE_PREFIX: &str = "ftpmirror-probe-";

/// Correction added to a server-reported time to express it in local UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockOffset(pub Duration);

impl ClockOffset {
    /// Offset for a probe uploaded at `local` and listed at `remote`.
    pub fn between(local: DateTime<Utc>, remote: NaiveDateTime) -> Self {
        ClockOffset(local.naive_utc() - remote)
    }

    pub fn to_local(&self, remote: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(remote + self.0))
    }
}

impl fmt::Display for ClockOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.num_seconds();
        let sign = if secs < 0 { '-' } else { '+' };
        let secs = secs.abs();
        write!(f, "{}{}h{:02}m{:02}s", sign, secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Outcome of one calibration pass.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub probe: String,
    /// `None` when the probe never showed up in a listing.
    pub offset: Option<ClockOffset>,
    pub directories_listed: usize,
    /// Remote files written into the remote state.
    pub adopted: usize,
}

/// Random probe name under `dir`. Hex only, so it always fits the listing grammar.
pub fn probe_path(dir: &str) -> String {
    let token: u128 = rand::random();
    join_remote(&[dir, &format!("{}{:032x}", PROBE_PREFIX, token)])
}

/// Run one calibration round trip and fold the listed remote times into `state`.
///
/// The probe goes into the first parent directory of the inventory; every
/// parent directory is then listed. The probe is deleted whatever happened
/// before. If the probe cannot be found in a listing, `state` is left as it was.
pub fn calibrate(
    transport: &dyn Transport,
    clock: &dyn Clock,
    inventory: &Inventory,
    filter: &ExclusionFilter,
    state: &mut RemoteState,
) -> Result<CalibrationReport, MirrorError> {
    let dirs = inventory.parent_dirs();
    let first = dirs.first().ok_or(MirrorError::NothingToCalibrate)?;
    let probe = probe_path(first);
    let year = clock.current_year();

    let uploaded_at = clock.now();
    let upload = transport.execute(
        FtpCommand::Upload,
        &probe,
        Some(&Payload::Bytes(probe.as_bytes().to_vec())),
    );
    if !upload.is_success() {
        tracing::warn!(probe = %probe, code = %upload.code, "Probe upload failed");
    }

    let mut listed: BTreeMap<PathKey, (String, NaiveDateTime)> = BTreeMap::new();
    for dir in &dirs {
        let reply = transport.execute(FtpCommand::List, dir, None);
        let Some(body) = reply.body else {
            continue;
        };
        for entry in parse_listing(&body, year) {
            let path = join_remote(&[dir, &entry.name]);
            listed.insert(PathKey::new(&path), (path, entry.modified));
        }
    }

    let delete = transport.execute(FtpCommand::Delete, &probe, None);
    if !delete.is_success() {
        tracing::warn!(probe = %probe, code = %delete.code, "Probe could not be removed");
    }

    let mut report = CalibrationReport {
        probe: probe.clone(),
        offset: None,
        directories_listed: dirs.len(),
        adopted: 0,
    };

    let Some((_, probe_remote)) = listed.remove(&PathKey::new(&probe)) else {
        tracing::warn!(probe = %probe, "Probe not found in listing; remote times not adopted");
        return Ok(report);
    };

    let offset = ClockOffset::between(uploaded_at, probe_remote);
    state.ensure_initialized();
    for (path, remote) in listed.into_values() {
        if filter.is_excluded(&path) {
            continue;
        }
        state.record(&path, offset.to_local(remote));
        report.adopted += 1;
    }
    report.offset = Some(offset);

    tracing::info!(
        offset = %offset,
        adopted = report.adopted,
        "Calibrated against server clock"
    );
    Ok(report)
}
