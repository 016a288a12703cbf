use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::time::{Interval, MissedTickBehavior};

use crate::error::MirrorError;
use crate::transport::Activity;

use super::engine::{Mirror, PassKind, PassOutcome};

/// The single run slot shared by every trigger.
#[derive(Debug, Default)]
pub struct RunGuard {
    running: AtomicBool,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot, or `None` if a pass already holds it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunToken> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunToken {
                guard: Arc::clone(self),
            })
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof of holding the run slot. Releases it when dropped.
#[derive(Debug)]
pub struct RunToken {
    guard: Arc<RunGuard>,
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// Normalize a cron expression to the 6+ field format expected by the `cron` crate.
///
/// Standard 5-field expressions (min hour day month dow) get a leading `0`
/// for the seconds field.
fn normalize_cron_expression(expr: &str) -> String {
    let field_count = expr.split_whitespace().count();
    if field_count == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    }
}

/// When passes fire.
#[derive(Debug, Clone)]
pub enum Trigger {
    Every(Duration),
    Cron(Box<Schedule>),
}

impl Trigger {
    pub fn every(period: Duration) -> Result<Self, MirrorError> {
        if period.is_zero() {
            return Err(MirrorError::Schedule(
                "Interval must be greater than zero".to_string(),
            ));
        }
        Ok(Trigger::Every(period))
    }

    pub fn cron(expr: &str) -> Result<Self, MirrorError> {
        let normalized = normalize_cron_expression(expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            MirrorError::Schedule(format!("Invalid cron expression '{}': {}", expr, e))
        })?;
        Ok(Trigger::Cron(Box::new(schedule)))
    }

    fn ticker(&self) -> Ticker {
        match self {
            Trigger::Every(period) => {
                let mut interval = tokio::time::interval(*period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Ticker::Interval(interval)
            }
            Trigger::Cron(schedule) => Ticker::Cron(schedule.clone()),
        }
    }
}

enum Ticker {
    Interval(Interval),
    Cron(Box<Schedule>),
}

impl Ticker {
    async fn tick(&mut self) {
        match self {
            Ticker::Interval(interval) => {
                interval.tick().await;
            }
            Ticker::Cron(schedule) => match schedule.upcoming(Utc).next() {
                Some(next) => {
                    tracing::debug!("Next pass at {}", next.format("%Y-%m-%d %H:%M:%S UTC"));
                    let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::time::sleep(wait).await;
                }
                None => std::future::pending::<()>().await,
            },
        }
    }
}

fn lock(mirror: &Mutex<Mirror>) -> MutexGuard<'_, Mirror> {
    mirror.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives passes against one [`Mirror`], never more than one at a time.
pub struct Scheduler {
    mirror: Arc<Mutex<Mirror>>,
    guard: Arc<RunGuard>,
    activity: Option<Activity>,
}

impl Scheduler {
    pub fn new(mirror: Mirror) -> Self {
        Self {
            mirror: Arc::new(Mutex::new(mirror)),
            guard: Arc::new(RunGuard::new()),
            activity: None,
        }
    }

    /// Report the transport's activity indicator when a tick is dropped.
    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Whether the server was spoken to within the last few seconds.
    fn transfer_active(&self) -> bool {
        self.activity.as_ref().is_some_and(Activity::is_active)
    }

    #[cfg(test)]
    pub fn guard(&self) -> Arc<RunGuard> {
        Arc::clone(&self.guard)
    }

    pub fn tracked_files(&self) -> usize {
        lock(&self.mirror).state().len()
    }

    /// Run one pass on the calling thread. `None` when the slot is taken,
    /// in which case the request is dropped.
    pub fn trigger(&self, kind: PassKind) -> Option<Result<PassOutcome, MirrorError>> {
        let token = self.guard.try_acquire()?;
        let mut mirror = lock(&self.mirror);
        Some(mirror.run_pass(kind, &token))
    }

    /// Dry run: print what the next pass would do without touching the server.
    pub fn preview(&self, full: bool) -> Option<Result<(), MirrorError>> {
        let token = self.guard.try_acquire()?;
        let mut mirror = lock(&self.mirror);
        Some(mirror.preview(full, &token).map(|plan| plan.print_summary()))
    }

    /// Fire passes on `trigger` until Ctrl+C. `first` replaces the first pass
    /// (full resync or calibration); every later one is an ordinary sync.
    pub fn run(&self, trigger: &Trigger, first: PassKind) -> Result<(), MirrorError> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run_until(trigger, first, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }));
        Ok(())
    }

    async fn run_until(&self, trigger: &Trigger, first: PassKind, shutdown: impl Future<Output = ()>) {
        let mut ticker = trigger.ticker();
        let mut first = Some(first);
        let mut in_flight = None;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Stopping after the running pass");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let Some(token) = self.guard.try_acquire() else {
                tracing::debug!(
                    transfer_active = self.transfer_active(),
                    "Previous pass still running; tick dropped"
                );
                continue;
            };
            let kind = first.take().unwrap_or(PassKind::Sync);
            let mirror = Arc::clone(&self.mirror);
            in_flight = Some(tokio::task::spawn_blocking(move || {
                let result = lock(&mirror).run_pass(kind, &token);
                log_outcome(kind, result);
            }));
        }

        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                tracing::error!("Pass worker panicked: {}", e);
            }
        }
    }
}

/// Passes run unattended; failures are logged and retried on the next tick.
pub fn log_outcome(kind: PassKind, result: Result<PassOutcome, MirrorError>) {
    match result {
        Ok(PassOutcome::Synced(_)) => {}
        Ok(PassOutcome::Calibrated(report)) => match report.offset {
            Some(offset) => tracing::info!(
                "Server clock offset {} ({} remote files adopted)",
                offset,
                report.adopted
            ),
            None => tracing::warn!("Calibration probe was not found; remote state unchanged"),
        },
        Err(e) => tracing::error!("{:?} pass failed: {}", kind, e),
    }
}
