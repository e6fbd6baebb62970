//! Coordination of bootstrap and incremental synchronisation runs.
//!
//! A pass reconciles the replication cursor, asks the feed for its newest
//! sequence, then applies the missing sequences strictly in order:
//! fetch, classify, stage the merged cache, queue the changed venues, write
//! the cache, and only then advance the cursor. A failure stops the pass; the
//! cursor still points at the last sequence that completed, so the next pass
//! retries from there.

mod error;
mod guard;
mod report;

use std::{cell::Cell, time::Duration};

use camino::Utf8PathBuf;
use log::{debug, error, info, warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use venue_sync_core::{EnrichmentBatch, ReplicationState, SequenceNumber};

pub use error::SyncError;
pub use guard::{JobClass, RunGuard, RunGuards};
pub use report::{AppliedSequence, BootstrapReport, SyncReport};

use crate::cache::VenueCacheStore;
use crate::log::SyncLog;
use crate::osc::classify_file;
use crate::queue::EnrichmentQueue;
use crate::replication::{
    DiffFile, FetchOptions, ReplicationSource, fetch_diff, missing_sequences,
    remote_high_water_mark,
};
use crate::state::{ReconcileOutcome, StateTracker};

/// Tuning for [`SyncOrchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// How diffs are fetched.
    pub fetch: FetchOptions,
    /// Upper bound on sequences applied per pass.
    pub max_sequences: usize,
    /// Whether this process runs the startup catch-up.
    pub bootstrap: bool,
}

impl SyncOptions {
    /// Default cap on sequences applied per pass.
    pub const DEFAULT_MAX_SEQUENCES: usize = 40;

    /// Options fetching into `work_dir` with default limits.
    pub fn new(work_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            fetch: FetchOptions::new(work_dir),
            max_sequences: Self::DEFAULT_MAX_SEQUENCES,
            bootstrap: false,
        }
    }

    /// Override the per-pass cap.
    #[must_use]
    pub const fn with_max_sequences(mut self, max_sequences: usize) -> Self {
        self.max_sequences = max_sequences;
        self
    }

    /// Override the pause between a diff and its state request.
    #[must_use]
    pub const fn with_courtesy_delay(mut self, delay: Duration) -> Self {
        self.fetch.courtesy_delay = delay;
        self
    }

    /// Designate this process as the one that bootstraps.
    #[must_use]
    pub const fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }
}

/// Drives the replication feed into the venue cache.
#[derive(Debug)]
pub struct SyncOrchestrator<S, Q> {
    source: S,
    state: StateTracker,
    cache: VenueCacheStore,
    queue: Q,
    log: Option<SyncLog>,
    options: SyncOptions,
    guards: RunGuards,
    bootstrapped: Cell<bool>,
}

impl<S, Q> SyncOrchestrator<S, Q>
where
    S: ReplicationSource,
    Q: EnrichmentQueue,
{
    /// Assemble an orchestrator from its collaborators.
    pub fn new(
        source: S,
        state: StateTracker,
        cache: VenueCacheStore,
        queue: Q,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            state,
            cache,
            queue,
            log: None,
            options,
            guards: RunGuards::default(),
            bootstrapped: Cell::new(false),
        }
    }

    /// Record every applied sequence in `log`.
    #[must_use]
    pub fn with_sync_log(mut self, log: SyncLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Replication feed in use.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Replication cursor.
    pub const fn state(&self) -> &StateTracker {
        &self.state
    }

    /// Venue cache.
    pub const fn cache(&self) -> &VenueCacheStore {
        &self.cache
    }

    /// Enrichment queue.
    pub const fn queue(&self) -> &Q {
        &self.queue
    }

    /// Audit log, when configured.
    pub const fn sync_log(&self) -> Option<&SyncLog> {
        self.log.as_ref()
    }

    /// Job classes currently running.
    pub const fn guards(&self) -> &RunGuards {
        &self.guards
    }

    /// Run one capped pass.
    ///
    /// Returns `Ok(None)` without doing anything if an incremental run is
    /// already in progress. Failures while applying a sequence end the pass
    /// and are reported in [`SyncReport::halted`]; only a failure to read the
    /// high-water mark is returned as an error.
    pub async fn run_incremental(&self) -> Result<Option<SyncReport>, SyncError> {
        let Some(_guard) = self.guards.try_acquire(JobClass::Incremental) else {
            info!("incremental sync already running; trigger dropped");
            return Ok(None);
        };
        self.sync_pass().await.map(Some)
    }

    /// Catch up with the feed by running passes until none remain.
    ///
    /// Runs at most once per orchestrator; later calls return `Ok(None)`.
    /// Incremental runs are excluded while bootstrap is in progress.
    pub async fn run_bootstrap(&self) -> Result<Option<BootstrapReport>, SyncError> {
        if self.bootstrapped.get() {
            debug!("bootstrap already ran in this process");
            return Ok(None);
        }
        let Some(_bootstrap) = self.guards.try_acquire(JobClass::Bootstrap) else {
            info!("bootstrap already running; trigger dropped");
            return Ok(None);
        };
        let Some(_incremental) = self.guards.try_acquire(JobClass::Incremental) else {
            info!("incremental sync in progress; bootstrap deferred");
            return Ok(None);
        };
        self.bootstrapped.set(true);

        let mut report = BootstrapReport::default();
        loop {
            let pass = self.sync_pass().await?;
            let finished = pass.caught_up() || pass.halted.is_some() || pass.applied.is_empty();
            report.passes.push(pass);
            if finished {
                break;
            }
        }
        info!(
            "bootstrap applied {} sequences in {} passes",
            report.applied_count(),
            report.passes.len()
        );
        Ok(Some(report))
    }

    /// Bootstrap if designated, then run incremental passes every `interval`
    /// until `cancel` fires.
    ///
    /// Ticks missed while a pass is running are skipped. Cancellation is
    /// observed between passes, never inside one.
    pub async fn run_scheduled(&self, interval: Duration, cancel: CancellationToken) {
        if self.options.bootstrap {
            if let Err(err) = self.run_bootstrap().await {
                error!("bootstrap failed: {err}");
            }
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("scheduled sync stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.run_incremental().await {
                        Ok(Some(report)) => log_pass(&report),
                        Ok(None) => {}
                        Err(err) => error!("incremental sync failed: {err}"),
                    }
                }
            }
        }
    }

    async fn sync_pass(&self) -> Result<SyncReport, SyncError> {
        let consumed = self.reconcile_cursor().await;
        let high_water_mark = remote_high_water_mark(&self.source)
            .await
            .map_err(|source| SyncError::HighWaterMark { source })?;
        let pending = missing_sequences(consumed, high_water_mark, self.options.max_sequences);
        let mut report = SyncReport::new(consumed, high_water_mark);
        if pending.is_empty() {
            debug!("replication is current at sequence {consumed}");
            return Ok(report);
        }
        debug!(
            "{} sequences to apply after {consumed} (feed at {high_water_mark})",
            pending.len()
        );
        for sequence in pending {
            match self.process_sequence(sequence).await {
                Ok(applied) => report.applied.push(applied),
                Err(err) => {
                    error!("sync halted: {err}");
                    report.halted = Some(err);
                    break;
                }
            }
        }
        Ok(report)
    }

    async fn reconcile_cursor(&self) -> SequenceNumber {
        let plan = self.state.plan_reconcile().await;
        let ReconcileOutcome::AdoptedRemote(remote) = plan else {
            return plan.consumed_sequence();
        };
        if let Err(err) = self.cache.restore_from_mirror().await {
            warn!("keeping local replication state; mirrored cache unusable: {err}");
            return self.state.consumed_sequence();
        }
        match self.state.adopt(remote) {
            Ok(()) => remote.sequence_number,
            Err(err) => {
                warn!("failed to adopt mirrored replication state: {err}");
                self.state.consumed_sequence()
            }
        }
    }

    async fn process_sequence(
        &self,
        sequence: SequenceNumber,
    ) -> Result<AppliedSequence, SyncError> {
        let diff = fetch_diff(&self.source, sequence, &self.options.fetch)
            .await
            .map_err(|source| SyncError::Fetch { sequence, source })?;
        let outcome = self.apply_diff(&diff).await;
        diff.cleanup();
        let applied = outcome?;
        if let Some(log) = &self.log
            && let Err(err) = log.record(&applied)
        {
            warn!("failed to record sequence {sequence} in the sync log: {err}");
        }
        Ok(applied)
    }

    async fn apply_diff(&self, diff: &DiffFile) -> Result<AppliedSequence, SyncError> {
        let sequence = diff.sequence();
        let changes =
            classify_file(diff.path()).map_err(|source| SyncError::Classify { sequence, source })?;
        // The cache must not be written before the batch is queued.
        let staged = self
            .cache
            .stage(&changes)
            .map_err(|source| SyncError::Cache { sequence, source })?;
        let batch = EnrichmentBatch::new(sequence, staged.report().changed.clone());
        let emitted = self
            .queue
            .emit(&batch)
            .map_err(|source| SyncError::Queue { sequence, source })?;
        let report = self
            .cache
            .commit(staged)
            .await
            .map_err(|source| SyncError::Cache { sequence, source })?;
        self.state
            .advance(ReplicationState::new(sequence, diff.timestamp()))
            .await
            .map_err(|source| SyncError::State { sequence, source })?;
        info!(
            "applied sequence {sequence}: {} created, {} modified, {} removed, {} skipped",
            report.created_count, report.modified_count, report.removed_count, changes.skipped
        );
        Ok(AppliedSequence {
            sequence,
            timestamp: diff.timestamp(),
            created_count: report.created_count,
            modified_count: report.modified_count,
            removed_count: report.removed_count,
            skipped: changes.skipped,
            cache_written: report.updated,
            rejected: report.rejected,
            emitted,
        })
    }
}

fn log_pass(report: &SyncReport) {
    if report.applied.is_empty() && report.halted.is_none() {
        return;
    }
    info!(
        "sync pass applied {} sequences; consumed {} of {}",
        report.applied.len(),
        report.consumed(),
        report.high_water_mark
    );
}
