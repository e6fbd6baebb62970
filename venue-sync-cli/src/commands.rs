//! Execution of the `run`, `sync`, and `status` subcommands.

use std::{io::Write, rc::Rc};

use log::{info, warn};
use tokio_util::sync::CancellationToken;
use venue_sync_data::replication::HttpReplicationSource;
use venue_sync_data::{
    BlobStore, DirectoryBlobStore, DirectoryQueue, StateTracker, SyncLog, SyncOrchestrator,
    SyncReport, VenueCacheStore,
};

use crate::CliError;
use crate::config::{DataDir, SyncConfig};

type Orchestrator = SyncOrchestrator<HttpReplicationSource, DirectoryQueue>;

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

/// Wire the orchestrator's collaborators from `config`.
pub(crate) fn build_orchestrator(config: &SyncConfig) -> Result<Orchestrator, CliError> {
    let data_dir = &config.data_dir;
    venue_sync_fs::ensure_dir(data_dir.root()).map_err(|source| CliError::PrepareDataDir {
        path: data_dir.root().to_path_buf(),
        source,
    })?;
    let mirror = open_mirror(config)?;
    let source = HttpReplicationSource::new(config.base_url.as_str(), config.timeout)
        .map_err(|source| CliError::BuildReplicationSource {
            base_url: config.base_url.clone(),
            source: Box::new(source),
        })?
        .with_user_agent(config.user_agent.as_str());
    let log = SyncLog::initialise(data_dir.sync_log_path().as_std_path())
        .map_err(|err| CliError::OpenSyncLog(Box::new(err)))?;
    let orchestrator = SyncOrchestrator::new(
        source,
        StateTracker::new(data_dir.state_path(), mirror.clone()),
        VenueCacheStore::new(data_dir.cache_path(), mirror),
        DirectoryQueue::new(data_dir.queue_dir()),
        config.sync_options(),
    );
    Ok(orchestrator.with_sync_log(log))
}

fn open_mirror(config: &SyncConfig) -> Result<Option<Rc<dyn BlobStore>>, CliError> {
    let Some(dir) = config.mirror_dir.as_ref() else {
        return Ok(None);
    };
    let store = DirectoryBlobStore::open(dir.clone()).map_err(|source| CliError::OpenMirror {
        path: dir.clone(),
        source,
    })?;
    let shared: Rc<dyn BlobStore> = Rc::new(store);
    Ok(Some(shared))
}

/// Run scheduled synchronisation until interrupted.
pub(crate) fn run_scheduled(config: &SyncConfig) -> Result<(), CliError> {
    let orchestrator = build_orchestrator(config)?;
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    info!(
        "synchronising from {} every {}s",
        config.base_url,
        config.interval.as_secs()
    );
    runtime()?.block_on(async {
        let interrupt = async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received; stopping after the current run"),
                Err(err) => warn!("failed to listen for interrupts: {err}; stopping"),
            }
            shutdown.cancel();
        };
        tokio::join!(orchestrator.run_scheduled(config.interval, cancel), interrupt);
    });
    Ok(())
}

/// Run a single incremental pass, or a full catch-up when bootstrapping.
pub(crate) fn sync_once(config: &SyncConfig, writer: &mut dyn Write) -> Result<(), CliError> {
    let orchestrator = build_orchestrator(config)?;
    let runtime = runtime()?;
    if config.bootstrap {
        let report = runtime.block_on(orchestrator.run_bootstrap())?;
        for pass in report.iter().flat_map(|report| report.passes.iter()) {
            write_report(writer, pass)?;
        }
    } else if let Some(report) = runtime.block_on(orchestrator.run_incremental())? {
        write_report(writer, &report)?;
    }
    Ok(())
}

pub(crate) fn write_report(writer: &mut dyn Write, report: &SyncReport) -> Result<(), CliError> {
    writeln!(
        writer,
        "applied {} sequences ({} -> {}); feed at {}",
        report.applied.len(),
        report.start,
        report.consumed(),
        report.high_water_mark
    )
    .map_err(CliError::WriteOutput)?;
    if let Some(err) = &report.halted {
        writeln!(writer, "halted: {err}").map_err(CliError::WriteOutput)?;
    }
    Ok(())
}

/// Print the consumed sequence, the cache size, and the latest sync log entry.
pub(crate) fn status(data_dir: &DataDir, writer: &mut dyn Write) -> Result<(), CliError> {
    let state = StateTracker::new(data_dir.state_path(), None).current()?;
    let venues = VenueCacheStore::new(data_dir.cache_path(), None).load()?.len();
    match state {
        Some(state) => writeln!(
            writer,
            "consumed sequence: {} ({})",
            state.sequence_number,
            state.timestamp.to_rfc3339()
        ),
        None => writeln!(writer, "consumed sequence: none"),
    }
    .map_err(CliError::WriteOutput)?;
    writeln!(writer, "cached venues: {venues}").map_err(CliError::WriteOutput)?;

    let log_path = data_dir.sync_log_path();
    if !log_path.exists() {
        return Ok(());
    }
    let log = SyncLog::initialise(log_path.as_std_path())
        .map_err(|err| CliError::OpenSyncLog(Box::new(err)))?;
    let latest = log
        .latest()
        .map_err(|err| CliError::QuerySyncLog(Box::new(err)))?;
    if let Some(entry) = latest {
        writeln!(
            writer,
            "last applied: sequence {} at {} (+{} ~{} -{})",
            entry.sequence,
            entry.applied_at.to_rfc3339(),
            entry.created,
            entry.modified,
            entry.removed
        )
        .map_err(CliError::WriteOutput)?;
    }
    Ok(())
}
