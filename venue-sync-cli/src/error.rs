//! Error types emitted by the venue sync CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use venue_sync_data::replication::TransportError;
use venue_sync_data::{CacheError, StateError, SyncError, SyncLogError};

/// Errors emitted by the venue sync CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// An option was supplied with an unusable value.
    #[error("invalid {field}: {reason}")]
    InvalidOption {
        field: &'static str,
        reason: &'static str,
    },
    /// The data directory could not be created.
    #[error("failed to prepare data directory {path:?}: {source}")]
    PrepareDataDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The mirror directory could not be opened.
    #[error("failed to open mirror directory {path:?}: {source}")]
    OpenMirror {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The HTTP client for the replication feed could not be built.
    #[error("failed to build replication client for {base_url:?}: {source}")]
    BuildReplicationSource {
        base_url: String,
        #[source]
        source: Box<TransportError>,
    },
    /// The async runtime could not be started.
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Opening the sync log failed.
    #[error(transparent)]
    OpenSyncLog(Box<SyncLogError>),
    /// Reading the sync log failed.
    #[error("failed to read sync log: {0}")]
    QuerySyncLog(#[source] Box<SyncLogError>),
    /// A synchronisation run failed outright.
    #[error("synchronisation failed: {0}")]
    Sync(#[source] Box<SyncError>),
    /// The venue cache could not be read.
    #[error(transparent)]
    LoadCache(Box<CacheError>),
    /// The replication state could not be read.
    #[error(transparent)]
    ReadState(Box<StateError>),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}

impl From<SyncError> for CliError {
    fn from(value: SyncError) -> Self {
        Self::Sync(Box::new(value))
    }
}

impl From<CacheError> for CliError {
    fn from(value: CacheError) -> Self {
        Self::LoadCache(Box::new(value))
    }
}

impl From<StateError> for CliError {
    fn from(value: StateError) -> Self {
        Self::ReadState(Box::new(value))
    }
}
