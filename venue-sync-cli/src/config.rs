//! Layered configuration for the `run`, `sync`, and `status` commands.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use venue_sync_data::SyncOptions;
use venue_sync_data::replication::{
    DEFAULT_BASE_URL, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, FetchOptions,
};

use crate::CliError;

pub(crate) const ARG_DATA_DIR: &str = "data-dir";
pub(crate) const ARG_MIRROR_DIR: &str = "mirror-dir";
pub(crate) const ARG_BASE_URL: &str = "base-url";
pub(crate) const ARG_TIMEOUT_SECS: &str = "timeout-secs";
pub(crate) const ARG_COURTESY_DELAY_MS: &str = "courtesy-delay-ms";
pub(crate) const ARG_MAX_SEQUENCES: &str = "max-sequences";
pub(crate) const ARG_INTERVAL_SECS: &str = "interval-secs";
pub(crate) const ARG_BOOTSTRAP: &str = "bootstrap";
pub(crate) const ARG_USER_AGENT: &str = "user-agent";
pub(crate) const ENV_DATA_DIR: &str = "VENUE_SYNC_DATA_DIR";

/// Default pause between scheduled incremental runs.
pub(crate) const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Files kept under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DataDir(Utf8PathBuf);

impl DataDir {
    pub(crate) fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self(root.into())
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        &self.0
    }

    pub(crate) fn state_path(&self) -> Utf8PathBuf {
        self.0.join("replication-state.json")
    }

    pub(crate) fn cache_path(&self) -> Utf8PathBuf {
        self.0.join("venues.json")
    }

    pub(crate) fn queue_dir(&self) -> Utf8PathBuf {
        self.0.join("queue")
    }

    pub(crate) fn sync_log_path(&self) -> Utf8PathBuf {
        self.0.join("sync-log.sqlite")
    }

    pub(crate) fn work_dir(&self) -> Utf8PathBuf {
        self.0.join("work")
    }
}

/// CLI arguments shared by the `run` and `sync` subcommands.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Consume the OpenStreetMap minutely replication feed and keep \
                 the local venue cache current. Options can come from CLI \
                 flags, configuration files, or environment variables.",
    about = "Synchronise the venue cache with the replication feed"
)]
#[ortho_config(prefix = "VENUE_SYNC")]
pub(crate) struct SyncArgs {
    /// Directory holding the replication state, cache, queue, and sync log.
    #[arg(long = ARG_DATA_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) data_dir: Option<Utf8PathBuf>,
    /// Directory mirroring the state and cache for other replicas.
    #[arg(long = ARG_MIRROR_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) mirror_dir: Option<Utf8PathBuf>,
    /// Root of the replication feed.
    #[arg(long = ARG_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long = ARG_TIMEOUT_SECS, value_name = "seconds")]
    #[serde(default)]
    pub(crate) timeout_secs: Option<u64>,
    /// Pause between downloading a diff and fetching its state, in milliseconds.
    #[arg(long = ARG_COURTESY_DELAY_MS, value_name = "millis")]
    #[serde(default)]
    pub(crate) courtesy_delay_ms: Option<u64>,
    /// Maximum sequences applied per incremental run.
    #[arg(long = ARG_MAX_SEQUENCES, value_name = "count")]
    #[serde(default)]
    pub(crate) max_sequences: Option<usize>,
    /// Seconds between scheduled incremental runs.
    #[arg(long = ARG_INTERVAL_SECS, value_name = "seconds")]
    #[serde(default)]
    pub(crate) interval_secs: Option<u64>,
    /// Catch up with the feed before (or instead of) incremental runs.
    #[arg(long = ARG_BOOTSTRAP, num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) bootstrap: Option<bool>,
    /// User agent sent to the replication feed.
    #[arg(long = ARG_USER_AGENT, value_name = "agent")]
    #[serde(default)]
    pub(crate) user_agent: Option<String>,
}

impl SyncArgs {
    pub(crate) fn into_config(self) -> Result<SyncConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SyncConfig::try_from(merged)
    }
}

/// CLI arguments for the `status` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Report the consumed sequence and cache size")]
#[ortho_config(prefix = "VENUE_SYNC")]
pub(crate) struct StatusArgs {
    /// Directory holding the replication state, cache, queue, and sync log.
    #[arg(long = ARG_DATA_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) data_dir: Option<Utf8PathBuf>,
}

impl StatusArgs {
    pub(crate) fn into_data_dir(self) -> Result<DataDir, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        DataDir::try_from(merged)
    }
}

impl TryFrom<StatusArgs> for DataDir {
    type Error = CliError;

    fn try_from(args: StatusArgs) -> Result<Self, Self::Error> {
        require_data_dir(args.data_dir)
    }
}

/// Resolved synchronisation configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyncConfig {
    pub(crate) data_dir: DataDir,
    pub(crate) mirror_dir: Option<Utf8PathBuf>,
    pub(crate) base_url: String,
    pub(crate) timeout: Duration,
    pub(crate) courtesy_delay: Duration,
    pub(crate) max_sequences: usize,
    pub(crate) interval: Duration,
    pub(crate) bootstrap: bool,
    pub(crate) user_agent: String,
}

impl SyncConfig {
    /// Orchestrator tuning derived from this configuration.
    pub(crate) fn sync_options(&self) -> SyncOptions {
        SyncOptions::new(self.data_dir.work_dir())
            .with_courtesy_delay(self.courtesy_delay)
            .with_max_sequences(self.max_sequences)
            .with_bootstrap(self.bootstrap)
    }
}

impl TryFrom<SyncArgs> for SyncConfig {
    type Error = CliError;

    fn try_from(args: SyncArgs) -> Result<Self, Self::Error> {
        let data_dir = require_data_dir(args.data_dir)?;
        let timeout = args
            .timeout_secs
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        if timeout.is_zero() {
            return Err(CliError::InvalidOption {
                field: ARG_TIMEOUT_SECS,
                reason: "must be at least one second",
            });
        }
        let max_sequences = args
            .max_sequences
            .unwrap_or(SyncOptions::DEFAULT_MAX_SEQUENCES);
        if max_sequences == 0 {
            return Err(CliError::InvalidOption {
                field: ARG_MAX_SEQUENCES,
                reason: "must be at least one",
            });
        }
        let interval = args
            .interval_secs
            .map_or(DEFAULT_INTERVAL, Duration::from_secs);
        if interval.is_zero() {
            return Err(CliError::InvalidOption {
                field: ARG_INTERVAL_SECS,
                reason: "must be at least one second",
            });
        }
        Ok(Self {
            data_dir,
            mirror_dir: args.mirror_dir,
            base_url: args
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            timeout,
            courtesy_delay: args
                .courtesy_delay_ms
                .map_or(FetchOptions::DEFAULT_COURTESY_DELAY, Duration::from_millis),
            max_sequences,
            interval,
            bootstrap: args.bootstrap.unwrap_or(false),
            user_agent: args
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
        })
    }
}

fn require_data_dir(value: Option<Utf8PathBuf>) -> Result<DataDir, CliError> {
    value.map(DataDir::new).ok_or(CliError::MissingArgument {
        field: ARG_DATA_DIR,
        env: ENV_DATA_DIR,
    })
}

#[cfg(test)]
pub(crate) fn sync_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<SyncConfig, CliError> {
    let merged = SyncArgs::merge_from_layers(layers).map_err(CliError::from)?;
    SyncConfig::try_from(merged)
}
