use std::{io, io::Write, time::Duration};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::USER_AGENT;
use reqwest::{Client, Response};
use venue_sync_core::SequenceNumber;

use super::util::sanitise_base_url;
use super::{BaseUrl, TransportError};

/// Public minutely replication feed.
pub const DEFAULT_BASE_URL: &str = "https://planet.openstreetmap.org/replication/minute";
/// User agent sent with every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = "venue-sync/0.1";
/// Upper bound on a single request, including reading the body.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read access to a replication feed.
#[async_trait(?Send)]
pub trait ReplicationSource {
    /// Base URL of the feed.
    fn base_url(&self) -> &BaseUrl;
    /// Fetch the global `state.txt` body.
    async fn fetch_latest_state(&self) -> Result<String, TransportError>;
    /// Fetch the `state.txt` body published alongside `sequence`.
    async fn fetch_sequence_state(
        &self,
        sequence: SequenceNumber,
    ) -> Result<String, TransportError>;
    /// Stream the compressed diff for `sequence` into `sink`.
    async fn download_diff(
        &self,
        sequence: SequenceNumber,
        sink: &mut dyn Write,
    ) -> Result<u64, TransportError>;
}

/// HTTP implementation of [`ReplicationSource`].
#[derive(Debug)]
pub struct HttpReplicationSource {
    client: Client,
    base_url: BaseUrl,
    user_agent: String,
}

impl HttpReplicationSource {
    /// Construct an HTTP-backed source.
    ///
    /// `timeout` bounds each request end to end; an expired request is
    /// aborted and reported as a network error.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|source| TransportError::Client { source })?;
        Ok(Self {
            client,
            base_url: sanitise_base_url(base_url),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        })
    }

    /// Override the default user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    async fn call(&self, url: &str) -> Result<Response, TransportError> {
        self.client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?
            .error_for_status()
            .map_err(|err| convert_reqwest_error(err, url))
    }

    async fn fetch_text(&self, url: &str) -> Result<String, TransportError> {
        self.call(url)
            .await?
            .text()
            .await
            .map_err(|err| convert_reqwest_error(err, url))
    }
}

#[async_trait(?Send)]
impl ReplicationSource for HttpReplicationSource {
    fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    async fn fetch_latest_state(&self) -> Result<String, TransportError> {
        self.fetch_text(&self.base_url.latest_state()).await
    }

    async fn fetch_sequence_state(
        &self,
        sequence: SequenceNumber,
    ) -> Result<String, TransportError> {
        self.fetch_text(&self.base_url.sequence_state(sequence))
            .await
    }

    async fn download_diff(
        &self,
        sequence: SequenceNumber,
        sink: &mut dyn Write,
    ) -> Result<u64, TransportError> {
        let url = self.base_url.diff(sequence);
        let mut body = self.call(&url).await?.bytes_stream();
        let mut written = 0_u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|err| convert_reqwest_error(err, &url))?
        {
            sink.write_all(&chunk)
                .map_err(|source| TransportError::Sink {
                    url: url.clone(),
                    source,
                })?;
            written = written.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        }
        sink.flush().map_err(|source| TransportError::Sink {
            url: url.clone(),
            source,
        })?;
        Ok(written)
    }
}

fn convert_reqwest_error(error: reqwest::Error, url: &str) -> TransportError {
    if let Some(status) = error.status() {
        return TransportError::Http {
            url: url.to_owned(),
            status: status.as_u16(),
            message: error.to_string(),
        };
    }

    let kind = if error.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    };
    TransportError::Network {
        url: url.to_owned(),
        source: io::Error::new(kind, error),
    }
}
