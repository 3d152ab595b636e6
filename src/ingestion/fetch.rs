//! Remote source retrieval over HTTP GET.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::{IngestionError, IngestionResult};

/// Default timeout for a remote fetch.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default `User-Agent` sent with remote fetches.
pub const DEFAULT_USER_AGENT: &str = concat!("csv-ingest/", env!("CARGO_PKG_VERSION"));

/// Fetches the body of a remote delimited-text source.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteFetcher {
    /// Build a fetcher with the given request timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> IngestionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| IngestionError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and return the body as text.
    ///
    /// Network failures, timeouts, non-2xx statuses and unreadable bodies all become
    /// [`IngestionError::Fetch`]; the message is meant to be shown as-is. Invalid UTF-8 is
    /// replaced, so use [`Self::fetch_bytes`] for anything that gets parsed.
    pub async fn fetch_remote(&self, url: &Url) -> IngestionResult<String> {
        let body = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(|e| IngestionError::fetch(describe_request_error(&e, self.timeout)))?;
        debug!(%url, bytes = body.len(), "fetched remote source");
        Ok(body)
    }

    /// GET `url` and return the raw body, undecoded.
    pub async fn fetch_bytes(&self, url: &Url) -> IngestionResult<Vec<u8>> {
        let body = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| IngestionError::fetch(describe_request_error(&e, self.timeout)))?;
        debug!(%url, bytes = body.len(), "fetched remote source");
        Ok(body.to_vec())
    }

    async fn get(&self, url: &Url) -> IngestionResult<reqwest::Response> {
        debug!(%url, "fetching remote source");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| IngestionError::fetch(describe_request_error(&e, self.timeout)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestionError::fetch(format!(
                "HTTP request failed with status: {status}"
            )));
        }
        Ok(response)
    }
}

fn describe_request_error(e: &reqwest::Error, timeout: Duration) -> String {
    if e.is_timeout() {
        format!("request timed out after {timeout:?}")
    } else {
        format!("failed to fetch: {e}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_configured_timeout() {
        let fetcher = RemoteFetcher::new(Duration::from_millis(1500), DEFAULT_USER_AGENT).unwrap();
        assert_eq!(fetcher.timeout(), Duration::from_millis(1500));
    }
}
