//! HTTP client for external spreadsheet documents.

use std::time::Duration;

use common::SheetSnapshot;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, Result};
use crate::parse::parse_csv;

/// How long a fetch may take before being abandoned.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for pulling the tabular contents of a source URL.
#[derive(Debug, Clone)]
pub struct SheetClient {
    http: reqwest::Client,
}

impl Default for SheetClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetClient {
    /// Create a client with the default timeout.
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Fetch the current contents of a source document.
    ///
    /// Never fails: any problem (unparsable URL, HTTP error status,
    /// network failure, empty body) is logged and returned as a one-row
    /// error table, so downstream consumers always receive a well-formed
    /// snapshot they can display and broadcast like normal data.
    pub async fn fetch_snapshot(&self, source_url: &str) -> SheetSnapshot {
        match self.try_fetch(source_url).await {
            Ok(snapshot) => {
                debug!(
                    "Fetched {} rows x {} columns from {}",
                    snapshot.rows.len(),
                    snapshot.headers.len(),
                    source_url
                );
                snapshot
            }
            Err(e) => {
                warn!("Fetch failed for {}: {}", source_url, e);
                SheetSnapshot::error(e.to_string())
            }
        }
    }

    async fn try_fetch(&self, source_url: &str) -> Result<SheetSnapshot> {
        let url = Url::parse(source_url)?;

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.text().await?;
        parse_csv(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unparsable_url_becomes_error_snapshot() {
        let client = SheetClient::new();
        let snap = client.fetch_snapshot("not a url").await;
        assert!(snap.is_error());
        assert_eq!(snap.rows.len(), 1);
    }

    #[tokio::test]
    async fn unsupported_scheme_becomes_error_snapshot() {
        let client = SheetClient::new();
        let snap = client.fetch_snapshot("ftp://example.com/sheet.csv").await;
        assert!(snap.is_error());
    }
}
