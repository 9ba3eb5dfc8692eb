use std::time::Instant;

use tracing::debug;

use crate::error::{ForwarderError, Result};
use crate::metrics;
use crate::record::TelemetryRecord;

/// Longest response-body slice carried inside a delivery error.
const BODY_EXCERPT_LIMIT: usize = 512;

/// HTTP client for the Eventstream custom endpoint. One POST per record,
/// no retries.
pub struct EventstreamClient {
    ingest_url: Option<String>,
    http: reqwest::Client,
}

impl EventstreamClient {
    pub fn new(ingest_url: Option<String>) -> Self {
        EventstreamClient {
            ingest_url,
            http: reqwest::Client::new(),
        }
    }

    /// Sends one record with a bearer token and returns the upstream HTTP
    /// status. A missing ingestion URL fails before any network call; a
    /// non-success status becomes a delivery error carrying the status,
    /// status text, and a body excerpt.
    pub async fn send(&self, record: &TelemetryRecord, token: &str) -> Result<u16> {
        let url = self.ingest_url.as_ref().ok_or_else(|| {
            ForwarderError::Config("EVENTSTREAM_INGEST_URL is required".to_string())
        })?;

        let started = Instant::now();
        let response = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", token))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(record)
            .send()
            .await?;
        metrics::delivery::duration(started.elapsed().as_secs_f64());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            metrics::delivery::error(status.as_u16());
            return Err(ForwarderError::Delivery {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body: excerpt(&body),
            });
        }

        metrics::delivery::success(status.as_u16());
        debug!("delivered record, eventstream status {}", status.as_u16());
        Ok(status.as_u16())
    }
}

// Truncates on a char boundary so the error message stays valid UTF-8.
fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_LIMIT {
        return body.to_string();
    }

    let mut end = BODY_EXCERPT_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
