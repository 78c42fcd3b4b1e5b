//! Outbound summarization webhook
//!
//! One POST per request with a per-call timeout. Transport, status, and
//! parse failures are classified into [`RequestError`]; the body is then run
//! through [`normalize_response`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{RequestError, ServiceError, ServiceResult};
use crate::normalize::normalize_response;

/// Characters of the response body included in debug logs
const LOG_PREVIEW_CHARS: usize = 500;

/// Summarization call
///
/// Implemented by [`WebhookRequester`] in production and by counting stubs in
/// tests.
#[async_trait]
pub trait SummaryRequester: Send + Sync {
    /// Request a summary of `information`
    ///
    /// `message_id` is forwarded as an advisory upstream cache hint.
    /// `thread_count` is informational only. May return an empty string.
    async fn request(
        &self,
        information: &str,
        message_id: &str,
        thread_count: u32,
        timeout_ms: u64,
    ) -> Result<String, RequestError>;
}

/// Webhook request body
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    information: &'a str,
    cache_id: &'a str,
}

/// HTTP client for the summarization webhook
#[derive(Clone)]
pub struct WebhookRequester {
    http: Client,
    url: String,
    api_key: Option<SecretString>,
}

impl WebhookRequester {
    /// Build a requester for `url`
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>, api_key: Option<SecretString>) -> ServiceResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| ServiceError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl SummaryRequester for WebhookRequester {
    async fn request(
        &self,
        information: &str,
        message_id: &str,
        thread_count: u32,
        timeout_ms: u64,
    ) -> Result<String, RequestError> {
        info!(
            url = %self.url,
            chars = information.chars().count(),
            thread_count,
            "requesting summary"
        );

        let mut request = self
            .http
            .post(&self.url)
            .timeout(Duration::from_millis(timeout_ms))
            .json(&WebhookPayload {
                information,
                cache_id: message_id,
            });
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key.expose_secret());
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();

        if status != StatusCode::OK {
            // Body is read for the log preview only.
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                body = %preview(&body),
                "summary webhook returned non-200 status"
            );
            return Err(RequestError::UpstreamStatus(status.as_u16()));
        }

        let body = response.text().await.map_err(classify_transport)?;

        debug!(len = body.len(), body = %preview(&body), "summary webhook responded");

        let summary = normalize_response(&body).inspect_err(|e| {
            warn!(error = %e, "summary webhook response is not JSON");
        })?;
        debug!(len = summary.len(), "summary extracted");
        Ok(summary)
    }
}

/// Map a `reqwest` failure to a transport error with a short reason
fn classify_transport(err: reqwest::Error) -> RequestError {
    let reason = if err.is_timeout() {
        "request timed out".to_owned()
    } else if err.is_connect() {
        format!("connect failed: {err}")
    } else {
        err.to_string()
    };
    warn!(error = %err, "summary webhook transport failure");
    RequestError::Transport(reason)
}

/// First characters of a body for logging
fn preview(body: &str) -> String {
    body.chars().take(LOG_PREVIEW_CHARS).collect()
}
