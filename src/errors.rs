//! Error model with MCP error mapping
//!
//! Three layers of typed errors built with `thiserror`:
//!
//! - [`RequestError`]: outbound call to the summarization webhook
//! - [`StoreError`]: cache persistence backends
//! - [`ServiceError`]: the public taxonomy returned by the summary service and
//!   mapped to MCP [`ErrorData`] for protocol responses
//!
//! Upstream failures are collapsed into a single user-facing message; the
//! detailed reason is kept for logs only.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

/// User-facing text for every upstream summarization failure
pub const SUMMARY_FAILED_MESSAGE: &str = "could not generate summary";

/// User-facing text when the assembled message text is missing or too short
pub const NO_INPUT_MESSAGE: &str = "insufficient message information";

/// Failure of a single webhook request
#[derive(Debug, Error)]
pub enum RequestError {
    /// Connect, DNS, TLS or timeout failure before a response arrived
    #[error("transport failure: {0}")]
    Transport(String),
    /// Webhook answered with a status other than 200
    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),
    /// Response body was not valid JSON
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
    /// Response normalized to an empty summary
    #[error("upstream returned an empty summary")]
    EmptySummary,
}

/// Failure of a cache persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("cache io failure: {0}")]
    Io(#[from] std::io::Error),
    /// Entry could not be encoded or decoded
    #[error("cache entry serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    /// In-memory store lock was poisoned by a panicking writer
    #[error("cache store lock poisoned")]
    Poisoned,
}

/// Summary service error taxonomy
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Message data was empty
    #[error("no message information received")]
    NoInput,
    /// No valid account for the caller
    #[error("not authenticated: {0}")]
    Unauthenticated(String),
    /// Summaries are switched off by configuration
    #[error("summary feature is disabled")]
    FeatureDisabled,
    /// Upstream request failed or produced an empty summary
    #[error("summarization failed: {0}")]
    SummarizationFailed(#[from] RequestError),
    /// Malformed tool parameters or configuration
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Message safe to show to the end user
    ///
    /// Upstream distinctions (transport, status, malformed, empty) all
    /// collapse to [`SUMMARY_FAILED_MESSAGE`].
    pub fn user_message(&self) -> String {
        match self {
            Self::NoInput => NO_INPUT_MESSAGE.to_owned(),
            Self::Unauthenticated(_) => "not authenticated".to_owned(),
            Self::FeatureDisabled => "summary feature is disabled".to_owned(),
            Self::SummarizationFailed(_) | Self::Internal(_) => SUMMARY_FAILED_MESSAGE.to_owned(),
            Self::InvalidInput(msg) => format!("invalid input: {msg}"),
        }
    }

    /// Convert to MCP `ErrorData`
    ///
    /// # Mappings
    ///
    /// - `NoInput` → `invalid_params`
    /// - `Unauthenticated` → `invalid_request`
    /// - `FeatureDisabled` → `invalid_request`
    /// - `SummarizationFailed` → `internal_error`
    /// - `InvalidInput` → `invalid_params`
    /// - `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        let message = self.user_message();
        match self {
            Self::NoInput => ErrorData::invalid_params(message, Some(json!({ "code": "no_input" }))),
            Self::Unauthenticated(_) => {
                ErrorData::invalid_request(message, Some(json!({ "code": "unauthenticated" })))
            }
            Self::FeatureDisabled => {
                ErrorData::invalid_request(message, Some(json!({ "code": "feature_disabled" })))
            }
            Self::SummarizationFailed(_) => {
                ErrorData::internal_error(message, Some(json!({ "code": "summarization_failed" })))
            }
            Self::InvalidInput(_) => {
                ErrorData::invalid_params(message, Some(json!({ "code": "invalid_input" })))
            }
            Self::Internal(_) => {
                ErrorData::internal_error(message, Some(json!({ "code": "internal" })))
            }
        }
    }
}

/// Type alias for fallible service return values
pub type ServiceResult<T> = Result<T, ServiceError>;
