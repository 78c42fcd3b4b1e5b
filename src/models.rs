//! Input/output DTOs and schema-bearing types
//!
//! Defines the data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata included in all tool responses
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with a human-readable outcome line and execution
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable outcome of the operation
    pub outcome: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Account metadata
///
/// Returned by `summary_list_accounts`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AccountInfo {
    /// Account identifier
    pub account_id: String,
    /// Mailbox owner identity
    pub email: String,
}

/// Generated or cached summary
///
/// `summary` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SummaryResult {
    /// Plain-text summary, one point per line
    #[serde(rename = "summary")]
    pub summary_text: String,
    /// Number of messages covered by the summary
    pub message_count: u32,
    /// Whether the summary came from the cache
    pub from_cache: bool,
}

/// Output of `summary_get_cached`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachedSummary {
    /// Cached summary, `null` when nothing is stored
    pub summary: Option<String>,
    /// True exactly when `summary` is present
    pub from_cache: bool,
}

/// Output of `summary_clear_cache`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClearCacheAck {
    /// Message whose entry was targeted
    pub message_id: String,
    /// Whether an entry existed and was removed
    pub cleared: bool,
}

/// Input: cache lookup or invalidation for one message
///
/// Used by `summary_get_cached` and `summary_clear_cache`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MessageRefInput {
    /// Account identifier (defaults to `"default"`)
    #[serde(default = "default_account_id")]
    pub account_id: String,
    /// Stable message identifier (content hash or `folder_uid`)
    pub message_id: String,
}

/// Input: summarize one message
///
/// Used by `summary_generate`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SummarizeInput {
    /// Account identifier (defaults to `"default"`)
    #[serde(default = "default_account_id")]
    pub account_id: String,
    /// Assembled message text (sender, subject, date, body)
    pub message_data: String,
    /// Stable message identifier; empty disables caching for this call
    #[serde(default)]
    pub message_id: String,
    /// Messages in the conversation, best effort (defaults to 1)
    #[serde(default = "default_thread_count")]
    pub thread_count: u32,
}

/// Default account identifier
fn default_account_id() -> String {
    "default".to_owned()
}

fn default_thread_count() -> u32 {
    1
}
