//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers the summary tools.
//! Handles account resolution, input validation, and response formatting;
//! caching and webhook calls live in [`SummaryService`].

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use tracing::warn;

use crate::config::{Account, ServerConfig};
use crate::errors::{ServiceError, ServiceResult};
use crate::models::{
    AccountInfo, CachedSummary, ClearCacheAck, MessageRefInput, Meta, SummarizeInput,
    SummaryResult, ToolEnvelope,
};
use crate::requester::WebhookRequester;
use crate::service::{ServiceSettings, SummaryService};
use crate::store::CacheStore;

/// Maximum characters of assembled message text accepted per call
const MAX_MESSAGE_DATA_CHARS: usize = 200_000;
/// Maximum message identifier length
const MAX_MESSAGE_ID_CHARS: usize = 512;
/// Upper bound for the reported conversation size
const MAX_THREAD_COUNT: u32 = 10_000;

/// Summary MCP server
///
/// Holds shared configuration and the summary service. Implements MCP tool
/// handlers via `#[tool]` attribute macro and `ServerHandler` trait.
#[derive(Clone)]
pub struct MailSummaryServer {
    /// Server config (accounts, webhook, flags)
    config: Arc<ServerConfig>,
    /// Cache + webhook orchestration
    service: Arc<SummaryService>,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MailSummaryServer {
    /// Create a new MCP server instance
    ///
    /// Builds the webhook client and picks the cache backend from
    /// `cache_dir` (file store) or falls back to memory.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be built.
    pub fn new(config: ServerConfig) -> ServiceResult<Self> {
        let requester = WebhookRequester::new(config.webhook_url.clone(), config.api_key.clone())?;
        let cache = CacheStore::from_dir(config.cache_dir.as_deref());
        let service = SummaryService::new(ServiceSettings::from(&config), cache, Arc::new(requester));
        Ok(Self::with_service(config, service))
    }

    /// Create a server around an existing service
    pub fn with_service(config: ServerConfig, service: SummaryService) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: List configured accounts
    #[tool(
        name = "summary_list_accounts",
        description = "List accounts that can request message summaries"
    )]
    async fn list_accounts(&self) -> Result<Json<ToolEnvelope<Vec<AccountInfo>>>, ErrorData> {
        let started = Instant::now();
        let data = self
            .config
            .accounts
            .values()
            .map(|a| AccountInfo {
                account_id: a.account_id.clone(),
                email: a.email.clone(),
            })
            .collect::<Vec<_>>();
        finalize_tool(
            started,
            Ok((format!("{} account(s) configured", data.len()), data)),
        )
    }

    /// Tool: Return a cached summary without generating one
    ///
    /// Never calls the summarization webhook. `summary` is null on a miss.
    #[tool(
        name = "summary_get_cached",
        description = "Get a cached message summary without generating one"
    )]
    async fn get_cached(
        &self,
        Parameters(input): Parameters<MessageRefInput>,
    ) -> Result<Json<ToolEnvelope<CachedSummary>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.get_cached_impl(&input).map(|data| {
                let outcome = if data.from_cache {
                    "Cached summary found"
                } else {
                    "No cached summary"
                };
                (outcome.to_owned(), data)
            }),
        )
    }

    /// Tool: Summarize a message
    ///
    /// Serves from cache when possible; otherwise calls the webhook and
    /// stores the result.
    #[tool(
        name = "summary_generate",
        description = "Summarize a message, using the per-account cache when possible"
    )]
    async fn generate(
        &self,
        Parameters(input): Parameters<SummarizeInput>,
    ) -> Result<Json<ToolEnvelope<SummaryResult>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.generate_impl(&input).await.map(|data| {
                let outcome = if data.from_cache {
                    "Summary served from cache"
                } else {
                    "Summary generated"
                };
                (outcome.to_owned(), data)
            }),
        )
    }

    /// Tool: Invalidate a cached summary
    ///
    /// Idempotent; a missing entry is reported as `cleared=false`, not an
    /// error.
    #[tool(
        name = "summary_clear_cache",
        description = "Remove the cached summary for a message"
    )]
    async fn clear_cache(
        &self,
        Parameters(input): Parameters<MessageRefInput>,
    ) -> Result<Json<ToolEnvelope<ClearCacheAck>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.clear_cache_impl(&input)
                .map(|data| ("Cache cleared".to_owned(), data)),
        )
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for MailSummaryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Email summary MCP server. Call summary_get_cached when a message is opened, summary_generate when the user asks for a summary, and summary_clear_cache when the summary is dismissed.",
        )
    }
}

/// Tool implementation methods
///
/// Private methods handle the business logic for each tool, separated from
/// the public `#[tool]` methods that handle response formatting.
impl MailSummaryServer {
    fn get_cached_impl(&self, input: &MessageRefInput) -> ServiceResult<CachedSummary> {
        let account = self.resolve_account(&input.account_id)?;
        validate_message_id(&input.message_id)?;
        let summary = self
            .service
            .get_cached(account, &input.message_id, self.config.cache_enabled)?;
        Ok(CachedSummary {
            from_cache: summary.is_some(),
            summary,
        })
    }

    async fn generate_impl(&self, input: &SummarizeInput) -> ServiceResult<SummaryResult> {
        let account = self.resolve_account(&input.account_id)?;
        validate_message_id(&input.message_id)?;
        validate_message_data(&input.message_data)?;
        validate_range(input.thread_count, 1, MAX_THREAD_COUNT, "thread_count")?;
        self.service
            .summarize(
                account,
                &input.message_data,
                &input.message_id,
                input.thread_count,
                self.config.cache_enabled,
            )
            .await
    }

    fn clear_cache_impl(&self, input: &MessageRefInput) -> ServiceResult<ClearCacheAck> {
        let account = self.resolve_account(&input.account_id)?;
        validate_message_id(&input.message_id)?;
        Ok(ClearCacheAck {
            message_id: input.message_id.clone(),
            cleared: self.service.clear_cache(account, &input.message_id),
        })
    }

    /// Validate the account parameter and look it up
    ///
    /// Unknown accounts are treated as unauthenticated callers.
    fn resolve_account(&self, account_id: &str) -> ServiceResult<&Account> {
        validate_account_id(account_id)?;
        self.config.get_account(account_id).inspect_err(|e| {
            warn!(account_id, error = %e, "rejected summary call");
        })
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: ServiceResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((outcome, data)) => Ok(Json(ToolEnvelope {
            outcome,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}

/// Validate account_id format
fn validate_account_id(account_id: &str) -> ServiceResult<()> {
    if account_id.is_empty() || account_id.len() > 64 {
        return Err(ServiceError::InvalidInput(
            "account_id must be 1..64 characters".to_owned(),
        ));
    }
    if !account_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(ServiceError::InvalidInput(
            "account_id must match [A-Za-z0-9_-]+".to_owned(),
        ));
    }
    Ok(())
}

/// Validate message identifier; empty is allowed and disables caching
fn validate_message_id(message_id: &str) -> ServiceResult<()> {
    if message_id.chars().count() > MAX_MESSAGE_ID_CHARS {
        return Err(ServiceError::InvalidInput(format!(
            "message_id must be at most {MAX_MESSAGE_ID_CHARS} characters"
        )));
    }
    validate_no_controls(message_id, "message_id")
}

/// Validate assembled message text size; emptiness is the service's call
fn validate_message_data(message_data: &str) -> ServiceResult<()> {
    if message_data.chars().count() > MAX_MESSAGE_DATA_CHARS {
        return Err(ServiceError::InvalidInput(format!(
            "message_data must be at most {MAX_MESSAGE_DATA_CHARS} characters"
        )));
    }
    Ok(())
}

/// Reject control characters in identifiers
fn validate_no_controls(value: &str, field: &str) -> ServiceResult<()> {
    if value.chars().any(|ch| ch.is_ascii_control()) {
        return Err(ServiceError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

/// Validate numeric value in range
fn validate_range(value: u32, min: u32, max: u32, field: &str) -> ServiceResult<()> {
    if value < min || value > max {
        return Err(ServiceError::InvalidInput(format!(
            "{field} must be in range {min}..{max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::{MailSummaryServer, validate_account_id, validate_message_id};
    use crate::config::ServerConfig;
    use crate::errors::ServiceError;
    use crate::models::{MessageRefInput, SummarizeInput};
    use crate::service::tests::{CountingRequester, account};
    use crate::service::{ServiceSettings, SummaryService};
    use crate::store::{CacheStore, MemoryStore};

    fn config(cache_enabled: bool) -> ServerConfig {
        let acct = account();
        ServerConfig {
            accounts: BTreeMap::from([(acct.account_id.clone(), acct)]),
            webhook_url: "http://127.0.0.1:1/hook".to_owned(),
            api_key: None,
            timeout_ms: 1_000,
            enabled: true,
            cache_enabled,
            cache_dir: None,
        }
    }

    fn server(requester: Arc<CountingRequester>, cache_enabled: bool) -> MailSummaryServer {
        let config = config(cache_enabled);
        let service = SummaryService::new(
            ServiceSettings::from(&config),
            CacheStore::new(Arc::new(MemoryStore::new())),
            requester,
        );
        MailSummaryServer::with_service(config, service)
    }

    fn summarize_input(message_id: &str) -> SummarizeInput {
        SummarizeInput {
            account_id: "default".to_owned(),
            message_data: "From: a@b.c\nSubject: Hi\nContent: hello".to_owned(),
            message_id: message_id.to_owned(),
            thread_count: 1,
        }
    }

    fn message_ref(message_id: &str) -> MessageRefInput {
        MessageRefInput {
            account_id: "default".to_owned(),
            message_id: message_id.to_owned(),
        }
    }

    #[tokio::test]
    async fn generate_then_get_cached_then_clear() {
        let requester = CountingRequester::ok("point one\npoint two");
        let server = server(requester.clone(), true);

        let empty = server.get_cached_impl(&message_ref("M1")).expect("lookup");
        assert!(!empty.from_cache);
        assert!(empty.summary.is_none());

        let generated = server
            .generate_impl(&summarize_input("M1"))
            .await
            .expect("summary");
        assert!(!generated.from_cache);

        let cached = server.get_cached_impl(&message_ref("M1")).expect("lookup");
        assert!(cached.from_cache);
        assert_eq!(cached.summary.as_deref(), Some("point one\npoint two"));

        let ack = server.clear_cache_impl(&message_ref("M1")).expect("ack");
        assert!(ack.cleared);
        let ack = server.clear_cache_impl(&message_ref("M1")).expect("ack");
        assert!(!ack.cleared);
        assert_eq!(requester.calls(), 1);
    }

    #[tokio::test]
    async fn cache_flag_off_skips_lookup_and_storage() {
        let requester = CountingRequester::ok("summary");
        let server = server(requester.clone(), false);
        server
            .generate_impl(&summarize_input("M1"))
            .await
            .expect("summary");
        let cached = server.get_cached_impl(&message_ref("M1")).expect("lookup");
        assert!(cached.summary.is_none());
        server
            .generate_impl(&summarize_input("M1"))
            .await
            .expect("summary");
        assert_eq!(requester.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_account_is_unauthenticated() {
        let server = server(CountingRequester::ok("summary"), true);
        let mut input = summarize_input("M1");
        input.account_id = "nobody".to_owned();
        let err = server.generate_impl(&input).await.expect_err("must fail");
        assert!(matches!(err, ServiceError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn zero_thread_count_is_rejected() {
        let server = server(CountingRequester::ok("summary"), true);
        let mut input = summarize_input("M1");
        input.thread_count = 0;
        let err = server.generate_impl(&input).await.expect_err("must fail");
        assert!(err.to_string().contains("thread_count"));
    }

    #[test]
    fn rejects_control_chars_in_message_id() {
        let err = validate_message_id("INBOX_1\r\n").expect_err("must fail");
        assert!(err.to_string().contains("control characters"));
    }

    #[test]
    fn empty_message_id_is_allowed() {
        validate_message_id("").expect("empty id disables caching, not an error");
    }

    #[test]
    fn account_id_charset_is_enforced() {
        validate_account_id("work-mail_2").expect("valid");
        assert!(validate_account_id("bad id").is_err());
        assert!(validate_account_id("").is_err());
    }
}
