//! Configuration module for accounts, the summarization webhook, and flags
//!
//! All configuration is loaded from environment variables following the
//! pattern `MAIL_SUMMARY_<KEY>`. Account segments are discovered by scanning
//! for `MAIL_SUMMARY_*_EMAIL` variables.

use std::collections::BTreeMap;
use std::env;
use std::env::VarError;
use std::path::PathBuf;

use regex::Regex;
use secrecy::SecretString;

use crate::errors::{ServiceError, ServiceResult};

/// Default upstream timeout for summary generation
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Account identity
///
/// Supplied by the host; the summary pipeline only reads it. The `email`
/// is the stable identity used to namespace cache entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Account identifier (lowercase, used as the `account_id` tool parameter)
    pub account_id: String,
    /// Stable identity of the mailbox owner
    pub email: String,
}

/// Server-wide configuration
///
/// Cloned into MCP tool handlers via `Arc` for thread-safe shared access.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// All configured accounts, keyed by `account_id`
    pub accounts: BTreeMap<String, Account>,
    /// Summarization webhook endpoint
    pub webhook_url: String,
    /// Optional `api-key` header value for the webhook
    pub api_key: Option<SecretString>,
    /// Upstream request timeout in milliseconds
    pub timeout_ms: u64,
    /// Whether the summary feature is enabled at all
    pub enabled: bool,
    /// Whether summaries are cached per (account, message)
    pub cache_enabled: bool,
    /// Root directory for the file cache; `None` keeps entries in memory
    pub cache_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// Discovers accounts by scanning for `MAIL_SUMMARY_*_EMAIL` patterns.
    /// If none are defined, a `default` account is required via
    /// `MAIL_SUMMARY_DEFAULT_EMAIL`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if required environment variables are missing
    /// or malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// MAIL_SUMMARY_DEFAULT_EMAIL=user@example.com
    /// MAIL_SUMMARY_WORK_EMAIL=user@company.com
    /// MAIL_SUMMARY_WEBHOOK_URL=https://workflow.example.com/webhook/overview
    /// MAIL_SUMMARY_API_KEY=secret
    /// MAIL_SUMMARY_TIMEOUT_MS=30000
    /// MAIL_SUMMARY_CACHE_DIR=/var/lib/mail-summary
    /// ```
    pub fn load_from_env() -> ServiceResult<Self> {
        let account_pattern = Regex::new(r"^MAIL_SUMMARY_([A-Z0-9_]+)_EMAIL$")
            .map_err(|e| ServiceError::Internal(format!("invalid account regex: {e}")))?;

        let mut account_segments: Vec<String> = env::vars()
            .filter_map(|(k, _)| {
                account_pattern
                    .captures(&k)
                    .and_then(|c| c.get(1).map(|m| m.as_str().to_owned()))
            })
            .collect();

        if account_segments.is_empty() {
            account_segments.push("DEFAULT".to_owned());
        }

        account_segments.sort();
        account_segments.dedup();

        let mut accounts = BTreeMap::new();
        for seg in account_segments {
            let account = load_account(&seg)?;
            accounts.insert(account.account_id.clone(), account);
        }

        let webhook_url = required_env("MAIL_SUMMARY_WEBHOOK_URL")?;
        validate_webhook_url(&webhook_url)?;

        let config = Self {
            accounts,
            webhook_url,
            api_key: optional_env("MAIL_SUMMARY_API_KEY")?
                .map(|key| SecretString::new(key.into())),
            timeout_ms: parse_u64_env("MAIL_SUMMARY_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            enabled: parse_bool_env("MAIL_SUMMARY_ENABLED", true)?,
            cache_enabled: parse_bool_env("MAIL_SUMMARY_CACHE_ENABLED", true)?,
            cache_dir: optional_env("MAIL_SUMMARY_CACHE_DIR")?.map(PathBuf::from),
        };
        if config.timeout_ms == 0 {
            return Err(ServiceError::invalid(
                "MAIL_SUMMARY_TIMEOUT_MS must be greater than zero",
            ));
        }
        Ok(config)
    }

    /// Resolve the calling account
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` if the account ID is not configured.
    pub fn get_account(&self, account_id: &str) -> ServiceResult<&Account> {
        self.accounts.get(account_id).ok_or_else(|| {
            ServiceError::Unauthenticated(format!("account '{account_id}' is not configured"))
        })
    }
}

/// Load a single account from environment
///
/// Reads `MAIL_SUMMARY_<SEGMENT>_EMAIL`. Normalizes the segment name to
/// lowercase for `account_id` (`DEFAULT` becomes `default`).
fn load_account(segment: &str) -> ServiceResult<Account> {
    let prefix = format!("MAIL_SUMMARY_{}_", sanitize_segment(segment));
    let email = required_env(&format!("{prefix}EMAIL"))?;

    Ok(Account {
        account_id: if segment == "DEFAULT" {
            "default".to_owned()
        } else {
            segment.to_ascii_lowercase()
        },
        email: email.trim().to_owned(),
    })
}

/// Only http(s) endpoints are accepted
fn validate_webhook_url(url: &str) -> ServiceResult<()> {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") {
        Ok(())
    } else {
        Err(ServiceError::invalid(format!(
            "MAIL_SUMMARY_WEBHOOK_URL must be an http(s) URL: '{url}'"
        )))
    }
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> ServiceResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ServiceError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Read an optional environment variable; blank counts as unset
fn optional_env(key: &str) -> ServiceResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ServiceError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Sanitize an account segment to uppercase alphanumeric/underscore
fn sanitize_segment(seg: &str) -> String {
    let mut out = String::with_capacity(seg.len());
    for ch in seg.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    out.trim_matches('_').to_owned()
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set to an unrecognized value.
fn parse_bool_env(key: &str, default: bool) -> ServiceResult<bool> {
    match env::var(key) {
        Ok(v) => parse_bool_value(&v).ok_or_else(|| {
            ServiceError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(ServiceError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` environment variable with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> ServiceResult<u64> {
    match env::var(key) {
        Ok(v) => v.trim().parse::<u64>().map_err(|_| {
            ServiceError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(ServiceError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}
