//! Summary orchestration
//!
//! Validates input, applies the caching policy, and coordinates the cache
//! with the webhook requester. Each call is a short, stateless unit of work;
//! concurrent misses for the same message may both reach the webhook and the
//! last write wins, which is harmless because the upstream summary for a
//! fixed message is idempotent.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache_key::CacheKey;
use crate::config::{Account, ServerConfig};
use crate::errors::{RequestError, ServiceError, ServiceResult};
use crate::models::SummaryResult;
use crate::requester::SummaryRequester;
use crate::store::CacheStore;

/// Service switches and limits
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    /// Feature flag; when off every operation short-circuits
    pub enabled: bool,
    /// Upstream timeout for one summary request
    pub timeout_ms: u64,
}

impl From<&ServerConfig> for ServiceSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            enabled: config.enabled,
            timeout_ms: config.timeout_ms,
        }
    }
}

/// Summary service
#[derive(Clone)]
pub struct SummaryService {
    settings: ServiceSettings,
    cache: CacheStore,
    requester: Arc<dyn SummaryRequester>,
}

impl SummaryService {
    /// Create a service over a cache and requester
    pub fn new(
        settings: ServiceSettings,
        cache: CacheStore,
        requester: Arc<dyn SummaryRequester>,
    ) -> Self {
        Self {
            settings,
            cache,
            requester,
        }
    }

    /// Summarize a message, consulting the cache first
    ///
    /// Caching applies only when `caching_enabled` is set and `message_id` is
    /// non-empty. A fresh summary is written through before it is returned;
    /// a failed write is logged and does not fail the call.
    ///
    /// # Errors
    ///
    /// - `FeatureDisabled` if the feature flag is off
    /// - `NoInput` if `message_data` is empty
    /// - `SummarizationFailed` on any request failure or an empty summary
    pub async fn summarize(
        &self,
        account: &Account,
        message_data: &str,
        message_id: &str,
        thread_count: u32,
        caching_enabled: bool,
    ) -> ServiceResult<SummaryResult> {
        self.require_enabled()?;
        if message_data.trim().is_empty() {
            return Err(ServiceError::NoInput);
        }

        let cache_key = (caching_enabled && !message_id.is_empty())
            .then(|| CacheKey::derive(&account.email, message_id));

        if let Some(key) = &cache_key
            && let Some(summary_text) = self.cache.get(&account.email, key)
        {
            info!(
                account_id = %account.account_id,
                message_id,
                "summary served from cache"
            );
            return Ok(SummaryResult {
                summary_text,
                message_count: 1,
                from_cache: true,
            });
        }

        info!(
            account_id = %account.account_id,
            message_id,
            thread_count,
            chars = message_data.chars().count(),
            cached = cache_key.is_some(),
            "generating summary"
        );

        let summary_text = self
            .requester
            .request(message_data, message_id, thread_count, self.settings.timeout_ms)
            .await
            .map_err(|e| {
                warn!(
                    account_id = %account.account_id,
                    message_id,
                    error = %e,
                    "summary request failed"
                );
                ServiceError::SummarizationFailed(e)
            })?;

        if summary_text.trim().is_empty() {
            warn!(
                account_id = %account.account_id,
                message_id,
                "summary webhook returned empty text"
            );
            return Err(ServiceError::SummarizationFailed(RequestError::EmptySummary));
        }

        if let Some(key) = &cache_key
            && !self.cache.put(&account.email, key, &summary_text)
        {
            warn!(
                account_id = %account.account_id,
                message_id,
                "summary generated but could not be cached"
            );
        }

        info!(
            account_id = %account.account_id,
            message_id,
            len = summary_text.len(),
            "summary generated"
        );
        Ok(SummaryResult {
            summary_text,
            message_count: 1,
            from_cache: false,
        })
    }

    /// Look up a cached summary without generating one
    ///
    /// Returns `None` for an empty message id or when caching is off.
    ///
    /// # Errors
    ///
    /// Returns `FeatureDisabled` if the feature flag is off.
    pub fn get_cached(
        &self,
        account: &Account,
        message_id: &str,
        caching_enabled: bool,
    ) -> ServiceResult<Option<String>> {
        self.require_enabled()?;
        if !caching_enabled || message_id.is_empty() {
            return Ok(None);
        }
        let hit = self
            .cache
            .get(&account.email, &CacheKey::derive(&account.email, message_id));
        debug!(
            account_id = %account.account_id,
            message_id,
            hit = hit.is_some(),
            "cache lookup"
        );
        Ok(hit)
    }

    /// Invalidate a cached summary
    ///
    /// Best effort: failures are logged and reported as `false`. A missing
    /// entry is not an error.
    pub fn clear_cache(&self, account: &Account, message_id: &str) -> bool {
        if !self.settings.enabled || message_id.is_empty() {
            return false;
        }
        let removed = self
            .cache
            .remove(&account.email, &CacheKey::derive(&account.email, message_id));
        debug!(
            account_id = %account.account_id,
            message_id,
            removed,
            "cache entry cleared"
        );
        removed
    }

    fn require_enabled(&self) -> ServiceResult<()> {
        if self.settings.enabled {
            Ok(())
        } else {
            Err(ServiceError::FeatureDisabled)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::{ServiceSettings, SummaryService};
    use crate::cache_key::CacheKey;
    use crate::config::Account;
    use crate::errors::{RequestError, ServiceError, StoreError};
    use crate::requester::SummaryRequester;
    use crate::store::{CacheStore, KeyValueStore, MemoryStore};

    /// Requester stub that counts calls and returns a fixed reply
    pub(crate) struct CountingRequester {
        pub(crate) calls: AtomicUsize,
        reply: Result<String, fn() -> RequestError>,
    }

    impl CountingRequester {
        pub(crate) fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Ok(text.to_owned()),
            })
        }

        pub(crate) fn failing(make: fn() -> RequestError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Err(make),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SummaryRequester for CountingRequester {
        async fn request(
            &self,
            _information: &str,
            _message_id: &str,
            _thread_count: u32,
            _timeout_ms: u64,
        ) -> Result<String, RequestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    /// Backend that reads normally but refuses writes
    struct NoWriteStore(MemoryStore);

    impl KeyValueStore for NoWriteStore {
        fn get(&self, ns: &str, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(ns, key)
        }

        fn put(&self, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }

        fn delete(&self, ns: &str, key: &str) -> Result<bool, StoreError> {
            self.0.delete(ns, key)
        }
    }

    pub(crate) fn account() -> Account {
        Account {
            account_id: "default".to_owned(),
            email: "user@example.com".to_owned(),
        }
    }

    fn settings() -> ServiceSettings {
        ServiceSettings {
            enabled: true,
            timeout_ms: 1_000,
        }
    }

    fn service(requester: Arc<CountingRequester>) -> (SummaryService, CacheStore) {
        let cache = CacheStore::new(Arc::new(MemoryStore::new()));
        (
            SummaryService::new(settings(), cache.clone(), requester),
            cache,
        )
    }

    #[tokio::test]
    async fn cache_hit_never_calls_network() {
        let requester = CountingRequester::ok("fresh");
        let (service, cache) = service(requester.clone());
        let acct = account();
        assert!(cache.put(&acct.email, &CacheKey::derive(&acct.email, "abc"), "cached text"));

        let result = service
            .summarize(&acct, "From: x\nContent: hello", "abc", 1, true)
            .await
            .expect("summary");

        assert!(result.from_cache);
        assert_eq!(result.summary_text, "cached text");
        assert_eq!(result.message_count, 1);
        assert_eq!(requester.calls(), 0);
    }

    #[tokio::test]
    async fn miss_writes_through_then_hits() {
        let requester = CountingRequester::ok("fresh summary");
        let (service, _) = service(requester.clone());
        let acct = account();

        let first = service
            .summarize(&acct, "message text", "m1", 3, true)
            .await
            .expect("summary");
        assert!(!first.from_cache);
        assert_eq!(first.summary_text, "fresh summary");

        let cached = service.get_cached(&acct, "m1", true).expect("enabled");
        assert_eq!(cached.as_deref(), Some("fresh summary"));

        let second = service
            .summarize(&acct, "message text", "m1", 3, true)
            .await
            .expect("summary");
        assert!(second.from_cache);
        assert_eq!(requester.calls(), 1);
    }

    #[tokio::test]
    async fn caching_disabled_always_calls_network() {
        let requester = CountingRequester::ok("fresh");
        let (service, _) = service(requester.clone());
        let acct = account();
        for _ in 0..2 {
            let result = service
                .summarize(&acct, "message text", "m1", 1, false)
                .await
                .expect("summary");
            assert!(!result.from_cache);
        }
        assert_eq!(requester.calls(), 2);
        assert_eq!(service.get_cached(&acct, "m1", true).expect("enabled"), None);
    }

    #[tokio::test]
    async fn empty_message_id_bypasses_cache() {
        let requester = CountingRequester::ok("fresh");
        let (service, _) = service(requester.clone());
        let acct = account();
        service
            .summarize(&acct, "message text", "", 1, true)
            .await
            .expect("summary");
        service
            .summarize(&acct, "message text", "", 1, true)
            .await
            .expect("summary");
        assert_eq!(requester.calls(), 2);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_network() {
        let requester = CountingRequester::ok("fresh");
        let (service, _) = service(requester.clone());
        let err = service
            .summarize(&account(), "   ", "m1", 1, true)
            .await
            .expect_err("must fail");
        assert!(matches!(err, ServiceError::NoInput));
        assert_eq!(requester.calls(), 0);
    }

    #[tokio::test]
    async fn empty_summary_is_a_failure_and_not_cached() {
        let requester = CountingRequester::ok("");
        let (service, _) = service(requester.clone());
        let acct = account();
        let err = service
            .summarize(&acct, "message text", "m1", 1, true)
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            ServiceError::SummarizationFailed(RequestError::EmptySummary)
        ));
        assert_eq!(service.get_cached(&acct, "m1", true).expect("enabled"), None);
    }

    #[tokio::test]
    async fn request_errors_become_summarization_failed() {
        let requester = CountingRequester::failing(|| RequestError::UpstreamStatus(500));
        let (service, _) = service(requester);
        let err = service
            .summarize(&account(), "message text", "m1", 1, true)
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            ServiceError::SummarizationFailed(RequestError::UpstreamStatus(500))
        ));
    }

    #[tokio::test]
    async fn cache_write_failure_still_returns_summary() {
        let requester = CountingRequester::ok("fresh");
        let cache = CacheStore::new(Arc::new(NoWriteStore(MemoryStore::new())));
        let service = SummaryService::new(settings(), cache, requester);
        let result = service
            .summarize(&account(), "message text", "m1", 1, true)
            .await
            .expect("summary despite write failure");
        assert_eq!(result.summary_text, "fresh");
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn disabled_feature_short_circuits() {
        let requester = CountingRequester::ok("fresh");
        let service = SummaryService::new(
            ServiceSettings {
                enabled: false,
                timeout_ms: 1_000,
            },
            CacheStore::new(Arc::new(MemoryStore::new())),
            requester.clone(),
        );
        let acct = account();
        let err = service
            .summarize(&acct, "message text", "m1", 1, true)
            .await
            .expect_err("must fail");
        assert!(matches!(err, ServiceError::FeatureDisabled));
        assert!(matches!(
            service.get_cached(&acct, "m1", true),
            Err(ServiceError::FeatureDisabled)
        ));
        assert!(!service.clear_cache(&acct, "m1"));
        assert_eq!(requester.calls(), 0);
    }

    #[tokio::test]
    async fn clear_cache_forces_regeneration() {
        let requester = CountingRequester::ok("fresh");
        let (service, _) = service(requester.clone());
        let acct = account();
        service
            .summarize(&acct, "message text", "m1", 1, true)
            .await
            .expect("summary");
        assert!(service.clear_cache(&acct, "m1"));
        assert!(!service.clear_cache(&acct, "m1"));
        let again = service
            .summarize(&acct, "message text", "m1", 1, true)
            .await
            .expect("summary");
        assert!(!again.from_cache);
        assert_eq!(requester.calls(), 2);
    }

    #[tokio::test]
    async fn accounts_do_not_share_entries() {
        let requester = CountingRequester::ok("alice summary");
        let (service, _) = service(requester);
        let alice = account();
        let bob = Account {
            account_id: "bob".to_owned(),
            email: "bob@example.com".to_owned(),
        };
        service
            .summarize(&alice, "message text", "INBOX_1", 1, true)
            .await
            .expect("summary");
        assert_eq!(service.get_cached(&bob, "INBOX_1", true).expect("enabled"), None);
    }
}
