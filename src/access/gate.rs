//! The request gate: per-endpoint access limiting against a counter store.

use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::key::CounterKey;
use super::policy::AccessPolicy;
use crate::config::StoreFailurePolicy;
use crate::error::Result;
use crate::identity::Identity;
use crate::store::CounterStore;

/// Default namespace for counter keys in the store.
pub const DEFAULT_KEY_PREFIX: &str = "AccessKey:access";

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The endpoint requires login and no identity was resolved
    SessionError,
    /// The caller already used up the window's allowance
    AccessLimitReached,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::SessionError => write!(f, "session error"),
            DenyReason::AccessLimitReached => write!(f, "access limit reached"),
        }
    }
}

/// Outcome of evaluating a request against its endpoint policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Continue to the handler
    Allow,
    /// Short-circuit with the given reason
    Deny(DenyReason),
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decides allow/deny for each request and maintains the access counters.
///
/// The gate holds no per-request state and can be shared across tasks.
#[derive(Clone)]
pub struct RequestGate {
    /// Shared counter store
    store: Arc<dyn CounterStore>,
    /// Namespace prepended to every counter key
    key_prefix: String,
    /// Behavior when the store fails
    on_store_error: StoreFailurePolicy,
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("key_prefix", &self.key_prefix)
            .field("on_store_error", &self.on_store_error)
            .finish_non_exhaustive()
    }
}

impl RequestGate {
    /// Create a gate over the given store with default settings.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            on_store_error: StoreFailurePolicy::default(),
        }
    }

    /// Use a different counter key namespace.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Choose what happens when the counter store fails.
    pub fn with_store_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.on_store_error = policy;
        self
    }

    /// Evaluate a request to `endpoint`.
    ///
    /// Endpoints without a policy are always allowed and the store is never
    /// touched. Login-only endpoints deny anonymous callers before any
    /// counter is read. Otherwise one hit is counted against the endpoint's
    /// counter unless it already reached `max_count`.
    ///
    /// Store faults are returned as errors under
    /// [`StoreFailurePolicy::FailClosed`] and logged then allowed under
    /// [`StoreFailurePolicy::FailOpen`].
    pub async fn evaluate(
        &self,
        endpoint: &str,
        policy: Option<&AccessPolicy>,
        identity: Option<&Identity>,
    ) -> Result<Decision> {
        let Some(policy) = policy else {
            trace!(endpoint = %endpoint, "No access policy, allowing");
            return Ok(Decision::Allow);
        };

        if policy.requires_login && identity.is_none() {
            info!(endpoint = %endpoint, "Login required, denying anonymous request");
            return Ok(Decision::Deny(DenyReason::SessionError));
        }

        let key = CounterKey::new(endpoint, policy, identity);
        let store_key = key.store_key(&self.key_prefix);

        trace!(
            key = %store_key,
            max_count = policy.max_count,
            window_seconds = policy.window_seconds,
            "Checking access limit"
        );

        let counted = match self
            .store
            .increment_within(&store_key, policy.max_count, policy.window())
            .await
        {
            Ok(counted) => counted,
            Err(e) => match self.on_store_error {
                StoreFailurePolicy::FailClosed => return Err(e),
                StoreFailurePolicy::FailOpen => {
                    warn!(key = %store_key, error = %e, "Counter store failed, allowing request");
                    return Ok(Decision::Allow);
                }
            },
        };

        match counted {
            Some(count) => {
                debug!(key = %store_key, count, max_count = policy.max_count, "Access counted");
                Ok(Decision::Allow)
            }
            None => {
                info!(
                    key = %store_key,
                    max_count = policy.max_count,
                    "Access limit reached"
                );
                Ok(Decision::Deny(DenyReason::AccessLimitReached))
            }
        }
    }

    /// Get the current counter value for an endpoint and caller.
    ///
    /// Returns `None` if the counter is absent or its window has expired.
    pub async fn counter_value(
        &self,
        endpoint: &str,
        policy: &AccessPolicy,
        identity: Option<&Identity>,
    ) -> Result<Option<u64>> {
        let key = CounterKey::new(endpoint, policy, identity);
        self.store.get(&key.store_key(&self.key_prefix)).await
    }

    /// The underlying counter store.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// The counter key namespace.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccessGateError;
    use crate::store::MemoryCounterStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts every store call and relies on the trait's two-call protocol.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryCounterStore,
        calls: AtomicUsize,
    }

    impl RecordingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CounterStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<u64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value, ttl).await
        }

        async fn incr(&self, key: &str) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.incr(key).await
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.ttl(key).await
        }
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<u64>> {
            Err(AccessGateError::StoreUnavailable("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: u64, _ttl: Duration) -> Result<()> {
            Err(AccessGateError::StoreUnavailable("connection refused".to_string()))
        }

        async fn incr(&self, _key: &str) -> Result<u64> {
            Err(AccessGateError::StoreUnavailable("connection refused".to_string()))
        }

        async fn ttl(&self, _key: &str) -> Result<Option<Duration>> {
            Err(AccessGateError::StoreUnavailable("connection refused".to_string()))
        }
    }

    fn memory_gate() -> (RequestGate, Arc<MemoryCounterStore>) {
        let store = Arc::new(MemoryCounterStore::new());
        (RequestGate::new(store.clone()), store)
    }

    fn alice() -> Identity {
        Identity::new(1, "alice")
    }

    fn bob() -> Identity {
        Identity::new(2, "bob")
    }

    #[tokio::test]
    async fn test_no_policy_allows_without_touching_store() {
        let store = Arc::new(RecordingStore::default());
        let gate = RequestGate::new(store.clone());

        for _ in 0..10 {
            let decision = gate.evaluate("/free", None, None).await.unwrap();
            assert_eq!(decision, Decision::Allow);
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_login_required_denies_anonymous_without_touching_store() {
        let store = Arc::new(RecordingStore::default());
        let gate = RequestGate::new(store.clone());
        let policy = AccessPolicy::per_user(5, 5);

        let decision = gate.evaluate("/seckill/path", Some(&policy), None).await.unwrap();

        assert_eq!(decision, Decision::Deny(DenyReason::SessionError));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_key_starts_at_one_with_window_ttl() {
        let (gate, store) = memory_gate();
        let policy = AccessPolicy::shared(60, 3);

        let decision = gate.evaluate("/vote", Some(&policy), None).await.unwrap();
        assert!(decision.is_allowed());

        let key = format!("{}/vote", DEFAULT_KEY_PREFIX);
        assert_eq!(store.get(&key).await.unwrap(), Some(1));
        let ttl = store.ttl(&key).await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(60));
        assert!(ttl > Duration::from_secs(58));
    }

    #[tokio::test]
    async fn test_limit_caps_then_window_resets() {
        let (gate, _store) = memory_gate();
        let policy = AccessPolicy::shared(1, 3);

        for expected in 1..=3 {
            let decision = gate.evaluate("/vote", Some(&policy), None).await.unwrap();
            assert_eq!(decision, Decision::Allow, "request {} should be allowed", expected);
            assert_eq!(
                gate.counter_value("/vote", &policy, None).await.unwrap(),
                Some(expected)
            );
        }

        let decision = gate.evaluate("/vote", Some(&policy), None).await.unwrap();
        assert_eq!(decision, Decision::Deny(DenyReason::AccessLimitReached));
        // A denied request does not move the counter.
        assert_eq!(gate.counter_value("/vote", &policy, None).await.unwrap(), Some(3));

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let decision = gate.evaluate("/vote", Some(&policy), None).await.unwrap();
        assert_eq!(decision, Decision::Allow);
        assert_eq!(gate.counter_value("/vote", &policy, None).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_increments_do_not_extend_window() {
        let (gate, store) = memory_gate();
        let policy = AccessPolicy::shared(1, 100);
        let key = format!("{}/poll", DEFAULT_KEY_PREFIX);

        gate.evaluate("/poll", Some(&policy), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        gate.evaluate("/poll", Some(&policy), None).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(2));

        // Past the first hit's window; a renewed expiry would still hold the key.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_per_user_counters_are_isolated() {
        let (gate, _store) = memory_gate();
        let policy = AccessPolicy::per_user(60, 2);

        for _ in 0..2 {
            assert!(gate
                .evaluate("/seckill/path", Some(&policy), Some(&alice()))
                .await
                .unwrap()
                .is_allowed());
        }
        assert_eq!(
            gate.evaluate("/seckill/path", Some(&policy), Some(&alice()))
                .await
                .unwrap(),
            Decision::Deny(DenyReason::AccessLimitReached)
        );

        // Bob still has his full allowance.
        assert!(gate
            .evaluate("/seckill/path", Some(&policy), Some(&bob()))
            .await
            .unwrap()
            .is_allowed());
        assert_eq!(
            gate.counter_value("/seckill/path", &policy, Some(&bob()))
                .await
                .unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_shared_counter_spans_callers() {
        let (gate, _store) = memory_gate();
        let policy = AccessPolicy::shared(60, 3);

        assert!(gate.evaluate("/vote", Some(&policy), Some(&alice())).await.unwrap().is_allowed());
        assert!(gate.evaluate("/vote", Some(&policy), Some(&bob())).await.unwrap().is_allowed());
        assert!(gate.evaluate("/vote", Some(&policy), None).await.unwrap().is_allowed());

        assert_eq!(
            gate.evaluate("/vote", Some(&policy), Some(&alice())).await.unwrap(),
            Decision::Deny(DenyReason::AccessLimitReached)
        );
        assert_eq!(
            gate.evaluate("/vote", Some(&policy), None).await.unwrap(),
            Decision::Deny(DenyReason::AccessLimitReached)
        );
    }

    #[tokio::test]
    async fn test_two_call_protocol_matches_atomic_backend() {
        let store = Arc::new(RecordingStore::default());
        let gate = RequestGate::new(store.clone());
        let policy = AccessPolicy::shared(60, 2);

        assert!(gate.evaluate("/vote", Some(&policy), None).await.unwrap().is_allowed());
        assert!(gate.evaluate("/vote", Some(&policy), None).await.unwrap().is_allowed());
        assert_eq!(
            gate.evaluate("/vote", Some(&policy), None).await.unwrap(),
            Decision::Deny(DenyReason::AccessLimitReached)
        );

        // get+set, get+incr, get
        assert_eq!(store.calls(), 5);
    }

    #[tokio::test]
    async fn test_store_failure_closed_propagates() {
        let gate = RequestGate::new(Arc::new(FailingStore));
        let policy = AccessPolicy::shared(60, 3);

        let result = gate.evaluate("/vote", Some(&policy), None).await;
        assert!(matches!(result, Err(AccessGateError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_store_failure_open_allows() {
        let gate = RequestGate::new(Arc::new(FailingStore))
            .with_store_failure_policy(StoreFailurePolicy::FailOpen);
        let policy = AccessPolicy::shared(60, 3);

        let decision = gate.evaluate("/vote", Some(&policy), None).await.unwrap();
        assert_eq!(decision, Decision::Allow);
    }

    #[tokio::test]
    async fn test_store_failure_irrelevant_without_policy() {
        let gate = RequestGate::new(Arc::new(FailingStore));
        let decision = gate.evaluate("/free", None, None).await.unwrap();
        assert_eq!(decision, Decision::Allow);
    }

    #[tokio::test]
    async fn test_custom_key_prefix() {
        let store = Arc::new(MemoryCounterStore::new());
        let gate = RequestGate::new(store.clone()).with_key_prefix("limits:");
        let policy = AccessPolicy::per_user(60, 3);

        gate.evaluate("/seckill/path", Some(&policy), Some(&alice())).await.unwrap();

        assert_eq!(gate.key_prefix(), "limits:");
        assert_eq!(store.get("limits:/seckill/path_alice").await.unwrap(), Some(1));
    }
}
