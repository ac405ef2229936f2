//! Caller identity: resolution from request tokens and request-scoped context.
//!
//! Session storage is not owned here. The gate only needs something that maps
//! a token to an [`Identity`]; [`MemorySessionStore`] is the bundled default.

mod context;
mod session;
mod token;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::Result;

pub use context::{current, is_set, scope, CurrentUser};
pub use session::MemorySessionStore;
pub use token::TokenSource;

/// A resolved, logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id
    pub id: i64,
    /// Display name, also used to key per-user access counters
    pub nickname: String,
}

impl Identity {
    /// Create a new identity.
    pub fn new(id: i64, nickname: impl Into<String>) -> Self {
        Self {
            id,
            nickname: nickname.into(),
        }
    }
}

/// Maps a session token to the user it belongs to.
///
/// Implementations may refresh the session's expiry as a side effect.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a token, `None` if it is unknown or expired.
    async fn resolve(&self, token: &str) -> Result<Option<Identity>>;
}

/// Resolve the caller behind a request's token, if it carries one.
///
/// The resolver is not consulted when neither the query parameter nor the
/// cookie holds a non-empty token.
pub async fn resolve_identity(
    resolver: &dyn IdentityResolver,
    source: &TokenSource,
) -> Result<Option<Identity>> {
    let Some(token) = source.token() else {
        trace!("No session token on request");
        return Ok(None);
    };

    resolver.resolve(token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityResolver for CountingResolver {
        async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((token == "good").then(|| Identity::new(7, "carol")))
        }
    }

    #[tokio::test]
    async fn test_no_token_skips_resolver() {
        let resolver = CountingResolver::default();
        let source = TokenSource::default();

        let identity = resolve_identity(&resolver, &source).await.unwrap();

        assert!(identity.is_none());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_token_is_resolved() {
        let resolver = CountingResolver::default();
        let source = TokenSource::new(None, Some("good".to_string()));

        let identity = resolve_identity(&resolver, &source).await.unwrap();

        assert_eq!(identity, Some(Identity::new(7, "carol")));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_token_resolves_to_none() {
        let resolver = CountingResolver::default();
        let source = TokenSource::new(Some("stale".to_string()), None);

        assert!(resolve_identity(&resolver, &source).await.unwrap().is_none());
    }
}
