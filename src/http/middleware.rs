//! The access gate as axum middleware.

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::Router;
use tracing::{debug, instrument};

use super::response::deny_response;
use crate::access::{AccessPolicy, Decision, PolicyTable, RequestGate};
use crate::error::Result;
use crate::identity::{self, IdentityResolver, TokenSource};

/// Default name of the session token query parameter and cookie.
pub const DEFAULT_TOKEN_NAME: &str = "token";

/// Everything the middleware needs to gate a request.
#[derive(Clone)]
pub struct AccessGuard {
    /// Decision logic and counters
    gate: RequestGate,
    /// Policies keyed by route pattern
    policies: Arc<PolicyTable>,
    /// Token to identity lookup
    resolver: Arc<dyn IdentityResolver>,
    /// Query parameter and cookie name carrying the token
    token_name: Arc<str>,
}

impl AccessGuard {
    /// Create a guard from its collaborators.
    pub fn new(
        gate: RequestGate,
        policies: PolicyTable,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            gate,
            policies: Arc::new(policies),
            resolver,
            token_name: Arc::from(DEFAULT_TOKEN_NAME),
        }
    }

    /// Read the session token from a differently named parameter and cookie.
    pub fn with_token_name(mut self, token_name: &str) -> Self {
        self.token_name = Arc::from(token_name);
        self
    }

    /// The gate used by this guard.
    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Install the guard on every route registered so far.
    ///
    /// Uses `route_layer` so the matched route pattern is known when the
    /// policy is looked up. Routes added afterwards are not gated.
    pub fn wrap<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(from_fn_with_state(self, access_gate))
    }

    /// Policy for a request: by matched route pattern, else by literal path.
    fn policy_for(&self, matched: Option<&MatchedPath>, path: &str) -> Option<AccessPolicy> {
        matched
            .and_then(|m| self.policies.get(m.as_str()))
            .or_else(|| self.policies.get(path))
            .copied()
    }
}

/// Middleware resolving the caller, enforcing the endpoint policy and
/// scoping the caller's identity to the rest of the request.
///
/// Denials are rendered here and the handler never runs. Faults from the
/// resolver or the counter store are returned to axum as errors.
#[instrument(
    skip_all,
    fields(method = %request.method(), path = %request.uri().path())
)]
pub async fn access_gate(
    State(guard): State<AccessGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let source = TokenSource::from_parts(request.uri(), request.headers(), &guard.token_name);
    let identity = identity::resolve_identity(guard.resolver.as_ref(), &source).await?;

    if let Some(identity) = &identity {
        debug!(user_id = identity.id, nickname = %identity.nickname, "Resolved caller");
        request.extensions_mut().insert(identity.clone());
    }

    // Counters are keyed by the concrete request path.
    let endpoint = request.uri().path().to_string();
    let policy = guard.policy_for(request.extensions().get::<MatchedPath>(), &endpoint);

    identity::scope(identity.clone(), async move {
        let decision = guard
            .gate
            .evaluate(&endpoint, policy.as_ref(), identity.as_ref())
            .await?;

        match decision {
            Decision::Allow => Ok(next.run(request).await),
            Decision::Deny(reason) => {
                debug!(endpoint = %endpoint, reason = %reason, "Request denied by access gate");
                Ok(deny_response(reason))
            }
        }
    })
    .await
}
