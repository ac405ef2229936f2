//! Request-scoped identity slot.
//!
//! The identity lives in a tokio task-local that exists only for the duration
//! of [`scope`]. Leaving the scope, whether the inner future finishes, fails,
//! panics or is dropped, removes the value, so nothing carries over to the
//! next request served by the same worker thread.

use std::convert::Infallible;
use std::future::Future;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::Identity;

tokio::task_local! {
    static CURRENT_IDENTITY: Option<Identity>;
}

/// Run `future` with `identity` as the current request's caller.
pub async fn scope<F>(identity: Option<Identity>, future: F) -> F::Output
where
    F: Future,
{
    CURRENT_IDENTITY.scope(identity, future).await
}

/// The caller of the request being processed, `None` outside a scope or for
/// anonymous requests.
pub fn current() -> Option<Identity> {
    CURRENT_IDENTITY.try_with(Clone::clone).ok().flatten()
}

/// Whether the current task is inside a request scope at all.
pub fn is_set() -> bool {
    CURRENT_IDENTITY.try_with(|_| ()).is_ok()
}

/// Extractor for the caller resolved by the access gate.
///
/// Reads the identity the gate stored in the request extensions and falls
/// back to the task-local slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub Option<Identity>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<Identity>()
            .cloned()
            .or_else(current);
        Ok(CurrentUser(identity))
    }
}
