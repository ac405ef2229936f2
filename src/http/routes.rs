//! Demo application served by the `accessgate` binary.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::middleware::AccessGuard;
use crate::access::{AccessPolicy, DenyReason, PolicyTable};
use crate::identity::{self, CurrentUser, Identity, MemorySessionStore};

/// Shared state of the demo handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session store, also the guard's identity resolver
    pub sessions: Arc<MemorySessionStore>,
    /// Cookie name set on login
    pub token_name: String,
}

/// Policies for the demo routes.
///
/// `/seckill/path` allows each user five calls per five seconds; `/vote`
/// allows three calls per minute shared by everyone.
pub fn default_policies() -> PolicyTable {
    PolicyTable::new()
        .limit("/seckill/path", AccessPolicy::per_user(5, 5))
        .limit("/vote", AccessPolicy::shared(60, 3))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    id: i64,
    nickname: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
    user: Option<Identity>,
}

async fn health() -> &'static str {
    "OK"
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let token = state.sessions.issue(Identity::new(req.id, req.nickname));
    info!(user_id = req.id, "User logged in");

    let cookie = Cookie::build((state.token_name.clone(), token.clone()))
        .path("/")
        .http_only(true);

    (jar.add(cookie), Json(LoginResponse { token }))
}

async fn whoami(CurrentUser(user): CurrentUser) -> Json<Option<Identity>> {
    Json(user)
}

async fn vote() -> Json<Ack> {
    Json(Ack {
        ok: true,
        user: identity::current(),
    })
}

async fn seckill_path() -> Result<Json<Ack>, DenyReason> {
    // The guard already rejected anonymous callers for this route.
    let user = identity::current().ok_or(DenyReason::SessionError)?;
    Ok(Json(Ack {
        ok: true,
        user: Some(user),
    }))
}

/// Build the demo router with `guard` installed on every gated route.
///
/// `/health` and `/login` are registered after the guard and stay ungated.
pub fn demo_router(state: AppState, guard: AccessGuard) -> Router {
    let gated = Router::new()
        .route("/whoami", get(whoami))
        .route("/vote", post(vote))
        .route("/seckill/path", get(seckill_path));

    guard
        .wrap(gated)
        .route("/health", get(health))
        .route("/login", post(login))
        .with_state(state)
}
