//! HTTP integration: the axum middleware, denial rendering and the server.

mod middleware;
mod response;
mod routes;
mod server;

pub use middleware::{access_gate, AccessGuard};
pub use response::{deny_response, ErrorBody};
pub use routes::{default_policies, demo_router, AppState};
pub use server::HttpServer;
