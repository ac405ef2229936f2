//! Session token extraction.

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::{HeaderMap, Uri};
use axum_extra::extract::CookieJar;

/// Where a request's session token may come from.
///
/// The same token name is used for the query parameter and the cookie. A
/// non-empty query parameter takes precedence over the cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSource {
    query: Option<String>,
    cookie: Option<String>,
}

impl TokenSource {
    /// Create a token source from already extracted values.
    pub fn new(query: Option<String>, cookie: Option<String>) -> Self {
        Self { query, cookie }
    }

    /// Extract both candidate tokens from a request's URI and headers.
    pub fn from_parts(uri: &Uri, headers: &HeaderMap, token_name: &str) -> Self {
        let query = Query::<HashMap<String, String>>::try_from_uri(uri)
            .ok()
            .and_then(|Query(mut params)| params.remove(token_name));

        let cookie = CookieJar::from_headers(headers)
            .get(token_name)
            .map(|c| c.value().to_string());

        Self { query, cookie }
    }

    /// The effective token, if any.
    pub fn token(&self) -> Option<&str> {
        non_empty(&self.query).or_else(|| non_empty(&self.cookie))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|t| !t.is_empty())
}
