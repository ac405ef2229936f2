//! Counter key derivation.

use super::policy::AccessPolicy;
use crate::identity::Identity;

/// A key that uniquely identifies one access counter.
///
/// The key is the endpoint, suffixed with `_<nickname>` when the policy
/// requires login. Limits are therefore per user on login-only endpoints and
/// shared by all callers everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The endpoint this counter belongs to
    pub endpoint: String,
    /// The caller's display name, present only for per-user limits
    pub user: Option<String>,
}

impl CounterKey {
    /// Create a counter key for an endpoint, policy and caller.
    pub fn new(endpoint: &str, policy: &AccessPolicy, identity: Option<&Identity>) -> Self {
        let user = if policy.requires_login {
            identity.map(|i| i.nickname.clone())
        } else {
            None
        };

        Self {
            endpoint: endpoint.to_string(),
            user,
        }
    }

    /// The unprefixed key string.
    pub fn to_string_key(&self) -> String {
        match &self.user {
            Some(user) => format!("{}_{}", self.endpoint, user),
            None => self.endpoint.clone(),
        }
    }

    /// The key as stored, with the store namespace prepended verbatim.
    pub fn store_key(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.to_string_key())
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
