//! In-memory session store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{Identity, IdentityResolver};
use crate::error::Result;
use crate::store::ExpirySweep;

#[derive(Debug, Clone)]
struct Session {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

/// Token to identity map with a sliding expiry.
///
/// Every successful lookup pushes the session's expiry out by the full TTL.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl MemorySessionStore {
    /// Create a store whose sessions live `ttl_secs` past their last use.
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(i64::from(u32::try_from(ttl_secs).unwrap_or(u32::MAX))),
        }
    }

    /// Open a session for `identity` and return its token.
    pub fn issue(&self, identity: Identity) -> String {
        let token = Uuid::new_v4().simple().to_string();
        debug!(user_id = identity.id, nickname = %identity.nickname, "Issuing session");

        self.sessions.write().insert(
            token.clone(),
            Session {
                identity,
                expires_at: Utc::now() + self.ttl,
            },
        );
        token
    }

    /// Close a session. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    /// When a session expires, if it exists.
    pub fn expires_at(&self, token: &str) -> Option<DateTime<Utc>> {
        self.sessions.read().get(token).map(|s| s.expires_at)
    }

    /// Number of stored sessions, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drop every expired session, returning how many were removed.
    ///
    /// Sessions that are never looked up again are only reclaimed here.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        self.sessions.write().retain(|_, session| {
            let live = session.expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        if removed > 0 {
            debug!(removed, "Purged expired sessions");
        }
        removed
    }
}

impl ExpirySweep for MemorySessionStore {
    fn purge_expired(&self) -> usize {
        MemorySessionStore::purge_expired(self)
    }
}

#[async_trait]
impl IdentityResolver for MemorySessionStore {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        let now = Utc::now();
        let mut sessions = self.sessions.write();

        let Some(session) = sessions.get_mut(token) else {
            trace!("Unknown session token");
            return Ok(None);
        };

        if session.expires_at <= now {
            trace!(user_id = session.identity.id, "Session expired");
            sessions.remove(token);
            return Ok(None);
        }

        session.expires_at = now + self.ttl;
        Ok(Some(session.identity.clone()))
    }
}
