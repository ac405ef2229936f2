//! Per-endpoint access policies.
//!
//! A [`PolicyTable`] maps an endpoint identifier (a route path) to the
//! [`AccessPolicy`] guarding it. Tables are built in code at route
//! registration time or loaded from YAML:
//!
//! ```yaml
//! endpoints:
//!   /vote:
//!     window_seconds: 60
//!     max_count: 3
//!     requires_login: false
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{AccessGateError, Result};

/// Longest accepted window: one year.
pub const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 3600;

/// Access limit attached to one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Length of the counting window in seconds
    pub window_seconds: u64,
    /// Maximum calls allowed within one window
    pub max_count: u64,
    /// Whether callers must be logged in; also makes the limit per user
    #[serde(default = "default_requires_login")]
    pub requires_login: bool,
}

fn default_requires_login() -> bool {
    true
}

impl AccessPolicy {
    /// A per-user limit that requires login.
    pub fn per_user(window_seconds: u64, max_count: u64) -> Self {
        Self {
            window_seconds,
            max_count,
            requires_login: true,
        }
    }

    /// A limit shared by every caller, logged in or not.
    pub fn shared(window_seconds: u64, max_count: u64) -> Self {
        Self {
            window_seconds,
            max_count,
            requires_login: false,
        }
    }

    /// The window as a duration, which is also the counter expiry.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Reject zero windows, windows longer than [`MAX_WINDOW_SECONDS`] and
    /// zero ceilings.
    pub fn validate(&self) -> Result<()> {
        if self.window_seconds == 0 {
            return Err(AccessGateError::Config(
                "window_seconds must be positive".to_string(),
            ));
        }
        if self.window_seconds > MAX_WINDOW_SECONDS {
            return Err(AccessGateError::Config(format!(
                "window_seconds must be at most {}",
                MAX_WINDOW_SECONDS
            )));
        }
        if self.max_count == 0 {
            return Err(AccessGateError::Config(
                "max_count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Association table from endpoint identifier to policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Map of endpoint path to its policy
    #[serde(default)]
    endpoints: HashMap<String, AccessPolicy>,
}

impl PolicyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a policy to an endpoint, replacing any previous one.
    ///
    /// Panics if the policy is invalid; tables built in code are programmer
    /// input. Use [`PolicyTable::insert`] for fallible insertion.
    pub fn limit(mut self, endpoint: impl Into<String>, policy: AccessPolicy) -> Self {
        let endpoint = endpoint.into();
        if let Err(e) = self.insert(endpoint.clone(), policy) {
            panic!("invalid access policy for {}: {}", endpoint, e);
        }
        self
    }

    /// Attach a policy to an endpoint after validating it.
    pub fn insert(&mut self, endpoint: impl Into<String>, policy: AccessPolicy) -> Result<()> {
        policy.validate()?;
        self.endpoints.insert(endpoint.into(), policy);
        Ok(())
    }

    /// Look up the policy for an endpoint.
    pub fn get(&self, endpoint: &str) -> Option<&AccessPolicy> {
        self.endpoints.get(endpoint)
    }

    /// Number of guarded endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no endpoint is guarded.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Merge another table into this one; entries in `other` win.
    pub fn merge(&mut self, other: PolicyTable) {
        self.endpoints.extend(other.endpoints);
    }

    /// Load a table from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading access policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a table from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let table: PolicyTable = serde_yaml::from_str(yaml)
            .map_err(|e| AccessGateError::Config(format!("Failed to parse access policies: {}", e)))?;

        for (endpoint, policy) in &table.endpoints {
            policy.validate().map_err(|e| {
                AccessGateError::Config(format!("endpoint {}: {}", endpoint, e))
            })?;
        }

        Ok(table)
    }
}
