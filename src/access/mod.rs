//! Per-endpoint access limiting.

mod gate;
mod key;
mod policy;

pub use gate::{Decision, DenyReason, RequestGate, DEFAULT_KEY_PREFIX};
pub use key::CounterKey;
pub use policy::{AccessPolicy, PolicyTable, MAX_WINDOW_SECONDS};
