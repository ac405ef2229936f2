//! Accessgate - per-endpoint access limiting for axum services
//!
//! This crate gates HTTP requests before they reach their handlers. It
//! resolves the caller from a session token, enforces a fixed-window call
//! limit configured per endpoint against a shared counter store (Redis or
//! in-memory), and scopes the caller's identity to the rest of the request.

pub mod access;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod store;
