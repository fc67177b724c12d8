//! Core infrastructure for the Scripthub collaboration hub.
//!
//! This crate contains the process-wide application state, token
//! verification, and the in-memory session registry. Extracting these into a
//! separate crate keeps the hub core (`scripthub-crdt`) free of HTTP-surface
//! concerns and lets adapters compile in parallel.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod app;
pub mod auth;
pub mod extensions;
pub mod prelude;
pub mod sessions;

// Re-export commonly used types
pub use app::{App, AppBuilderOpts, AppState};
pub use auth::TokenVerifier;

// vim: ts=4
