//! Shared types, adapter traits, and the error subsystem for Scripthub.
//!
//! This crate contains the foundational types shared between the server
//! crate, the hub core, and the adapter implementations. Keeping them in a
//! separate crate allows adapters to compile in parallel with the server's
//! feature modules.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod error;
pub mod prelude;
pub mod snapshot_adapter;
pub mod types;

// vim: ts=4
