//! Real-time collaboration hub core.
//!
//! One CRDT document per room, synchronized with browser clients and editor
//! extensions over a binary WebSocket protocol (Yjs sync steps + awareness
//! deltas). Rooms rehydrate from a snapshot store on first access, debounce
//! persistence, and are evicted after an idle timeout.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod awareness;
pub mod codec;
pub mod manager;
mod prelude;
pub mod protocol;
pub mod room;
pub mod websocket;

pub use manager::RoomManager;
pub use room::{Room, RoomConfig};
pub use websocket::handle_room_connection;

// vim: ts=4
