//! Adapters: concrete implementations of the ports.
//!
//! - `postgres` - store ports over hand-written SQL
//! - `telegram` - chat port over the Bot API
//! - `telnyx` - voice port over a call-control API
//! - `http` - the inbound HTTP surface (webhooks, health, admin)
//! - `memory` - in-memory port implementations for tests and local runs

pub mod http;
pub mod memory;
pub mod postgres;
pub mod telegram;
pub mod telnyx;
