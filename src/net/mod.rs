//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured listen addresses
//!     → listener.rs (bind all-or-nothing, keep-alive on every accepted stream)
//!     → Hand off to HTTP layer (axum::serve)
//! ```
//!
//! # Design Decisions
//! - Every accepted TCP stream gets a fixed keep-alive period so dead peers
//!   are eventually reaped by the kernel
//! - Admission control is left to the kernel accept backlog

pub mod listener;

pub use listener::{bind_all, KeepAliveListener, ListenerError, PeerAddr, DEFAULT_KEEPALIVE};
