//! CellGate: an HTTP gateway onto a wide-column store.

pub mod bench;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod store;

pub use config::schema::GatewayConfig;
pub use http::RestServer;
pub use lifecycle::Shutdown;
pub use store::{CellStore, MemoryStore};
