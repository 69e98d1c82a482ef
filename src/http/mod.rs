//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::KeepAliveListener)
//!     → server.rs (Axum setup, one accept loop per listener)
//!     → access_log.rs (status/size capture, one line per request)
//!     → request.rs (path → CellAddress, method → Operation)
//!     → handlers.rs (get / scan / put / delete against the store)
//!     → response.rs (JSON rows, error → status)
//!     → Send to client
//! ```

pub mod access_log;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{AddressError, CellAddress, Operation};
pub use response::{ApiError, Cell, Row};
pub use server::{build_router, AppState, RestServer, ServerError, ServerState, SERVER_HEADER};
