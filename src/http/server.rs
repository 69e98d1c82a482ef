//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Create the Axum Router with the dispatcher and middleware
//! - Own the bound listeners, one accept loop per listener
//! - Stop every accept loop on shutdown, draining in-flight connections
//!   for a bounded time
//!
//! # Lifecycle
//! ```text
//! bind() ──▶ Created ──start()──▶ Started ──stop()──▶ Stopped
//!               │                                        ▲
//!               └────────────────stop()──────────────────┘
//! ```
//! There is no way back to `Created`; a restart needs a new server.

use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue};
use axum::routing::any;
use axum::Router;
use tokio::task::JoinSet;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{GatewayConfig, HttpConfig};
use crate::http::access_log::AccessLogLayer;
use crate::http::handlers::dispatch;
use crate::lifecycle::Shutdown;
use crate::net::{bind_all, KeepAliveListener, ListenerError, PeerAddr};
use crate::store::CellStore;

/// Value of the `Server` header on every response.
pub const SERVER_HEADER: &str = concat!("CellGate/", env!("CARGO_PKG_VERSION"));

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CellStore>,
    pub settings: Arc<HttpConfig>,
}

/// Error type for server construction and control.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("cannot start a server in state {0:?}")]
    InvalidState(ServerState),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Started,
    Stopped,
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(store: Arc<dyn CellStore>, settings: HttpConfig) -> Router {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    let state = AppState {
        store,
        settings: Arc::new(settings),
    };

    Router::new()
        .route("/{*path}", any(dispatch))
        .route("/", any(dispatch))
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            HeaderValue::from_static(SERVER_HEADER),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(AccessLogLayer::new())
}

/// The gateway's HTTP server: a set of listeners sharing one router.
pub struct RestServer {
    router: Router,
    listeners: Vec<KeepAliveListener>,
    local_addrs: Vec<SocketAddr>,
    shutdown: Shutdown,
    drain_timeout: Duration,
    state: ServerState,
}

impl RestServer {
    /// Bind every configured address. Either all listeners are bound or none
    /// are and the error is returned.
    pub async fn bind(config: &GatewayConfig, store: Arc<dyn CellStore>) -> Result<Self, ServerError> {
        let listeners = bind_all(
            &config.listener.addresses,
            Duration::from_secs(config.listener.keepalive_secs),
        )
        .await?;

        Self::with_listeners(listeners, build_router(store, config.http.clone()), &config.http)
    }

    /// Assemble a server from already bound listeners.
    pub fn with_listeners(
        listeners: Vec<KeepAliveListener>,
        router: Router,
        settings: &HttpConfig,
    ) -> Result<Self, ServerError> {
        let local_addrs = listeners
            .iter()
            .map(KeepAliveListener::local_addr)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            router,
            listeners,
            local_addrs,
            shutdown: Shutdown::new(),
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
            state: ServerState::Created,
        })
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Spawn one accept loop per listener onto `tasks`.
    ///
    /// Each task completes once its loop has stopped accepting and its
    /// connections have drained (or the drain timeout has passed).
    pub fn start(&mut self, tasks: &mut JoinSet<io::Result<()>>) -> Result<(), ServerError> {
        if self.state != ServerState::Created {
            return Err(ServerError::InvalidState(self.state));
        }

        for listener in self.listeners.drain(..) {
            let app = self
                .router
                .clone()
                .into_make_service_with_connect_info::<PeerAddr>();
            let graceful = self.shutdown.subscribe();
            let drain = self.shutdown.subscribe();
            let drain_timeout = self.drain_timeout;

            tasks.spawn(async move {
                let addr = listener.local_addr()?;
                tracing::info!(address = %addr, "Accept loop starting");

                let serve = axum::serve(listener, app)
                    .with_graceful_shutdown(graceful.wait())
                    .into_future();
                let deadline = async move {
                    drain.wait().await;
                    tokio::time::sleep(drain_timeout).await;
                };

                tokio::select! {
                    result = serve => result?,
                    _ = deadline => {
                        tracing::warn!(
                            address = %addr,
                            drain_timeout_secs = drain_timeout.as_secs(),
                            "Drain timeout elapsed, dropping in-flight connections"
                        );
                    }
                }

                tracing::info!(address = %addr, "Accept loop stopped");
                Ok(())
            });
        }

        self.state = ServerState::Started;
        Ok(())
    }

    /// Stop accepting on every listener. Calling this more than once is a no-op.
    pub fn stop(&mut self) {
        if self.state == ServerState::Stopped {
            return;
        }
        tracing::info!(listeners = self.local_addrs.len(), "Stopping server");
        self.shutdown.trigger();
        // Listeners never started are closed right here.
        self.listeners.clear();
        self.state = ServerState::Stopped;
    }
}

impl Drop for RestServer {
    fn drop(&mut self) {
        self.stop();
    }
}
