//! TCP listener with keep-alive.
//!
//! # Responsibilities
//! - Bind to configured address(es), releasing everything on partial failure
//! - Accept incoming TCP connections
//! - Enable TCP keep-alive with a fixed period on each accepted stream
//! - Graceful handling of accept errors

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::connect_info::Connected;
use axum::serve::IncomingStream;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};

/// Keep-alive period applied to accepted connections.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(15);

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Remote address of a connection accepted by [`KeepAliveListener`].
///
/// Handlers see it as `ConnectInfo<PeerAddr>` when the router is served with
/// `into_make_service_with_connect_info::<PeerAddr>()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

impl Connected<IncomingStream<'_, KeepAliveListener>> for PeerAddr {
    fn connect_info(stream: IncomingStream<'_, KeepAliveListener>) -> Self {
        PeerAddr(*stream.remote_addr())
    }
}

/// A TCP listener whose accepted streams have keep-alive enabled.
#[derive(Debug)]
pub struct KeepAliveListener {
    inner: TcpListener,
    keepalive: Duration,
}

impl KeepAliveListener {
    /// Bind a single address.
    pub async fn bind(address: &str, keepalive: Duration) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind(address)
            .await
            .map_err(|source| ListenerError::Bind {
                address: address.to_string(),
                source,
            })?;

        Ok(Self::from_listener(inner, keepalive))
    }

    /// Wrap an already bound listener.
    pub fn from_listener(inner: TcpListener, keepalive: Duration) -> Self {
        Self { inner, keepalive }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn configure(&self, stream: &TcpStream) -> io::Result<()> {
        let params = TcpKeepalive::new().with_time(self.keepalive);
        SockRef::from(stream).set_tcp_keepalive(&params)
    }
}

impl axum::serve::Listener for KeepAliveListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => {
                    if let Err(e) = self.configure(&stream) {
                        tracing::warn!(peer_addr = %addr, error = %e, "Failed to enable keep-alive");
                    }
                    tracing::trace!(peer_addr = %addr, "Connection accepted");
                    return (stream, addr);
                }
                Err(e) => handle_accept_error(e).await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

async fn handle_accept_error(e: io::Error) {
    // Per-connection failures are the peer's problem; anything else (EMFILE and
    // friends) gets a back-off so the loop does not spin.
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    ) {
        return;
    }
    tracing::error!(error = %e, "Accept failed");
    tokio::time::sleep(Duration::from_secs(1)).await;
}

/// Bind every address or none.
///
/// If any bind fails, the listeners bound so far in this call are closed
/// before the error is returned.
pub async fn bind_all(
    addresses: &[String],
    keepalive: Duration,
) -> Result<Vec<KeepAliveListener>, ListenerError> {
    let mut listeners = Vec::with_capacity(addresses.len());

    for address in addresses {
        match KeepAliveListener::bind(address, keepalive).await {
            Ok(listener) => {
                if let Ok(local) = listener.local_addr() {
                    tracing::info!(address = %local, "Listener bound");
                }
                listeners.push(listener);
            }
            Err(e) => {
                for listener in listeners.drain(..) {
                    if let Ok(local) = listener.local_addr() {
                        tracing::warn!(address = %local, "Closing listener after failed startup");
                    }
                }
                return Err(e);
            }
        }
    }

    Ok(listeners)
}
