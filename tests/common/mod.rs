//! Shared helpers for gateway integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use cellgate::config::{GatewayConfig, HttpConfig};
use cellgate::http::RestServer;
use cellgate::store::{CellStore, MemoryStore};
use tokio::task::JoinSet;

pub const TABLE: &str = "users";

pub struct TestGateway {
    pub server: RestServer,
    pub tasks: JoinSet<io::Result<()>>,
    pub store: Arc<MemoryStore>,
    pub addr: SocketAddr,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Config listening on one ephemeral loopback port.
pub fn loopback_config(http: HttpConfig) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.addresses = vec!["127.0.0.1:0".to_string()];
    config.http = HttpConfig {
        drain_timeout_secs: 1,
        ..http
    };
    config
}

/// Store with a `users` table holding family `cf`.
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.create_table(TABLE, &["cf".to_string()]).await.unwrap();
    store
}

pub async fn start_gateway(http: HttpConfig) -> TestGateway {
    let store = seeded_store().await;
    let config = loopback_config(http);

    let mut server = RestServer::bind(&config, store.clone()).await.unwrap();
    let addr = server.local_addrs()[0];
    let mut tasks = JoinSet::new();
    server.start(&mut tasks).unwrap();

    TestGateway {
        server,
        tasks,
        store,
        addr,
    }
}

/// An address nothing is listening on right now.
pub fn free_address() -> SocketAddr {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}
