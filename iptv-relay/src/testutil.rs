//! Throw-away HTTP upstreams for tests.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port.
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// URL on a local port that refuses connections.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/stream.m3u8", addr)
}
