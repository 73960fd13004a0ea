//! Local server bootstrap utilities
//!
//! - Tunnel transports bind loopback only; the publisher connects locally.
//! - `bind = "all"` exposes the port on every interface for LAN use.

use anyhow::{Context, Result};
use std::net::{SocketAddr, TcpListener};

use crate::common::config::BindScope;

fn bind_addr(scope: BindScope, port: u16) -> SocketAddr {
    match scope {
        BindScope::Loopback => SocketAddr::from(([127, 0, 0, 1], port)),
        BindScope::All => SocketAddr::from(([0, 0, 0, 0], port)),
    }
}

/// Binds the listening socket and returns it with the actual port.
///
/// Binding happens before the share service is built, so port 0 resolves
/// to a concrete port that tunnels and the local URL can use.
pub fn bind_listener(scope: BindScope, port: u16) -> Result<(TcpListener, u16)> {
    let addr = bind_addr(scope, port);
    let listener = TcpListener::bind(addr).context(
        "Failed to bind to port - port already in use.\n\n\
         Is another foldershare instance running?\n\
         Or is another service using this port?",
    )?;

    listener
        .set_nonblocking(true)
        .context("Failed to set listener to non-blocking mode")?;

    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

/// Serves `app` on an already bound listener in the background.
pub fn start_local_server(app: axum::Router, listener: TcpListener) -> axum_server::Handle {
    let server_handle = axum_server::Handle::new();
    let server_handle_clone = server_handle.clone();

    tokio::spawn(async move {
        if let Err(e) = axum_server::from_tcp(listener)
            .handle(server_handle_clone)
            .serve(app.into_make_service())
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    server_handle
}

/// Public URL used when no tunnel publishes the server.
pub fn local_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}
