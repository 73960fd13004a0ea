//! Runtime lifecycle: bind, serve, optional initial setup, and shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::common::config::AppConfig;
use crate::output::{
    finish_spinner_error, finish_spinner_success, print_awaiting_setup, print_share_ready, spinner,
};
use crate::server::routes::create_router;
use crate::server::state::AppState;
use crate::share::ShareService;
use crate::transport::local::{bind_listener, local_url, start_local_server};

/// Share configured from the command line instead of `POST /api/setup`.
#[derive(Debug, Clone)]
pub struct InitialShare {
    pub folder: String,
    pub space_gb: f64,
    pub password: String,
}

/// Serves until Ctrl+C, then stops the server and the tunnel.
pub async fn run(config: AppConfig, initial: Option<InitialShare>) -> Result<()> {
    let (listener, port) = bind_listener(config.server.bind, config.server.port)?;

    let share = Arc::new(ShareService::from_config(&config, port));
    let app = create_router(AppState::new(Arc::clone(&share)), &config.server);
    let server_handle = start_local_server(app, listener);
    tracing::info!(port, provider = ?config.tunnel.provider, "Server listening");

    // Ctrl+C cancels the root token, including while a tunnel URL is pending
    let root_token = CancellationToken::new();
    let signal_token = root_token.clone();
    let ctrl_c_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Ctrl+C received - initiating graceful shutdown");
        signal_token.cancel();
    });

    let setup_result = match initial {
        Some(initial) => initial_setup(&share, &initial, &root_token).await,
        None => {
            print_awaiting_setup(&local_url(port));
            Ok(())
        }
    };

    if setup_result.is_ok() {
        root_token.cancelled().await;
    }

    ctrl_c_task.abort();
    shutdown(server_handle, &share).await;

    setup_result
}

async fn initial_setup(
    share: &ShareService,
    initial: &InitialShare,
    root_token: &CancellationToken,
) -> Result<()> {
    let setup_spinner = spinner("Configuring share and starting tunnel...");

    tokio::select! {
        result = share.setup(&initial.folder, initial.space_gb, &initial.password) => {
            match result {
                Ok(outcome) => {
                    finish_spinner_success(&setup_spinner, "Share ready");
                    print_share_ready(&outcome.public_url);
                    Ok(())
                }
                Err(err) => {
                    finish_spinner_error(&setup_spinner, "Failed to configure share");
                    Err(err).context("Initial setup failed")
                }
            }
        }
        // dropping the setup future kills a tunnel still waiting for its URL
        _ = root_token.cancelled() => {
            finish_spinner_error(&setup_spinner, "Interrupted");
            Ok(())
        }
    }
}

/// Stop accepting connections, then tear down the share and its tunnel.
async fn shutdown(server_handle: axum_server::Handle, share: &ShareService) {
    server_handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
    tracing::info!("Server stopped accepting new connections");

    share.shutdown().await;
    tracing::info!("Server shutdown complete");
}
