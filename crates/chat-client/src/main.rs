//! Gateway client entry point
//!
//! Run with:
//! ```bash
//! GATEWAY_TOKEN=... cargo run -p chat-client
//! ```
//!
//! Configuration is loaded from environment variables.

use anyhow::Context;
use chat_cache::EntityCaches;
use chat_client::{ClientContext, GatewayConnection, QueuedSessionManager, WebSocketTransport};
use chat_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use chat_core::ClientEvent;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let mut tracing_config = TracingConfig::for_environment(config.app.env);
    if config.app.log_frames {
        tracing_config = tracing_config.with_frames();
    }
    if let Err(e) = try_init_tracing_with_config(tracing_config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway client failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!(
        env = ?config.app.env,
        url = %config.gateway.url,
        shard = ?config.gateway.shard,
        "Starting gateway client"
    );

    let context = ClientContext::new(Arc::new(EntityCaches::new()));
    let mut events = context.subscribe();

    let connection = GatewayConnection::start(
        config.gateway,
        context,
        Arc::new(WebSocketTransport::new()),
        Arc::new(QueuedSessionManager::new()),
    )
    .await
    .context("failed to open the gateway connection")?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ClientEvent::Shutdown(shutdown)) => {
                    info!(close_code = shutdown.close_code, "Connection shut down");
                    break;
                }
                Ok(ClientEvent::Ready(ready)) => {
                    info!(
                        session_id = ?connection.session_id(),
                        response_total = ready.response_total,
                        "Ready"
                    );
                }
                Ok(ClientEvent::Disconnect(disconnect)) => {
                    warn!(
                        server_close = ?disconnect.server_close,
                        client_close = ?disconnect.client_close,
                        closed_by_server = disconnect.closed_by_server,
                        "Disconnected"
                    );
                }
                Ok(ClientEvent::Dispatch(dispatch)) => {
                    info!(event_type = %dispatch.event_type, seq = ?dispatch.sequence, "Event");
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                info!("Received ctrl-c");
                connection.shutdown();
            }
        }
    }

    Ok(())
}
