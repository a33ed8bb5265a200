/**
 * Socket Service Entry Point
 *
 * This is the main entry point for the socket service: the WebSocket edge
 * that forwards client requests into the broker and fans responses and
 * broadcasts back out to connected endpoints.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use palaver::shared::config::{BrokerConfig, SocketConfig};
use palaver::shared::mq::MqConnection;
use palaver::socket::{create_app, ConnectionRegistry, SocketState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    tracing::info!("Starting socket service");

    let broker = BrokerConfig::from_env();
    let socket = SocketConfig::from_env();

    // The publisher connection must exist before any client connects;
    // retry until the broker is reachable
    let publisher = loop {
        match MqConnection::connect_socket(&broker).await {
            Ok(connection) => break Arc::new(connection),
            Err(e) => {
                tracing::error!("Failed to connect to broker, retrying: {:?}", e);
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    };

    let registry = Arc::new(ConnectionRegistry::new());

    // Fanout loop: consumes listener output and delivers to endpoints
    let stop = Arc::new(AtomicBool::new(false));
    let fanout = tokio::spawn(palaver::socket::fanout::run(
        registry.clone(),
        broker.clone(),
        stop.clone(),
    ));

    let app = create_app(SocketState {
        registry,
        publisher,
    });

    tracing::info!("Listening on {}", socket.bind_addr);
    let listener = tokio::net::TcpListener::bind(socket.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    stop.store(true, Ordering::SeqCst);
    let _ = fanout.await;

    Ok(())
}
