/**
 * Listener Service Entry Point
 *
 * This is the main entry point for the listener service: the queue
 * consumer that routes client requests against the database and publishes
 * responses back through the broker.
 */

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    tracing::info!("Starting listener service");

    let pool = match palaver::shared::config::load_database().await {
        Some(pool) => pool,
        None => {
            tracing::error!("The listener service cannot run without a database");
            std::process::exit(1);
        }
    };

    let broker = palaver::shared::config::BrokerConfig::from_env();
    let consumer = palaver::listener::Consumer::new(pool, broker);

    // Ctrl-C requests a cooperative stop; the in-flight request (if any)
    // finishes before the loop exits
    let stop = consumer.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            stop.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    consumer.run().await;

    Ok(())
}
