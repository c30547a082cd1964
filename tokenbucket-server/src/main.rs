use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use tokenbucket_server::config::Config;
use tokenbucket_server::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tokenbucket_server={}", config.log_level).parse()?)
                .add_directive(format!("tokenbucketd={}", config.log_level).parse()?),
        )
        .init();

    info!(
        "Bucket defaults: rate={} tokens/sec, capacity={}, max_buckets={}",
        config.rate, config.capacity, config.max_buckets
    );

    let server = Arc::new(Server::bind(config).await?);

    // Ctrl-C triggers the graceful shutdown path: stop accepting, stop the
    // reaper, close every session
    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            signal_server.shutdown();
        }
    });

    server.start().await
}
