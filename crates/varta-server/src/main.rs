use tracing::info;
use tracing_subscriber::EnvFilter;

use varta_server::{serve, RelayConfig, RelayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,varta_server=debug")),
        )
        .init();

    info!("Starting Varta relay server v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::from_env();
    info!(?config, "Loaded configuration");

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    let state = RelayState::new(config);

    tokio::select! {
        result = serve(listener, state) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Relay server failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
