use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use peek_server::{db::ConnectionPool, AppState};
use tracing_subscriber::EnvFilter;

/// HTTP mirror for the Peek sync protocol.
#[derive(Debug, Parser)]
struct Cli {
    /// Root directory holding `{userId}/profiles/{slug}/datastore.sqlite`.
    #[arg(long, default_value = "data")]
    data_dir: std::path::PathBuf,

    #[arg(long, default_value = "0.0.0.0:8787")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();
    let state = AppState {
        pool: Arc::new(ConnectionPool::new(&cli.data_dir)),
    };

    let app = peek_server::router(state);
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    tracing::info!(addr = %cli.listen, "peek-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
