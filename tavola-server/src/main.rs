use tavola_server::{AppState, Config, Server, init_logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    init_logger();

    let config = Config::from_env()?;
    tracing::info!("Starting tavola-server (env: {})", config.environment);

    let state = AppState::initialize(config).await?;
    Server::new(state).run().await
}
