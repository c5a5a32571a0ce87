use anyhow::Result;
use likeguard_core::{LikeService, LikeStore, MemoryStore};
use likeguard_redis::RedisStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod http;
mod settings;

use http::AppState;
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load()?;
    let guard_config = settings.guard_config();

    match settings.redis_url.clone() {
        Some(url) => {
            let store = RedisStore::new(&url).await?;
            tracing::info!("using Redis like store");
            serve(LikeService::new(store, guard_config), settings).await
        }
        None => {
            tracing::warn!("no Redis URL configured, using in-memory like store");
            serve(LikeService::new(MemoryStore::new(), guard_config), settings).await
        }
    }
}

async fn serve<S: LikeStore + 'static>(service: LikeService<S>, settings: Settings) -> Result<()> {
    let state = Arc::new(AppState {
        service,
        admin_token: settings.admin_token.clone(),
    });
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&settings.listen_addr).await?;
    tracing::info!(addr = %settings.listen_addr, "likeguard service listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;

    Ok(())
}
