use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use points_ledger::config::Config;
use points_ledger::store::PgStore;
use points_ledger::{AppState, Ledger, TracingNotifier, init_pool, init_router, migrate};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let pool = init_pool(&config).await?;
    migrate(&pool).await?;

    let ledger = Ledger::new(Arc::new(PgStore::new(pool)), Arc::new(TracingNotifier))
        .with_rules(config.point_rules())
        .with_platform_url(config.platform_url.clone());
    let app = init_router(AppState {
        ledger: Arc::new(ledger),
    });

    let addr: SocketAddr = ([0, 0, 0, 0], config.server_port).into();
    let listener = TcpListener::bind(addr).await?;

    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
