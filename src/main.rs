//! Dealer PO Service - purchase-order portal backend

use anyhow::{Context, Result};
use dealer_po_service::{api, config::AppConfig, events::EventBus, service::PoService, store::{MemoryStore, PgStore, PoStore, Seed}};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env().context("invalid configuration")?;

    let store: Arc<dyn PoStore> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections).await.context("connecting to Postgres")?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            let seed = match &config.seed_file {
                Some(path) => Seed::load(path).await?,
                None => {
                    tracing::warn!("neither DATABASE_URL nor SEED_FILE is set, starting with an empty in-memory catalog");
                    Seed::default()
                }
            };
            Arc::new(MemoryStore::new(seed))
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(%url, error = %e, "NATS unavailable, domain events will be dropped");
                None
            }
        },
        None => None,
    };
    let events = EventBus::new(nats, config.event_subject_prefix.clone());
    let app = api::router(PoService::new(store, events, config.line_quantity_cap));

    tracing::info!(port = config.port, cap = config.line_quantity_cap, "🚀 Dealer PO service listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
