use std::net::SocketAddr;
use std::sync::Arc;

use docnest_server::{
    config::Config,
    create_router,
    db::{create_pool, MemoryStore, PgStore, Store},
    handlers::users::ensure_admin,
    indexing::{DisabledIndex, MeilisearchIndex, SearchIndex},
    AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docnest_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = if config.uses_memory_store() {
        tracing::warn!("Using the in-memory store; nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(PgStore::new(create_pool(&config.database_url).await?))
    };

    let index: Arc<dyn SearchIndex> = if config.search.enabled {
        let meilisearch = MeilisearchIndex::new(&config.search);
        if let Err(err) = meilisearch.ensure_index().await {
            tracing::warn!(error = %err, "Search index setup failed");
        }
        Arc::new(meilisearch)
    } else {
        tracing::info!("Search is disabled");
        Arc::new(DisabledIndex)
    };

    if let Some(admin) = &config.admin {
        ensure_admin(store.as_ref(), admin).await?;
    }

    let port = config.port;
    let state = AppState::new(store, index, config);
    let root = state.tree.bootstrap_root(&state.config.root_title).await?;
    tracing::info!(doc_id = root.id, "Root document ready");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
