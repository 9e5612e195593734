use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::auth::auth_middleware;
use crate::config::Config;
use crate::db::Store;
use crate::handlers::{
    auth as auth_handlers, docs as doc_handlers, search as search_handlers,
    sharelinks as sharelink_handlers, sitemap as sitemap_handlers, users as user_handlers,
};
use crate::indexing::SearchIndex;
use crate::tree::TreeStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tree: TreeStore,
    pub index: Arc<dyn SearchIndex>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, index: Arc<dyn SearchIndex>, config: Config) -> Self {
        Self {
            tree: TreeStore::new(store.clone(), index.clone()),
            store,
            index,
            config: Arc::new(config),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    // Public auth routes (no middleware)
    let public_auth_routes = Router::new().route("/login", post(auth_handlers::login));

    // Routes that need a caller identity
    let protected_auth_routes = Router::new()
        .route("/me", get(auth_handlers::me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let auth_routes = Router::new()
        .merge(public_auth_routes)
        .merge(protected_auth_routes);

    let doc_routes = Router::new()
        .route(
            "/",
            get(doc_handlers::list_docs).post(doc_handlers::create_doc),
        )
        .route("/outline", get(doc_handlers::get_outline))
        .route("/by_path", get(doc_handlers::get_doc_by_path))
        .route("/search", post(search_handlers::search_docs))
        .route("/markdown/*path", get(doc_handlers::get_doc_markdown))
        .route(
            "/:id",
            get(doc_handlers::get_doc)
                .put(doc_handlers::update_doc)
                .patch(doc_handlers::update_doc)
                .delete(doc_handlers::delete_doc),
        )
        .route("/:id/move", post(doc_handlers::move_doc))
        .route("/:id/restore_revision", post(doc_handlers::restore_revision))
        .route("/:id/revisions", get(doc_handlers::list_revisions));

    let sharelink_routes = Router::new()
        .route(
            "/",
            get(sharelink_handlers::list_sharelinks).post(sharelink_handlers::create_sharelink),
        )
        .route(
            "/:id",
            get(sharelink_handlers::get_sharelink).delete(sharelink_handlers::delete_sharelink),
        );

    let user_routes = Router::new()
        .route(
            "/",
            get(user_handlers::list_users).post(user_handlers::create_user),
        )
        .route(
            "/:id",
            get(user_handlers::get_user)
                .put(user_handlers::update_user)
                .delete(user_handlers::delete_user),
        )
        .route("/:id/change-password", post(user_handlers::change_password));

    // Anonymous callers pass through with an anonymous actor
    let api_routes = Router::new()
        .nest("/docs", doc_routes)
        .nest("/sharelinks", sharelink_routes)
        .nest("/users", user_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/robots.txt", get(sitemap_handlers::robots_txt))
        .route("/sitemap.xml", get(sitemap_handlers::sitemap))
        .route(
            "/api/v1/sharelinks/access/:token",
            get(sharelink_handlers::access_shared_doc),
        )
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
