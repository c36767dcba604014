use std::net::SocketAddr;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use plaza_gateway::{Publisher, SessionRegistry};
use plaza_store::Repository;

mod auth;
mod config;
mod error;
mod handlers;

use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub registry: SessionRegistry,
    pub publisher: Publisher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plaza=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let repo = Repository::with_geo_precision(config.environment, config.geo_precision);
    let registry = SessionRegistry::new();
    let publisher = Publisher::new(registry.clone());

    let state = AppState {
        repo,
        registry,
        publisher,
    };

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Plaza server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/spaces", get(handlers::spaces::get_spaces))
        .route(
            "/spaces/{space_id}/subscribers",
            get(handlers::spaces::get_subscribers),
        )
        .route(
            "/spaces/{space_id}/active_subscribers",
            get(handlers::spaces::get_active_subscribers),
        )
        .route(
            "/spaces/{space_id}/threads",
            get(handlers::threads::get_toplevel_threads),
        )
        .route(
            "/spaces/{space_id}/threads/{thread_id}",
            get(handlers::threads::get_thread),
        )
        .route("/users/{user_id}", get(handlers::users::get_user))
        .route("/admin/keys", delete(handlers::admin::delete_all_keys));

    let protected_routes = Router::new()
        .route("/users", post(handlers::users::register_user))
        .route("/spaces", post(handlers::spaces::create_space))
        .route(
            "/spaces/{space_id}/subscribers",
            post(handlers::spaces::subscribe),
        )
        .route(
            "/spaces/{space_id}/threads",
            post(handlers::threads::create_toplevel_thread),
        )
        .route(
            "/spaces/{space_id}/messages/{message_id}/threads",
            post(handlers::threads::create_thread),
        )
        .route(
            "/spaces/{space_id}/threads/{thread_id}/messages",
            post(handlers::messages::create_message),
        )
        .route(
            "/spaces/{space_id}/messages/{message_id}/likes",
            post(handlers::messages::like_message),
        )
        .route("/spaces/{space_id}/updates", get(handlers::spaces::updates))
        .layer(middleware::from_fn(auth::require_user));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
