mod config;
mod error;
mod handlers;
mod types;
mod upstream;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use log::{info, warn};
use tower_http::cors::CorsLayer;

use config::RelayConfig;
use handlers::AppState;
use upstream::HttpUpstream;

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, StatusCode> {
    let Some(api_key) = state.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth_header.strip_prefix("Bearer ").unwrap_or(auth_header);

    if token == api_key {
        Ok(next.run(req).await)
    } else {
        warn!("Rejected request to {} with a bad API key", req.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/send",
            post(handlers::send).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init_timed();

    let config = RelayConfig::from_env();

    info!("Upstream root: {}", config.api_root);
    info!("Upstream timeout: {:?}", config.upstream_timeout);
    if !config.destination.is_configured() {
        warn!("EITAA_TOKEN or EITAA_CHAT_ID is not set; sends will be rejected until configured");
    }
    if config.api_key.is_none() {
        warn!("RELAY_API_KEY is not set; the relay accepts unauthenticated requests");
    }

    let upstream = HttpUpstream::new(config.api_root.clone(), config.upstream_timeout)?;

    let state = Arc::new(AppState {
        destination: config.destination,
        upstream: Arc::new(upstream),
        api_key: config.api_key,
    });

    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
