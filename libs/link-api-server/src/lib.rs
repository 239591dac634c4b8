mod http;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;

use link_service::{AccountService, LinkService};

use http::{handle_history, handle_login, handle_redirect, handle_register, handle_shorten};

#[derive(Clone)]
pub struct AppState {
    pub links: Arc<LinkService>,
    pub accounts: Arc<AccountService>,
    /// Max-Age для cookie с токеном, обычно равен TTL токена.
    pub cookie_max_age_secs: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/shorten", post(handle_shorten))
        .route("/api/history", get(handle_history))
        .route("/api/register", post(handle_register))
        .route("/api/login", post(handle_login))
        .route("/{code}", get(handle_redirect))
        .with_state(state)
}

/// HTTP сервер сокращателя. Завершается после отмены `shutdown`
/// и окончания обработки текущих запросов.
pub async fn run(bind: &str, state: AppState, shutdown: CancellationToken) -> Result<(), String> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| format!("bind http {bind}: {e}"))?;
    tracing::info!(bind = %bind, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    tracing::info!("http server stopped");
    Ok(())
}
