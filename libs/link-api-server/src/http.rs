use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use link_service::{LoginRequest, RegisterRequest, ServiceError, Session, ShortenRequest};
use shortener_api::ErrorKind;

use super::AppState;

pub(crate) const TOKEN_COOKIE: &str = "JWT";

// ═══════════════════════════════════════════════════════════════
//  Errors → status
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    reason: String,
}

pub(crate) struct ApiError(pub(crate) ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self(ServiceError::Validation(e.body_text()))
    }
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::Decode => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthenticated => StatusCode::FORBIDDEN,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(error = %self.0, "request failed on upstream");
        }
        let body = ErrorBody {
            message: self.0.to_string(),
            reason: kind.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Token transport
// ═══════════════════════════════════════════════════════════════

/// Токен из cookie `JWT` или заголовка `Authorization: Bearer`.
pub(crate) fn token_from(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|t| !t.is_empty())
}

fn session_response(session: Session, max_age_secs: u64) -> Result<Response, ApiError> {
    let cookie = format!(
        "{TOKEN_COOKIE}={}; Path=/; Max-Age={max_age_secs}; Secure; HttpOnly; SameSite=Strict",
        session.token
    );
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| ServiceError::Unavailable(format!("token is not a header value: {e}")))?;
    let mut response = axum::Json(session).into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

// ═══════════════════════════════════════════════════════════════
//  POST /api/shorten
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_shorten(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<axum::Json<ShortenRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let axum::Json(req) = body?;
    let token = token_from(&headers);
    let shortened = state.links.shorten(token.as_deref(), req).await?;
    Ok(axum::Json(shortened).into_response())
}

// ═══════════════════════════════════════════════════════════════
//  GET /{code}
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_redirect(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    let target = state.links.resolve(&code).await?;
    let location = HeaderValue::from_str(&target)
        .map_err(|_| ServiceError::NotFound)?;
    Ok((
        StatusCode::MOVED_PERMANENTLY,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
    )
        .into_response())
}

// ═══════════════════════════════════════════════════════════════
//  GET /api/history
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = token_from(&headers);
    let entries = state.links.history(token.as_deref()).await?;
    Ok(axum::Json(entries).into_response())
}

// ═══════════════════════════════════════════════════════════════
//  POST /api/register, POST /api/login
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_register(
    State(state): State<AppState>,
    body: Result<axum::Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let axum::Json(req) = body?;
    let session = state.accounts.register(req).await?;
    session_response(session, state.cookie_max_age_secs)
}

pub(crate) async fn handle_login(
    State(state): State<AppState>,
    body: Result<axum::Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let axum::Json(req) = body?;
    let session = state.accounts.login(req).await?;
    session_response(session, state.cookie_max_age_secs)
}
