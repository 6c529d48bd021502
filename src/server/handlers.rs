//! HTTP request handlers for the admin server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{Extensions, HeaderMap, StatusCode},
    Json,
};
use tokio_util::sync::CancellationToken;

use super::types::*;
use crate::error::GuestError;
use crate::guest::{GuestLifecycle, GuestRecord, GuestResolver};
use crate::session::{GuestSession, GuestSessions, NewGuestSession};

/// Header consulted for the caller IP behind a reverse proxy
const FORWARDED_FOR: &str = "x-forwarded-for";

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across all handlers
pub struct AdminState {
    pub resolver: GuestResolver,
    pub lifecycle: GuestLifecycle,
    /// Present only when the platform API is configured
    pub sessions: Option<GuestSessions>,
    /// Shutdown token for graceful server shutdown
    pub shutdown_token: CancellationToken,
}

impl AdminState {
    pub fn new(
        resolver: GuestResolver,
        sessions: Option<GuestSessions>,
    ) -> (Arc<Self>, CancellationToken) {
        let shutdown_token = CancellationToken::new();
        let state = Arc::new(Self {
            lifecycle: resolver.lifecycle(),
            resolver,
            sessions,
            shutdown_token: shutdown_token.clone(),
        });
        (state, shutdown_token)
    }
}

/// Map a library error onto a status code and JSON body.
fn error_response(err: GuestError) -> HandlerError {
    let (status, code) = match &err {
        GuestError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
        GuestError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        GuestError::BackendUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE")
        }
        GuestError::Remote(_) => (StatusCode::BAD_GATEWAY, "PLATFORM_ERROR"),
        GuestError::CallbackFailure(_) | GuestError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
        }
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    }
    (status, Json(ErrorResponse::with_code(err.to_string(), code)))
}

/// Caller IP: explicit body value, else the first `x-forwarded-for` hop,
/// else the TCP peer.
pub(crate) fn client_ip(
    body_ip: Option<&str>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Option<String> {
    if let Some(ip) = body_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
        return Some(ip.to_string());
    }

    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    peer.map(|addr| addr.ip().to_string())
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check endpoint.
///
/// # Example Response
///
/// ```json
/// {
///   "status": "ok",
///   "version": "0.1.0",
///   "backend": "cache"
/// }
/// ```
pub async fn health(State(state): State<Arc<AdminState>>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(
        state.resolver.config().storage.backend_name(),
    ))
}

// =============================================================================
// Guest Administration
// =============================================================================

/// List every live guest.
pub async fn list_guests(
    State(state): State<Arc<AdminState>>,
) -> Result<Json<ListGuestsResponse>, HandlerError> {
    let guests = state.lifecycle.list_all().await.map_err(error_response)?;
    Ok(Json(ListGuestsResponse {
        count: guests.len(),
        guests,
    }))
}

/// Get one guest.
///
/// - `200 OK`: Guest found
/// - `404 Not Found`: Unknown or expired guest id
pub async fn get_guest(
    State(state): State<Arc<AdminState>>,
    Path(guest_id): Path<String>,
) -> Result<Json<GuestRecord>, HandlerError> {
    match state.resolver.get(&guest_id).await.map_err(error_response)? {
        Some(guest) => Ok(Json(guest)),
        None => Err(error_response(GuestError::NotFound(guest_id))),
    }
}

/// Delete a guest and the indexes pointing at it.
///
/// - `204 No Content`: Guest deleted
/// - `404 Not Found`: Unknown guest id
pub async fn delete_guest(
    State(state): State<Arc<AdminState>>,
    Path(guest_id): Path<String>,
) -> Result<StatusCode, HandlerError> {
    if state
        .resolver
        .remove(&guest_id)
        .await
        .map_err(error_response)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error_response(GuestError::NotFound(guest_id)))
    }
}

/// Run an expiry sweep now.
pub async fn sweep(
    State(state): State<Arc<AdminState>>,
) -> Result<Json<SweepResponse>, HandlerError> {
    let removed = state
        .lifecycle
        .sweep_expired()
        .await
        .map_err(error_response)?;
    Ok(Json(SweepResponse { removed }))
}

// =============================================================================
// Guest Sessions
// =============================================================================

/// Resolve the caller and mint a chat session for them.
///
/// - `201 Created`: Session created
/// - `400 Bad Request`: No caller IP could be determined
/// - `502 Bad Gateway`: The platform rejected the session
/// - `503 Service Unavailable`: Platform API not configured, or storage down
pub async fn create_guest_session(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(req): Json<CreateGuestSessionRequest>,
) -> Result<(StatusCode, Json<GuestSession>), HandlerError> {
    let Some(sessions) = &state.sessions else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::with_code(
                "platform API is not configured",
                "PLATFORM_NOT_CONFIGURED",
            )),
        ));
    };

    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.ip.as_deref(), &headers, peer).unwrap_or_default();

    let session = sessions
        .create_guest_session(NewGuestSession {
            ip,
            fingerprint: req.fingerprint,
            agent_id: req.agent_id,
            metadata: req.metadata,
        })
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(session)))
}
