//! HTTP admin server for guest identities.
//!
//! Exposes guest enumeration, removal and sweeping for operators, plus the
//! guest chat-session endpoint for front ends.
//!
//! ```text
//! +------------------------------------------------+
//! |  Axum HTTP Server                              |
//! |  /health (GET)              -> health check    |
//! |  /guests (GET)              -> list guests     |
//! |  /guests/{id} (GET)         -> get guest       |
//! |  /guests/{id} (DELETE)      -> remove guest    |
//! |  /guests/sweep (POST)       -> sweep expired   |
//! |  /guest-sessions (POST)     -> guest session   |
//! +------------------------------------------------+
//!          |
//!          v
//! +------------------------------------------------+
//! |  GuestResolver / GuestLifecycle / GuestSessions|
//! |    +-- StorageAdapter (memory, cache, redis)   |
//! +------------------------------------------------+
//! ```
//!
//! # Usage
//!
//! ```bash
//! guest-admin serve --port 8787
//! ```
//!
//! # Feature Flag
//!
//! This module is only available when the `server` feature is enabled.

mod handlers;
pub mod types;

pub use handlers::AdminState;
pub use types::{
    CreateGuestSessionRequest, ErrorResponse, HealthResponse, ListGuestsResponse, SweepResponse,
};

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Start the HTTP server.
///
/// # Arguments
///
/// * `port` - Port to listen on. Use 0 for a random available port.
/// * `state` - Shared handler state; its shutdown token stops the server.
/// * `sweep_interval` - Period of the background expiry sweep; zero disables it.
///
/// # Returns
///
/// A tuple containing:
/// - The actual bound address (useful when port=0)
/// - A cancellation token to trigger graceful shutdown
pub async fn start_server(
    port: u16,
    state: Arc<AdminState>,
    sweep_interval: Duration,
) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let shutdown_token = state.shutdown_token.clone();
    let app = create_router(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("HTTP server listening on {}", actual_addr);

    if !sweep_interval.is_zero() {
        spawn_sweeper(state, sweep_interval, shutdown_token.clone());
    }

    let server_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(server_shutdown.cancelled_owned())
        .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_token))
}

/// Periodically remove idle guests until shutdown.
fn spawn_sweeper(state: Arc<AdminState>, period: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match state.lifecycle.sweep_expired().await {
                        Ok(removed) if removed > 0 => {
                            tracing::info!("Swept {} expired guests", removed);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Guest sweep failed: {}", e),
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("Guest sweep task shutting down");
                    break;
                }
            }
        }
    });
}

/// Create the router with all routes configured.
///
/// This is separated from `start_server` to enable easier testing.
pub fn create_router(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/guests", get(handlers::list_guests))
        .route("/guests/sweep", post(handlers::sweep))
        .route(
            "/guests/{guest_id}",
            get(handlers::get_guest).delete(handlers::delete_guest),
        )
        .route("/guest-sessions", post(handlers::create_guest_session))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::{GuestConfig, GuestResolver, ManualClock};
    use crate::session::{GuestSessions, SessionApi};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use chrono::Utc;
    use platform_client::{CreateSessionRequest, PlatformError, SessionTicket};

    struct FakeApi;

    #[async_trait]
    impl SessionApi for FakeApi {
        async fn create_session(
            &self,
            request: &CreateSessionRequest,
        ) -> Result<SessionTicket, PlatformError> {
            if request.agent_id == "unknown" {
                return Err(PlatformError::ApiError {
                    status: 404,
                    message: "agent not found".into(),
                });
            }
            Ok(SessionTicket {
                session_id: format!("sess_{}", uuid::Uuid::new_v4().simple()),
                token: "tok".into(),
                extra: Default::default(),
            })
        }
    }

    fn resolver_with_clock() -> (GuestResolver, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = GuestConfig::new(Arc::new(MemoryStorage::new()))
            .with_ttl(Duration::from_secs(60))
            .with_clock(clock.clone());
        (GuestResolver::new(config), clock)
    }

    fn test_state() -> (Arc<AdminState>, Arc<ManualClock>) {
        let (resolver, clock) = resolver_with_clock();
        let sessions = GuestSessions::new(resolver.clone(), Arc::new(FakeApi));
        let (state, _) = AdminState::new(resolver, Some(sessions));
        (state, clock)
    }

    mod server_tests {
        use super::*;

        #[tokio::test]
        async fn start_server_binds_to_port() {
            let (state, _) = test_state();
            let (addr, shutdown) = start_server(0, state, Duration::ZERO)
                .await
                .expect("Server should start");

            assert!(addr.port() > 0);
            shutdown.cancel();
        }

        #[tokio::test]
        async fn start_server_returns_state_shutdown_token() {
            let (state, _) = test_state();
            let state_token = state.shutdown_token.clone();
            let (_, shutdown) = start_server(0, state, Duration::from_secs(3600))
                .await
                .expect("Server should start");

            assert!(!shutdown.is_cancelled());
            shutdown.cancel();
            assert!(state_token.is_cancelled());
        }

        #[tokio::test(start_paused = true)]
        async fn background_sweep_removes_idle_guests() {
            let (state, clock) = test_state();
            state
                .resolver
                .resolve_or_create("1.2.3.4", None, None)
                .await
                .unwrap();
            clock.advance(chrono::Duration::seconds(120));

            let shutdown = state.shutdown_token.clone();
            spawn_sweeper(state.clone(), Duration::from_secs(10), shutdown.clone());

            tokio::time::sleep(Duration::from_secs(11)).await;
            assert!(state.lifecycle.list_all().await.unwrap().is_empty());
            shutdown.cancel();
        }
    }

    mod integration_tests {
        use super::*;
        use axum::body::{to_bytes, Body};
        use axum::http::{Request, StatusCode};
        use serde_json::Value;
        use tower::ServiceExt;

        async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
            let response = app.oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }

        fn get(uri: &str) -> Request<Body> {
            Request::builder().uri(uri).body(Body::empty()).unwrap()
        }

        fn post_json(uri: &str, body: Value) -> Request<Body> {
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        }

        #[tokio::test]
        async fn health_endpoint_works() {
            let (state, _) = test_state();
            let (status, body) = send(create_router(state), get("/health")).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
            assert_eq!(body["backend"], "memory");
        }

        #[tokio::test]
        async fn list_and_get_guests() {
            let (state, _) = test_state();
            let guest = state
                .resolver
                .resolve_or_create("1.2.3.4", Some("fp"), None)
                .await
                .unwrap();

            let (status, body) = send(create_router(state.clone()), get("/guests")).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["count"], 1);
            assert_eq!(body["guests"][0]["maskedIp"], "1.2.xxx.xxx");

            let (status, body) = send(
                create_router(state),
                get(&format!("/guests/{}", guest.id)),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["id"], guest.id);
        }

        #[tokio::test]
        async fn unknown_guest_is_404() {
            let (state, _) = test_state();
            let (status, body) = send(create_router(state), get("/guests/guest_nope")).await;

            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["code"], "NOT_FOUND");
        }

        #[tokio::test]
        async fn delete_guest_then_404() {
            let (state, _) = test_state();
            let guest = state
                .resolver
                .resolve_or_create("1.2.3.4", None, None)
                .await
                .unwrap();
            let delete = || {
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/guests/{}", guest.id))
                    .body(Body::empty())
                    .unwrap()
            };

            let (status, _) = send(create_router(state.clone()), delete()).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
            let (status, _) = send(create_router(state), delete()).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn sweep_endpoint_reports_removed() {
            let (state, clock) = test_state();
            state
                .resolver
                .resolve_or_create("1.2.3.4", None, None)
                .await
                .unwrap();
            clock.advance(chrono::Duration::seconds(61));

            let (status, body) =
                send(create_router(state), post_json("/guests/sweep", Value::Null)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["removed"], 1);
        }

        #[tokio::test]
        async fn guest_session_uses_forwarded_ip() {
            let (state, _) = test_state();
            let request = Request::builder()
                .method("POST")
                .uri("/guest-sessions")
                .header("content-type", "application/json")
                .header("x-forwarded-for", "5.6.7.8, 10.0.0.1")
                .body(Body::from(r#"{"agentId":"agent_1","fingerprint":"fp"}"#))
                .unwrap();

            let (status, body) = send(create_router(state.clone()), request).await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["guest"]["id"], crate::guest::derive_guest_id("5.6.7.8"));

            let session_id = body["sessionId"].as_str().unwrap();
            let guest = state
                .resolver
                .lookup("5.6.7.8", Some("fp"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(guest.sessions, vec![session_id.to_string()]);
        }

        #[tokio::test]
        async fn guest_session_without_ip_is_400() {
            let (state, _) = test_state();
            let (status, body) = send(
                create_router(state),
                post_json("/guest-sessions", serde_json::json!({"agentId": "agent_1"})),
            )
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["code"], "INVALID_ARGUMENT");
        }

        #[tokio::test]
        async fn platform_rejection_is_502() {
            let (state, _) = test_state();
            let (status, body) = send(
                create_router(state),
                post_json(
                    "/guest-sessions",
                    serde_json::json!({"agentId": "unknown", "ip": "1.2.3.4"}),
                ),
            )
            .await;

            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert_eq!(body["code"], "PLATFORM_ERROR");
        }

        #[tokio::test]
        async fn guest_session_without_platform_is_503() {
            let (resolver, _) = resolver_with_clock();
            let (state, _) = AdminState::new(resolver, None);
            let (status, body) = send(
                create_router(state),
                post_json(
                    "/guest-sessions",
                    serde_json::json!({"agentId": "agent_1", "ip": "1.2.3.4"}),
                ),
            )
            .await;

            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body["code"], "PLATFORM_NOT_CONFIGURED");
        }
    }
}
