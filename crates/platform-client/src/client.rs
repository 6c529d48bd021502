//! Client for the remote platform HTTP API.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::error::PlatformError;
use crate::types::{
    ClientConfig, CreateSessionRequest, ErrorBody, SessionTicket, API_KEY_HEADER,
    PROJECT_ID_HEADER,
};

/// Environment variable holding the API base URL
pub const ENV_BASE_URL: &str = "PLATFORM_API_URL";
/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "PLATFORM_API_KEY";
/// Environment variable holding the project id
pub const ENV_PROJECT_ID: &str = "PLATFORM_PROJECT_ID";

/// Client for the remote platform.
///
/// Every request carries the two static credential headers and a JSON body.
/// Responses are returned as parsed JSON; non-2xx statuses become
/// [`PlatformError::ApiError`] with the server-provided message.
#[derive(Clone)]
pub struct PlatformClient {
    /// HTTP client for making requests
    http_client: reqwest::Client,
    /// Parsed base URL, always ending in `/`
    base_url: Url,
    /// Static headers attached to every request
    headers: HeaderMap,
}

impl PlatformClient {
    /// Create a new client.
    ///
    /// # Example
    /// ```rust,no_run
    /// use platform_client::{ClientConfig, PlatformClient};
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = PlatformClient::new(ClientConfig::new(
    ///     "https://api.example.com/v1",
    ///     "pk_live_123",
    ///     "proj_42",
    /// ))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: ClientConfig) -> Result<Self, PlatformError> {
        if config.api_key.is_empty() {
            return Err(PlatformError::ConfigError("API key is empty".to_string()));
        }

        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            header_value(&config.api_key)?,
        );
        headers.insert(
            HeaderName::from_static(PROJECT_ID_HEADER),
            header_value(&config.project_id)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(PlatformError::HttpError)?;

        Ok(Self {
            http_client,
            base_url,
            headers,
        })
    }

    /// Create a client from `PLATFORM_API_URL`, `PLATFORM_API_KEY` and
    /// `PLATFORM_PROJECT_ID`.
    pub fn from_env() -> Result<Self, PlatformError> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PlatformError::ConfigError(format!("{} is not set", name)))
        };

        Self::new(ClientConfig::new(
            var(ENV_BASE_URL)?,
            var(ENV_API_KEY)?,
            var(ENV_PROJECT_ID)?,
        ))
    }

    /// Build the full URL for an API path plus query parameters.
    pub(crate) fn endpoint_url(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Url, PlatformError> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Send a request and parse the JSON response.
    ///
    /// An empty success body is returned as `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> Result<Value, PlatformError> {
        let url = self.endpoint_url(path, query)?;
        tracing::debug!(%method, %url, "platform request");

        let mut builder = self
            .http_client
            .request(method, url)
            .headers(self.headers.clone());
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(ErrorBody::into_message)
                .unwrap_or_else(|| {
                    if text.is_empty() {
                        status.canonical_reason().unwrap_or("unknown error").to_string()
                    } else {
                        text.clone()
                    }
                });
            tracing::warn!(status = status.as_u16(), %message, "platform request failed");
            return Err(PlatformError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, PlatformError> {
        self.request(Method::GET, path, None, query).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, PlatformError> {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, PlatformError> {
        self.request(Method::PUT, path, Some(body), &[]).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, PlatformError> {
        self.request(Method::PATCH, path, Some(body), &[]).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, PlatformError> {
        self.request(Method::DELETE, path, None, &[]).await
    }

    /// Mint a chat session for an agent.
    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionTicket, PlatformError> {
        let body = serde_json::to_value(request)?;
        let response = self.post("sessions", &body).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }
}

fn header_value(value: &str) -> Result<HeaderValue, PlatformError> {
    HeaderValue::from_str(value).map_err(|e| PlatformError::ConfigError(e.to_string()))
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::net::SocketAddr;

    fn client_for(base_url: &str) -> PlatformClient {
        PlatformClient::new(ClientConfig::new(base_url, "key_123", "proj_1")).unwrap()
    }

    async fn spawn_server(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn endpoint_url_joins_paths_and_query() {
        let client = client_for("https://api.example.com/v1");

        let url = client.endpoint_url("/agents", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/agents");

        let url = client
            .endpoint_url("search", &[("q", "rust sdk".to_string())])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/search?q=rust+sdk");
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = PlatformClient::new(ClientConfig::new("https://api.example.com", "", "p"));
        assert!(matches!(result, Err(PlatformError::ConfigError(_))));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = PlatformClient::new(ClientConfig::new("not a url", "key", "p"));
        assert!(matches!(result, Err(PlatformError::ConfigError(_))));
    }

    #[tokio::test]
    async fn create_session_sends_credentials_and_parses_ticket() {
        let app = Router::new().route(
            "/v1/sessions",
            post(|headers: AxumHeaders, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("x-api-key").unwrap(), "key_123");
                assert_eq!(headers.get("x-project-id").unwrap(), "proj_1");
                Json(serde_json::json!({
                    "sessionId": format!("sess_for_{}", body["namespace"].as_str().unwrap()),
                    "token": "tok_1",
                    "agentId": body["agentId"],
                }))
            }),
        );
        let addr = spawn_server(app).await;
        let client = client_for(&format!("http://{}/v1", addr));

        let ticket = client
            .create_session(&CreateSessionRequest {
                agent_id: "agent_7".to_string(),
                namespace: "guest_abc".to_string(),
                metadata: None,
            })
            .await
            .unwrap();

        assert_eq!(ticket.session_id, "sess_for_guest_abc");
        assert_eq!(ticket.token, "tok_1");
        assert_eq!(ticket.extra.get("agentId"), Some(&serde_json::json!("agent_7")));
    }

    #[tokio::test]
    async fn error_status_carries_server_message() {
        let app = Router::new().route(
            "/v1/agents",
            get(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(serde_json::json!({"error": "rate_limited", "message": "slow down"})),
                )
            }),
        );
        let addr = spawn_server(app).await;
        let client = client_for(&format!("http://{}/v1", addr));

        let err = client.get("agents", &[]).await.unwrap_err();
        match err {
            PlatformError::ApiError { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_text_error_body_is_used_verbatim() {
        let app = Router::new().route(
            "/v1/agents/missing",
            get(|| async { (StatusCode::NOT_FOUND, "no such agent") }),
        );
        let addr = spawn_server(app).await;
        let client = client_for(&format!("http://{}/v1", addr));

        let err = client.get("agents/missing", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("no such agent"));
    }
}
