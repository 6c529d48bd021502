//! Guest chat sessions: resolve the caller, mint a platform session scoped to
//! the guest namespace, and link the session back to the guest.

use std::sync::Arc;

use async_trait::async_trait;
use platform_client::{CreateSessionRequest, PlatformClient, PlatformError, SessionTicket};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GuestError, Result};
use crate::guest::{GuestResolver, GuestSummary};

/// Remote call that mints a chat session.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> std::result::Result<SessionTicket, PlatformError>;
}

#[async_trait]
impl SessionApi for PlatformClient {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> std::result::Result<SessionTicket, PlatformError> {
        PlatformClient::create_session(self, request).await
    }
}

/// Input for [`GuestSessions::create_guest_session`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGuestSession {
    pub ip: String,
    #[serde(default)]
    pub fingerprint: Option<String>,
    pub agent_id: String,
    /// Merged into the guest record and forwarded with the session
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// A minted session plus the guest it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestSession {
    pub session_id: String,
    pub token: String,
    /// Remaining fields returned by the platform
    #[serde(flatten)]
    pub session: Map<String, Value>,
    pub guest: GuestSummary,
}

/// Facade combining the resolver with the platform's session endpoint.
#[derive(Clone)]
pub struct GuestSessions {
    resolver: GuestResolver,
    api: Arc<dyn SessionApi>,
}

impl GuestSessions {
    pub fn new(resolver: GuestResolver, api: Arc<dyn SessionApi>) -> Self {
        Self { resolver, api }
    }

    pub fn resolver(&self) -> &GuestResolver {
        &self.resolver
    }

    /// Create a chat session for an anonymous caller.
    ///
    /// A guest created here is kept even if the remote call fails.
    pub async fn create_guest_session(&self, request: NewGuestSession) -> Result<GuestSession> {
        if request.ip.trim().is_empty() {
            return Err(GuestError::InvalidArgument(
                "ip is required for guest sessions".into(),
            ));
        }
        if request.agent_id.trim().is_empty() {
            return Err(GuestError::InvalidArgument("agent_id is required".into()));
        }

        let guest = self
            .resolver
            .resolve_or_create(
                &request.ip,
                request.fingerprint.as_deref(),
                request.metadata.clone(),
            )
            .await?;

        let ticket = self
            .api
            .create_session(&CreateSessionRequest {
                agent_id: request.agent_id,
                namespace: guest.namespace.clone(),
                metadata: request.metadata.map(Value::Object),
            })
            .await?;

        let guest = self
            .resolver
            .attach_session(&guest.id, &ticket.session_id)
            .await?;
        tracing::info!(guest_id = %guest.id, session_id = %ticket.session_id, "Created guest session");

        Ok(GuestSession {
            session_id: ticket.session_id,
            token: ticket.token,
            session: ticket.extra,
            guest: guest.summary(),
        })
    }
}

impl std::fmt::Debug for GuestSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestSessions")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
