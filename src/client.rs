use crate::config::HubConfig;
use crate::error::{Failure, HubError};
use crate::orchestration::{GroupSpec, OrchestrationReceipt};
use crate::request::{
    build_create, build_list, build_orchestration, build_output_query, build_start,
    build_status_query, CreateSessionParams, Request,
};
use crate::response::{normalize, EntityKind, Envelope};
use crate::session::{OutputReport, Session, SessionStatus, StartAck};
use crate::transport::{HttpTransport, Transport, TransportError};
use serde_json::Value;
use std::sync::{Arc, Once};
use tracing::{debug, warn};

static MISSING_TOKEN_WARNING: Once = Once::new();

/// Lifecycle operations against the hub webhook.
///
/// Every operation returns an [`Envelope`]; `Err` is reserved for the
/// transport failing to construct.
#[derive(Clone)]
pub struct HubClient {
    transport: Arc<dyn Transport>,
    config: Arc<HubConfig>,
}

impl HubClient {
    pub fn new(config: HubConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.request_timeout()));
        Self::with_transport(transport, config)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: HubConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        match self.config.auth_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => headers.push(("Authorization".to_string(), format!("Bearer {}", token))),
            None => MISSING_TOKEN_WARNING.call_once(|| {
                warn!("No webhook secret configured; requests are sent unauthenticated");
            }),
        }
        headers
    }

    /// Send a built request and normalize the reply into `kind`.
    pub async fn send(&self, request: &Request, kind: EntityKind) -> Result<Envelope, HubError> {
        debug!(
            "Sending {} request{}",
            request.kind(),
            request
                .session_id()
                .map(|id| format!(" for session {}", id))
                .unwrap_or_default()
        );

        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(e) => {
                let failure = Failure::malformed(format!("failed to encode request: {}", e));
                return Ok(Envelope::failure(failure));
            }
        };

        let response = match self
            .transport
            .post(&self.config.api_url, &body, &self.headers())
            .await
        {
            Ok(response) => response,
            Err(TransportError::Init(message)) => return Err(HubError::TransportInit(message)),
            Err(TransportError::Request(message)) => {
                return Ok(Envelope::failure(Failure::transport(message)))
            }
        };

        if !response.is_success() {
            let detail = response
                .body
                .as_ref()
                .and_then(|b| b.get("error").or_else(|| b.get("message")))
                .and_then(Value::as_str)
                .map(|m| format!(": {}", m))
                .unwrap_or_default();
            return Ok(Envelope::failure(Failure::transport(format!(
                "HTTP {}{}",
                response.status, detail
            ))));
        }

        let Some(body) = response.body else {
            return Ok(Envelope::failure(Failure::malformed("response body is not JSON")));
        };

        Ok(normalize(&body, kind, request.session_id()))
    }

    pub async fn create_session(
        &self,
        params: &CreateSessionParams,
    ) -> Result<Envelope<Session>, HubError> {
        let request = match build_create(params) {
            Ok(request) => request,
            Err(e) => return Ok(Envelope::failure(e)),
        };
        let envelope = self.send(&request, EntityKind::Session).await?;
        Ok(envelope
            .map(|mut entity| {
                if let Some(obj) = entity.as_object_mut() {
                    obj.entry("status")
                        .or_insert_with(|| Value::String(SessionStatus::Pending.to_string()));
                }
                entity
            })
            .decode())
    }

    pub async fn start_session(&self, session_id: &str) -> Result<Envelope<StartAck>, HubError> {
        let request = match build_start(session_id) {
            Ok(request) => request,
            Err(e) => return Ok(Envelope::failure(e)),
        };
        Ok(self.send(&request, EntityKind::Session).await?.decode())
    }

    pub async fn get_session_status(
        &self,
        session_id: &str,
    ) -> Result<Envelope<Session>, HubError> {
        let request = match build_status_query(session_id) {
            Ok(request) => request,
            Err(e) => return Ok(Envelope::failure(e)),
        };
        Ok(self.send(&request, EntityKind::Session).await?.decode())
    }

    pub async fn get_session_output(
        &self,
        session_id: &str,
    ) -> Result<Envelope<OutputReport>, HubError> {
        let request = match build_output_query(session_id) {
            Ok(request) => request,
            Err(e) => return Ok(Envelope::failure(e)),
        };
        Ok(self.send(&request, EntityKind::Output).await?.decode())
    }

    /// List sessions, optionally scoped to an orchestration. The status
    /// filter is applied here; `"all"` disables it.
    pub async fn list_sessions(
        &self,
        status_filter: Option<&str>,
        orchestration_id: Option<&str>,
    ) -> Result<Envelope<Vec<Session>>, HubError> {
        let query = build_list(status_filter, orchestration_id);
        let envelope: Envelope<Vec<Session>> = self
            .send(&query.request, EntityKind::SessionList)
            .await?
            .decode();

        Ok(match query.status_filter {
            Some(filter) => envelope.map(|sessions| {
                sessions
                    .into_iter()
                    .filter(|s| s.status == filter)
                    .collect()
            }),
            None => envelope,
        })
    }

    /// Submit a whole group as one `orchestration.create` request.
    pub async fn submit_orchestration(
        &self,
        spec: &GroupSpec,
    ) -> Result<Envelope<OrchestrationReceipt>, HubError> {
        let request = match build_orchestration(spec) {
            Ok(request) => request,
            Err(e) => return Ok(Envelope::failure(e)),
        };
        Ok(self.send(&request, EntityKind::Orchestration).await?.decode())
    }
}
