use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Marker API operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiAction {
    List,
    Create,
    Update,
    Delete,
    Types,
}

/// One call to the marker backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiRequest {
    pub action: PoiAction,
    pub map: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub payload: serde_json::Value,
}

/// Wire envelope every backend response uses
#[derive(Debug, Clone, Deserialize)]
pub struct PoiEnvelope {
    pub status: u16,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The backend wants credentials before it will accept this call
    #[error("authentication required")]
    AuthRequired,
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

/// The marker backend, seen as one async call.
#[async_trait]
pub trait PoiService: Send + Sync {
    async fn call(&self, request: PoiRequest) -> Result<serde_json::Value, ServiceError>;
}

/// HTTP marker backend: every action is a JSON POST to one endpoint.
pub struct HttpPoiService {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPoiService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PoiService for HttpPoiService {
    async fn call(&self, request: PoiRequest) -> Result<serde_json::Value, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let http_status = response.status().as_u16();
        if http_status == 401 || http_status == 403 {
            return Err(ServiceError::AuthRequired);
        }

        let envelope: PoiEnvelope = response
            .json()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        match envelope.status {
            200 => Ok(envelope.data),
            401 | 403 => Err(ServiceError::AuthRequired),
            status => Err(ServiceError::Rejected {
                status,
                message: envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

/// Correlates a submitted request with its polled outcome
pub type RequestId = u64;

#[derive(Debug)]
pub struct PoiOutcome {
    pub request_id: RequestId,
    pub result: Result<serde_json::Value, ServiceError>,
}

/// Non-blocking submit/poll facade over [`PoiService`].
///
/// The interaction controller never awaits; it submits and later drains
/// outcomes during its tick.
pub trait PoiTransport {
    fn submit(&self, request: PoiRequest) -> RequestId;
    fn poll(&self) -> Vec<PoiOutcome>;
}

/// [`PoiTransport`] that spawns each call onto the tokio runtime.
///
/// Must be constructed inside a tokio runtime.
pub struct SpawnedTransport {
    service: Arc<dyn PoiService>,
    outcome_tx: Sender<PoiOutcome>,
    outcome_rx: Receiver<PoiOutcome>,
    next_id: AtomicU64,
}

impl SpawnedTransport {
    pub fn new(service: Arc<dyn PoiService>) -> Self {
        let (outcome_tx, outcome_rx) = unbounded();
        Self {
            service,
            outcome_tx,
            outcome_rx,
            next_id: AtomicU64::new(1),
        }
    }
}

impl PoiTransport for SpawnedTransport {
    fn submit(&self, request: PoiRequest) -> RequestId {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let service = Arc::clone(&self.service);
        let outcome_tx = self.outcome_tx.clone();

        tokio::spawn(async move {
            let result = service.call(request).await;
            let _ = outcome_tx.send(PoiOutcome { request_id, result });
        });

        request_id
    }

    fn poll(&self) -> Vec<PoiOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }
}
