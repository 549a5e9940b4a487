//! HTTP bridge transport: an edge-hub style local endpoint.
//!
//! Inbound:
//! - `POST /inputs/:endpoint`: body is the raw message; `x-property-*` headers
//!   become custom properties.
//! - `PATCH /twin`: JSON desired-properties patch.
//! - `GET /`: health JSON.
//!
//! Outbound bodies are POSTed to `{outputUrl}/outputs/{output}`. Without an output
//! URL they are only logged.

use super::{InboundMessage, ModuleTransport, TransportError, TransportEvent};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

const PROPERTY_HEADER_PREFIX: &str = "x-property-";

#[derive(Clone)]
struct HttpState {
    module_name: String,
    events: mpsc::Sender<TransportEvent>,
}

struct ServerHandle {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct HttpTransport {
    module_name: String,
    bind_addr: String,
    output_url: Option<String>,
    client: reqwest::Client,
    server: Mutex<Option<ServerHandle>>,
}

impl HttpTransport {
    pub fn new(
        module_name: impl Into<String>,
        bind_addr: impl Into<String>,
        output_url: Option<String>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            bind_addr: bind_addr.into(),
            output_url,
            client: reqwest::Client::new(),
            server: Mutex::new(None),
        }
    }

    /// Address the listener is bound to, once attached.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(|s| s.local_addr)
    }
}

#[async_trait]
impl ModuleTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn attach(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            return Err(TransportError::Setup("http transport already attached".to_string()));
        }
        let listener = tokio::net::TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| TransportError::Setup(format!("binding to {}: {}", self.bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        let state = HttpState {
            module_name: self.module_name.clone(),
            events,
        };
        let app = Router::new()
            .route("/", get(health_http))
            .route("/inputs/:endpoint", post(post_input))
            .route("/twin", patch(patch_twin))
            .with_state(state);

        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = stop_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                log::error!("http transport server exited: {}", e);
            }
        });
        log::info!("http transport listening on {}", local_addr);
        *server = Some(ServerHandle {
            local_addr,
            stop,
            task,
        });
        Ok(())
    }

    async fn send_to_output(&self, output: &str, body: Vec<u8>) -> Result<(), TransportError> {
        let Some(ref base) = self.output_url else {
            log::info!(
                "output {} (no outputUrl configured): {}",
                output,
                String::from_utf8_lossy(&body)
            );
            return Ok(());
        };
        let url = format!("{}/outputs/{}", base.trim_end_matches('/'), output);
        let res = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Send {
                output: output.to_string(),
                reason: e.to_string(),
            })?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(TransportError::Send {
                output: output.to_string(),
                reason: format!("{} {}", status, text),
            });
        }
        Ok(())
    }

    async fn shutdown(&self) {
        let handle = self.server.lock().await.take();
        if let Some(h) = handle {
            let _ = h.stop.send(());
            if let Err(e) = h.task.await {
                log::debug!("http transport task join: {}", e);
            }
            log::info!("http transport on {} closed", h.local_addr);
        }
    }
}

/// GET / returns a simple health JSON for liveness checks.
async fn health_http(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "module": state.module_name,
    }))
}

/// POST /inputs/:endpoint: raw message body for the named input.
async fn post_input(
    State(state): State<HttpState>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let mut msg = InboundMessage::new(endpoint, body.to_vec());
    for (name, value) in headers.iter() {
        let Some(key) = name.as_str().strip_prefix(PROPERTY_HEADER_PREFIX) else {
            continue;
        };
        if let Ok(v) = value.to_str() {
            msg.properties.insert(key.to_string(), v.to_string());
        }
    }
    if state.events.send(TransportEvent::Message(msg)).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

/// PATCH /twin: desired-properties patch.
async fn patch_twin(State(state): State<HttpState>, body: Bytes) -> StatusCode {
    let patch: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    if state.events.send(TransportEvent::TwinPatch(patch)).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}
