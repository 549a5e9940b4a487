//! Endpoint routing: input endpoint name -> handler, and the handlers themselves.
//!
//! Inference messages become one start-recording command per unique pipeline id.
//! Twin patches update the twin cell and forward any `startRecording` list verbatim.
//! A twin patch must be a JSON object, and its `startRecording` value must be a
//! list of commands; anything else is dropped as malformed rather than forwarded.
//! Every per-message error is logged here and the message dropped; `Router::route`
//! never fails.

use crate::inference::{InferenceError, Inferences};
use crate::recording::{
    encode_passthrough, RecordingAction, RecordingCommand, RecordingError, RECORDING_OUTPUT,
};
use crate::transport::{InboundMessage, ModuleTransport, TransportError, TransportEvent};
use crate::twin::{recording_trigger, TwinCell};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Region-of-interest updates; accepted and ignored at this layer.
pub const INPUT_REGIONS_OF_INTEREST: &str = "inputRegionsOfInterest";
/// Inference results from the AI pipeline.
pub const INFERENCE_INPUT: &str = "inferenceInput";
/// Source label used in logs for patches delivered through the twin channel.
const TWIN_SOURCE: &str = "$twin";

/// What to do with a message arriving on an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHandler {
    /// Log and drop.
    Discard,
    /// Parse inferences and start recording for each unique pipeline.
    TriggerFromInference,
    /// Treat the body as a twin patch: apply it, forward its recording trigger.
    TriggerFromTwin,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("malformed payload on {endpoint}: {reason}")]
    MalformedPayload { endpoint: String, reason: String },
    #[error("no handler registered for endpoint {0}")]
    UnrecognizedEndpoint(String),
    #[error("sending {context} to {output} failed: {source}")]
    TransportSend {
        context: String,
        output: String,
        #[source]
        source: TransportError,
    },
    #[error("unexpected error on {endpoint}: {reason}")]
    Unexpected { endpoint: String, reason: String },
}

impl RouteError {
    fn malformed(endpoint: &str, err: impl std::fmt::Display) -> Self {
        RouteError::MalformedPayload {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }

    fn unexpected(endpoint: &str, err: RecordingError) -> Self {
        RouteError::Unexpected {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result of routing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handled by a `Discard` route.
    Discarded,
    /// No route for the endpoint.
    Unrouted,
    /// Twin updated; the patch carried no recording trigger.
    TwinApplied,
    /// Outputs attempted: `sent` succeeded, `failed` were logged.
    Emitted { sent: usize, failed: usize },
    /// Malformed or otherwise unprocessable; logged and dropped.
    Dropped,
}

/// Exact, case-sensitive endpoint name -> handler map.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, EndpointHandler>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The module's wire contract: ROI discarded, inferences trigger recording.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(INPUT_REGIONS_OF_INTEREST, EndpointHandler::Discard);
        table.register(INFERENCE_INPUT, EndpointHandler::TriggerFromInference);
        table
    }

    /// Register a handler. Returns the handler previously bound to the endpoint, if any.
    pub fn register(
        &mut self,
        endpoint: impl Into<String>,
        handler: EndpointHandler,
    ) -> Option<EndpointHandler> {
        self.routes.insert(endpoint.into(), handler)
    }

    pub fn resolve(&self, endpoint: &str) -> Option<EndpointHandler> {
        self.routes.get(endpoint).copied()
    }

    pub fn endpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Short hex digest of a payload for log correlation.
fn payload_digest(payload: &[u8]) -> String {
    Sha256::digest(payload)
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub struct Router {
    table: RouteTable,
    transport: Arc<dyn ModuleTransport>,
    twin: Arc<TwinCell>,
}

impl Router {
    pub fn new(
        table: RouteTable,
        transport: Arc<dyn ModuleTransport>,
        twin: Arc<TwinCell>,
    ) -> Self {
        Self {
            table,
            transport,
            twin,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Route one event to its handler. Errors are logged and reported as `Dropped`.
    pub async fn route(&self, event: TransportEvent) -> RouteOutcome {
        match event {
            TransportEvent::Message(msg) => self.route_message(&msg).await,
            TransportEvent::TwinPatch(patch) => {
                match self.trigger_from_twin(TWIN_SOURCE, &patch).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        log::error!("dropping twin patch: {}", e);
                        RouteOutcome::Dropped
                    }
                }
            }
        }
    }

    async fn route_message(&self, msg: &InboundMessage) -> RouteOutcome {
        log::debug!(
            "message received on {}: {} bytes, digest {}, properties {:?}",
            msg.endpoint,
            msg.payload.len(),
            payload_digest(&msg.payload),
            msg.properties
        );
        let Some(handler) = self.table.resolve(&msg.endpoint) else {
            log::debug!("{}; dropping", RouteError::UnrecognizedEndpoint(msg.endpoint.clone()));
            return RouteOutcome::Unrouted;
        };
        match self.handle(handler, &msg.endpoint, &msg.payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("dropping message on {}: {}", msg.endpoint, e);
                RouteOutcome::Dropped
            }
        }
    }

    async fn handle(
        &self,
        handler: EndpointHandler,
        endpoint: &str,
        payload: &[u8],
    ) -> Result<RouteOutcome, RouteError> {
        match handler {
            EndpointHandler::Discard => {
                log::info!("received message on {}; discarding", endpoint);
                Ok(RouteOutcome::Discarded)
            }
            EndpointHandler::TriggerFromInference => {
                self.trigger_from_inference(endpoint, payload).await
            }
            EndpointHandler::TriggerFromTwin => {
                let patch: serde_json::Value = serde_json::from_slice(payload)
                    .map_err(|e| RouteError::malformed(endpoint, e))?;
                self.trigger_from_twin(endpoint, &patch).await
            }
        }
    }

    async fn trigger_from_inference(
        &self,
        endpoint: &str,
        payload: &[u8],
    ) -> Result<RouteOutcome, RouteError> {
        let inferences = Inferences::from_slice(payload)
            .map_err(|e: InferenceError| RouteError::malformed(endpoint, e))?;
        let pipeline_ids = inferences.pipeline_ids();
        log::info!(
            "received {} inference(s) on {}; starting recording for {} pipeline(s)",
            inferences.len(),
            endpoint,
            pipeline_ids.len()
        );

        // Build every command first so an encoding failure sends nothing.
        let mut bodies = Vec::with_capacity(pipeline_ids.len());
        for id in pipeline_ids {
            let body = RecordingCommand::from_action(id.as_str(), RecordingAction::Start)
                .and_then(|cmd| cmd.encode())
                .map_err(|e| RouteError::unexpected(endpoint, e))?;
            bodies.push((id, body));
        }

        let mut sent = 0;
        let mut failed = 0;
        for (id, body) in bodies {
            log::info!("{}: {}", id, RecordingAction::Start.as_str());
            match self.transport.send_to_output(RECORDING_OUTPUT, body).await {
                Ok(()) => sent += 1,
                Err(source) => {
                    failed += 1;
                    log::warn!(
                        "{}",
                        RouteError::TransportSend {
                            context: format!("start command for pipeline {}", id),
                            output: RECORDING_OUTPUT.to_string(),
                            source,
                        }
                    );
                }
            }
        }
        Ok(RouteOutcome::Emitted { sent, failed })
    }

    async fn trigger_from_twin(
        &self,
        source: &str,
        patch: &serde_json::Value,
    ) -> Result<RouteOutcome, RouteError> {
        log::info!("twin patch received via {}: {}", source, patch);
        if !patch.is_object() {
            return Err(RouteError::malformed(source, "twin patch must be a JSON object"));
        }
        let doc = self.twin.apply_patch(patch).await;
        log::debug!(
            "twin now at version {:?} with {} propert(ies)",
            doc.version,
            doc.properties.len()
        );

        let Some(commands) = recording_trigger(patch) else {
            return Ok(RouteOutcome::TwinApplied);
        };
        let Some(list) = commands.as_array() else {
            return Err(RouteError::malformed(source, "startRecording must be an array"));
        };
        let body =
            encode_passthrough(commands).map_err(|e| RouteError::unexpected(source, e))?;
        log::info!(
            "twin patch requests {} recording command(s); forwarding",
            list.len()
        );

        match self.transport.send_to_output(RECORDING_OUTPUT, body).await {
            Ok(()) => Ok(RouteOutcome::Emitted { sent: 1, failed: 0 }),
            Err(e) => {
                log::warn!(
                    "{}",
                    RouteError::TransportSend {
                        context: format!("twin batch of {} command(s)", list.len()),
                        output: RECORDING_OUTPUT.to_string(),
                        source: e,
                    }
                );
                Ok(RouteOutcome::Emitted { sent: 0, failed: 1 })
            }
        }
    }
}
