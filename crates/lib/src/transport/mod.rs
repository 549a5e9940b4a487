//! Transport seam between the router and the device-management fabric.
//!
//! A transport delivers inbound messages and twin patches into the module's
//! queue and carries encoded bodies to named outputs. The lifecycle controller
//! owns the transport: only it attaches and shuts it down.

mod http;
mod inbound;
mod memory;

pub use http::HttpTransport;
pub use inbound::{InboundMessage, TransportEvent};
pub use memory::{MemoryTransport, OutboundMessage};

use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport setup failed: {0}")]
    Setup(String),
    #[error("send to output {output} failed: {reason}")]
    Send { output: String, reason: String },
    #[error("transport is closed")]
    Closed,
}

#[async_trait]
pub trait ModuleTransport: Send + Sync {
    /// Short name for logs (e.g. "http", "memory").
    fn name(&self) -> &str;

    /// Start delivering events to `events`. Called once by the controller.
    async fn attach(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError>;

    /// Full twin document at startup, when the transport can fetch one.
    async fn get_twin(&self) -> Result<Option<serde_json::Value>, TransportError> {
        Ok(None)
    }

    /// Send an encoded body to a named output endpoint.
    async fn send_to_output(&self, output: &str, body: Vec<u8>) -> Result<(), TransportError>;

    /// Stop delivering events and release connections. Safe to call more than once.
    async fn shutdown(&self);
}
