//! Inbound events delivered by a transport into the router's queue.

use std::collections::HashMap;

/// A message received on a named input endpoint.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub endpoint: String,
    pub payload: Vec<u8>,
    pub properties: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(endpoint: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            endpoint: endpoint.into(),
            payload: payload.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Everything a transport can hand to the module.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(InboundMessage),
    /// Desired-properties patch pushed to the module twin.
    TwinPatch(serde_json::Value),
}
