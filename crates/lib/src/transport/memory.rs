//! In-process transport: events are injected by the caller and outputs are
//! recorded in memory. Backs `blc run --loopback` and the integration tests.

use super::{ModuleTransport, TransportError, TransportEvent};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};

/// A body handed to an output endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub output: String,
    pub body: Vec<u8>,
}

impl OutboundMessage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

pub struct MemoryTransport {
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    sent: Mutex<Vec<OutboundMessage>>,
    twin: Option<serde_json::Value>,
    fail_attach: bool,
    fail_sends: AtomicBool,
    send_delay: Option<Duration>,
    send_started: Notify,
    shut_down: AtomicBool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            twin: None,
            fail_attach: false,
            fail_sends: AtomicBool::new(false),
            send_delay: None,
            send_started: Notify::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Twin document returned by `get_twin`.
    pub fn with_twin(mut self, twin: serde_json::Value) -> Self {
        self.twin = Some(twin);
        self
    }

    /// Make `attach` fail, as when handler registration is rejected.
    pub fn failing_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    /// Hold every send for `delay` before recording it.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Deliver an event as if it came off the wire.
    pub async fn inject(&self, event: TransportEvent) -> Result<(), TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Closed);
        }
        let tx = self.events.lock().await.clone();
        let Some(tx) = tx else {
            return Err(TransportError::Closed);
        };
        tx.send(event).await.map_err(|_| TransportError::Closed)
    }

    /// Outputs recorded so far, in send order.
    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    /// Resolves once a send has begun (one wake-up per send).
    pub async fn send_started(&self) {
        self.send_started.notified().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn attach(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        if self.fail_attach {
            return Err(TransportError::Setup(
                "memory transport configured to reject handlers".to_string(),
            ));
        }
        *self.events.lock().await = Some(events);
        Ok(())
    }

    async fn get_twin(&self) -> Result<Option<serde_json::Value>, TransportError> {
        Ok(self.twin.clone())
    }

    async fn send_to_output(&self, output: &str, body: Vec<u8>) -> Result<(), TransportError> {
        self.send_started.notify_one();
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send {
                output: output.to_string(),
                reason: "memory transport configured to fail sends".to_string(),
            });
        }
        if self.is_shut_down() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().await.push(OutboundMessage {
            output: output.to_string(),
            body,
        });
        Ok(())
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.events.lock().await.take();
    }
}
