//! Module lifecycle: Running -> Draining -> Stopped.
//!
//! `ModuleController` owns the transport and the single consumer loop. The loop
//! waits on either the inbound queue or a state change; each event is routed to
//! completion (sends included) before the loop looks at shutdown again, so a
//! termination signal never cuts a send short.

use crate::config::ModuleConfig;
use crate::routing::{RouteTable, Router};
use crate::transport::{ModuleTransport, TransportError, TransportEvent};
use crate::twin::TwinCell;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("could not set up message handlers on {transport} transport: {source}")]
    HandlerSetup {
        transport: String,
        #[source]
        source: TransportError,
    },
}

/// Shared view of the module state. Cloned into the signal listener.
pub struct Lifecycle {
    tx: watch::Sender<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Running);
        Self { tx }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Move Running -> Draining. Returns false (and does nothing) in any other state.
    pub fn request_shutdown(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::Draining;
                true
            } else {
                false
            }
        })
    }

    fn mark_stopped(&self) {
        self.tx.send_replace(LifecycleState::Stopped);
    }
}

/// Counts reported when the consumer loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub discarded: usize,
}

pub struct ModuleController {
    router: Router,
    transport: Arc<dyn ModuleTransport>,
    twin: Arc<TwinCell>,
    lifecycle: Arc<Lifecycle>,
    inbound_rx: mpsc::Receiver<TransportEvent>,
}

impl ModuleController {
    /// Attach the standard routes to `transport`.
    pub async fn start(
        config: &ModuleConfig,
        transport: Arc<dyn ModuleTransport>,
    ) -> Result<Self, LifecycleError> {
        Self::start_with_routes(RouteTable::standard(), config, transport).await
    }

    /// Attach `routes` to `transport`. On failure the transport is shut down before returning.
    pub async fn start_with_routes(
        routes: RouteTable,
        config: &ModuleConfig,
        transport: Arc<dyn ModuleTransport>,
    ) -> Result<Self, LifecycleError> {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.queue_capacity.max(1));
        if let Err(source) = transport.attach(inbound_tx).await {
            log::error!(
                "could not set up message handlers on {} transport: {}",
                transport.name(),
                source
            );
            transport.shutdown().await;
            return Err(LifecycleError::HandlerSetup {
                transport: transport.name().to_string(),
                source,
            });
        }

        let twin = Arc::new(TwinCell::new());
        match transport.get_twin().await {
            Ok(Some(doc)) => {
                let snapshot = twin.replace(&doc).await;
                log::info!("initial twin loaded (version {:?})", snapshot.version);
            }
            Ok(None) => log::debug!("no initial twin from {} transport", transport.name()),
            Err(e) => log::warn!("fetching initial twin failed: {}", e),
        }

        let router = Router::new(routes, transport.clone(), twin.clone());
        log::info!(
            "module {} handlers registered on {} transport for {:?}",
            config.name,
            transport.name(),
            router.table().endpoints()
        );
        Ok(Self {
            router,
            transport,
            twin,
            lifecycle: Arc::new(Lifecycle::new()),
            inbound_rx,
        })
    }

    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        self.lifecycle.clone()
    }

    pub fn twin(&self) -> Arc<TwinCell> {
        self.twin.clone()
    }

    /// Consume events until shutdown is requested or the transport closes the queue,
    /// then release the transport.
    pub async fn run(mut self) -> RunSummary {
        let mut state_rx = self.lifecycle.subscribe();
        let mut summary = RunSummary::default();
        loop {
            if *state_rx.borrow_and_update() != LifecycleState::Running {
                break;
            }
            tokio::select! {
                biased;
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = self.inbound_rx.recv() => match event {
                    Some(event) => {
                        self.router.route(event).await;
                        summary.processed += 1;
                    }
                    None => {
                        log::info!("inbound queue closed by {} transport", self.transport.name());
                        break;
                    }
                }
            }
        }

        self.lifecycle.request_shutdown();
        log::info!("shutdown initiated; no longer accepting messages");
        self.inbound_rx.close();
        while self.inbound_rx.try_recv().is_ok() {
            summary.discarded += 1;
        }
        if summary.discarded > 0 {
            log::info!("discarded {} event(s) queued at shutdown", summary.discarded);
        }

        self.transport.shutdown().await;
        self.lifecycle.mark_stopped();
        log::info!(
            "module stopped after processing {} event(s)",
            summary.processed
        );
        summary
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn wait_for_termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Request shutdown on every termination signal. Signals after the first are no-ops.
pub fn spawn_signal_listener(lifecycle: Arc<Lifecycle>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            wait_for_termination_signal().await;
            if lifecycle.request_shutdown() {
                log::info!("termination signal received, draining");
            } else {
                log::debug!("termination signal ignored in state {:?}", lifecycle.state());
            }
        }
    })
}
