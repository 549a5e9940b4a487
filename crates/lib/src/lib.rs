//! Business logic container: routes inference messages from an edge AI pipeline
//! to start-recording commands, and forwards operator-triggered recording
//! commands pushed through the module twin.

pub mod config;
pub mod inference;
pub mod lifecycle;
pub mod recording;
pub mod routing;
pub mod transport;
pub mod twin;

pub use lifecycle::{Lifecycle, LifecycleError, LifecycleState, ModuleController, RunSummary};
pub use routing::{EndpointHandler, RouteOutcome, RouteTable, Router};
