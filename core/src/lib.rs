#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! AURA core: the hybrid orchestrator that assigns exactly one layer to
//! every utterance, plus session context, response templating, and the
//! environment configuration surface.

/// Environment configuration and persisted-state paths.
#[path = "../config.rs"]
pub mod config;

/// Per-process session context.
#[path = "../session.rs"]
pub mod session;

/// Uniform responses and user-facing templates.
#[path = "../response.rs"]
pub mod response;

/// The single decision maker.
#[path = "../orchestrator.rs"]
pub mod orchestrator;

pub use config::AuraConfig;
pub use orchestrator::{HybridOrchestrator, OrchestratorBuilder};
pub use response::{Layer, Response};
pub use session::SessionContext;
