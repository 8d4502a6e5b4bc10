#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! AURA tool layer: typed tool specs, the registry, plan primitives, the
//! error taxonomy, and the single execution authority.

/// Invocation error taxonomy shared across layers.
#[path = "../error.rs"]
pub mod error;

/// Tool specifications and argument schema coercion.
#[path = "../spec.rs"]
pub mod spec;

/// Ordered multi-step plans produced by the agentic layer.
#[path = "../plan.rs"]
pub mod plan;

/// Tool registry with handler resolution at registration.
#[path = "../registry.rs"]
pub mod registry;

/// The single execution authority.
#[path = "../executor.rs"]
pub mod executor;

/// Builtin catalog bound to the OS boundary.
#[path = "../builtin.rs"]
pub mod builtin;

/// Per-utterance cancellation.
#[path = "../cancel.rs"]
pub mod cancel;

pub use cancel::CancelToken;
pub use error::ErrorKind;
pub use executor::{ExecPolicy, InvocationResult, ToolExecutor};
pub use plan::{OnFailure, Plan, PlanStep};
pub use registry::{RegistryError, RegistrySnapshot, ToolHandler, ToolRegistry};
pub use spec::{ArgConstraint, ArgMap, ArgSpec, ArgType, Risk, ToolSpec};
