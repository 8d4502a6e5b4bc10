#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! AURA code sandbox.
//!
//! The single place in the workspace where synthesized source is evaluated.
//! Programs run as interpreter subprocesses inside a scratch directory with a
//! wall-clock deadline, an address-space limit, and an import allowlist that
//! is enforced before the program ever starts.

/// Resource limits for one program run.
#[path = "../limits.rs"]
pub mod limits;

/// Pre-run source validation.
#[path = "../validator.rs"]
pub mod validator;

/// The subprocess runner.
#[path = "../runner.rs"]
pub mod runner;

pub use limits::SandboxLimits;
pub use runner::{ProgramOutcome, ProgramSandbox};
pub use validator::SandboxFailure;
