#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! AURA OS boundary library.
//!
//! Every platform API call in the workspace lives behind [`boundary::OsBoundary`].
//! Other crates receive a boundary handle or a test double; none of them may
//! import platform APIs directly.

/// Boundary trait, operation errors, and host capability tags.
#[path = "../boundary.rs"]
pub mod boundary;

/// Native implementation shelling out to platform utilities.
#[path = "../native.rs"]
pub mod native;

/// In-memory double recording effects for tests.
#[path = "../loopback.rs"]
pub mod loopback;

pub use boundary::{HostCapability, OsBoundary, OsError};
pub use loopback::{LoopbackBoundary, RecordedEffect};
pub use native::NativeBoundary;
