#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! AURA self-healing loop.
//!
//! Owns the recovery matrix (transient retry with backoff, dependency repair
//! through the constrained installer tool) and skill promotion, the only
//! runtime writer of the capability store.

/// Retry and dependency-repair engine.
#[path = "../healing.rs"]
pub mod healing;

/// Promotion of successful generated programs into capabilities.
#[path = "../promotion.rs"]
pub mod promotion;

pub use healing::SelfHealing;
pub use promotion::SkillPromoter;
