#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! AURA intent routing: the sub-15ms local classifier and the persisted
//! capability store that lets promoted skills bypass the LLM.

/// Normalized edit-distance similarity.
#[path = "../fuzzy.rs"]
pub mod fuzzy;

/// Builtin routing rules covering the assistant command surface.
#[path = "../rules.rs"]
pub mod rules;

/// The deterministic classifier.
#[path = "../router.rs"]
pub mod router;

/// Promoted capabilities and their persistence.
#[path = "../capabilities.rs"]
pub mod capabilities;

pub use capabilities::{
    Capability, CapabilitySource, CapabilityStore, PromotionAudit, PromotionOutcome, Trigger,
};
pub use router::{IntentMatch, IntentRouter, MatchReason, CONFIDENCE_HIGH, CONFIDENCE_LOW};
pub use rules::RouteRule;
