#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! AURA model-backed layers: the LLM client adapter, the single-shot
//! code-generation fallback (Layer 1.5), and the agentic planner (Layer 2).

/// LLM request/response contract and implementations.
#[path = "../client.rs"]
pub mod client;

/// JSON and code extraction from model text.
#[path = "../parse.rs"]
pub mod parse;

/// Prompt builders shared by the layers.
#[path = "../prompts.rs"]
pub mod prompts;

/// Layer 1.5: generate, run, repair once.
#[path = "../codegen.rs"]
pub mod codegen;

/// Layer 2: decomposition gate, plan synthesis, sequential execution.
#[path = "../planner.rs"]
pub mod planner;

pub use client::{Completion, HttpLlmClient, LlmClient, LlmError, LlmOptions, ScriptedLlmClient};
pub use codegen::{sandbox_error_kind, CodeGenFallback, CodeGenOutcome};
pub use planner::{execute_plan, needs_plan, PlanReport, PlanStatus, Planner, StepReport};
