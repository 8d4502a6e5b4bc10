use serde::{Deserialize, Serialize};
use thiserror::Error;

use aura_osgate::OsError;

/// Every failure a tool invocation, sandbox run, or LLM call can surface.
///
/// The orchestrator is the only component that maps these into retries or
/// user-visible responses; everything below it propagates them untouched.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The named tool is not in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// Arguments failed schema validation or coercion.
    #[error("bad arguments: {0}")]
    BadArgs(String),
    /// The host lacks a capability the tool requires.
    #[error("unsupported on this host: {0}")]
    Unsupported(String),
    /// The tool is gated behind an explicit confirmation.
    #[error("confirmation required: {0}")]
    ConfirmationRequired(String),
    /// The invocation exceeded its deadline.
    #[error("timed out after {0} ms")]
    Timeout(u64),
    /// A backing service was temporarily unavailable.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// A runtime dependency is missing and may be installable.
    #[error("missing dependency: {0}")]
    MissingDependency(String),
    /// Synthesized code violated the sandbox contract.
    #[error("sandbox violation: {0}")]
    SandboxViolation(String),
    /// The LLM endpoint was unreachable.
    #[error("llm network failure: {0}")]
    LlmNetwork(String),
    /// The LLM endpoint rate-limited the request.
    #[error("llm rate limited")]
    LlmRateLimit,
    /// The LLM rejected the credentials.
    #[error("llm authentication failed")]
    LlmAuth,
    /// The LLM returned an unusable response.
    #[error("llm bad response: {0}")]
    LlmBadResponse(String),
    /// No credentials are configured for LLM-backed layers.
    #[error("no credentials configured")]
    NoCredentials,
    /// Unclassified internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// Whether the self-healing loop may retry this failure with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }

    /// Short stable label used in traces and templated responses.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::BadArgs(_) => "bad_args",
            Self::Unsupported(_) => "unsupported",
            Self::ConfirmationRequired(_) => "confirmation_required",
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::MissingDependency(_) => "missing_dependency",
            Self::SandboxViolation(_) => "sandbox_violation",
            Self::LlmNetwork(_) => "llm_network",
            Self::LlmRateLimit => "llm_rate_limit",
            Self::LlmAuth => "llm_auth",
            Self::LlmBadResponse(_) => "llm_bad_response",
            Self::NoCredentials => "no_credentials",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<OsError> for ErrorKind {
    fn from(err: OsError) -> Self {
        match err {
            OsError::Unsupported { .. } => Self::Unsupported(err.to_string()),
            OsError::CommandFailed { .. } | OsError::Io { .. } => Self::Unavailable(err.to_string()),
            OsError::InvalidPath(detail) => Self::BadArgs(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ErrorKind::Timeout(30_000).is_transient());
        assert!(ErrorKind::Unavailable("mixer busy".into()).is_transient());
        assert!(!ErrorKind::BadArgs("level".into()).is_transient());
        assert!(!ErrorKind::SandboxViolation("import os".into()).is_transient());
    }

    #[test]
    fn serde_round_trip() {
        let kind = ErrorKind::MissingDependency("qrcode".into());
        let raw = serde_json::to_string(&kind).unwrap();
        let back: ErrorKind = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, kind);
    }
}
