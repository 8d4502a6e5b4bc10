use std::{sync::Arc, time::Duration};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::{timeout, Instant};

use aura_osgate::HostCapability;
use shared_telemetry::{JsonLogger, LogLevel, LogRecord};

use crate::{
    error::ErrorKind,
    registry::{ResolvedTool, ToolHandler, ToolRegistry},
    spec::{ArgMap, Risk},
};

/// Default per-call handler deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-invocation policy supplied by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ExecPolicy {
    /// Confirmation flag satisfying [`Risk::Confirm`] tools.
    pub confirmed: bool,
    /// Overrides the tool and default timeouts when set.
    pub timeout_override: Option<Duration>,
}

impl ExecPolicy {
    /// Policy carrying an explicit confirmation.
    #[must_use]
    pub const fn confirmed() -> Self {
        Self {
            confirmed: true,
            timeout_override: None,
        }
    }
}

/// Uniform result of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationResult {
    /// Whether the handler completed successfully.
    pub ok: bool,
    /// Handler-produced value; `null` on failure.
    pub value: Value,
    /// Failure classification when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Wall-clock time spent in this invocation.
    pub elapsed_ms: u64,
    /// Retries consumed by the self-healing loop, zero at this layer.
    pub retries_used: u32,
}

impl InvocationResult {
    /// Successful result.
    #[must_use]
    pub const fn success(value: Value, elapsed_ms: u64) -> Self {
        Self {
            ok: true,
            value,
            error: None,
            elapsed_ms,
            retries_used: 0,
        }
    }

    /// Failed result.
    #[must_use]
    pub const fn failure(error: ErrorKind, elapsed_ms: u64) -> Self {
        Self {
            ok: false,
            value: Value::Null,
            error: Some(error),
            elapsed_ms,
            retries_used: 0,
        }
    }
}

/// The single execution authority.
///
/// Every handler invocation in the process flows through [`Self::execute`]:
/// it validates arguments, enforces risk and timeout policy, dispatches to
/// the bound handler, and records the outcome. It never retries; recovery
/// belongs to the self-healing loop.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    host: IndexSet<HostCapability>,
    default_timeout: Duration,
    telemetry: Option<Arc<JsonLogger>>,
}

impl ToolExecutor {
    /// Creates an executor over a registry for the given host capabilities.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, host: IndexSet<HostCapability>) -> Self {
        Self {
            registry,
            host,
            default_timeout: DEFAULT_TIMEOUT,
            telemetry: None,
        }
    }

    /// Attaches a diagnostic logger.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<JsonLogger>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Overrides the default deadline (tests use short ones).
    #[must_use]
    pub const fn with_default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    /// Shared registry handle.
    #[must_use]
    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }

    /// Host capabilities this executor was probed with.
    #[must_use]
    pub const fn host_capabilities(&self) -> &IndexSet<HostCapability> {
        &self.host
    }

    /// Validates, dispatches, and times one tool invocation.
    pub async fn execute(&self, tool_name: &str, args: &ArgMap, policy: &ExecPolicy) -> InvocationResult {
        let started = Instant::now();
        let elapsed = |s: Instant| u64::try_from(s.elapsed().as_millis()).unwrap_or(u64::MAX);

        let Some(resolved) = self.registry.resolve(tool_name) else {
            return InvocationResult::failure(
                ErrorKind::UnknownTool(tool_name.to_string()),
                elapsed(started),
            );
        };

        let coerced = match resolved.spec.coerce_args(args) {
            Ok(coerced) => coerced,
            Err(err) => return InvocationResult::failure(err, elapsed(started)),
        };

        let handler = match self.select_handler(&resolved) {
            Ok(handler) => handler,
            Err(err) => return InvocationResult::failure(err, elapsed(started)),
        };

        if resolved.spec.risk == Risk::Confirm && !policy.confirmed {
            return InvocationResult::failure(
                ErrorKind::ConfirmationRequired(format!(
                    "'{}' ({})",
                    resolved.spec.name, resolved.spec.description
                )),
                elapsed(started),
            );
        }

        let deadline = policy
            .timeout_override
            .or(resolved.spec.timeout_ms.map(Duration::from_millis))
            .unwrap_or(self.default_timeout);

        let result = match timeout(deadline, handler.invoke(&coerced)).await {
            Ok(Ok(value)) => InvocationResult::success(value, elapsed(started)),
            Ok(Err(err)) => InvocationResult::failure(err, elapsed(started)),
            Err(_) => InvocationResult::failure(
                ErrorKind::Timeout(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX)),
                elapsed(started),
            ),
        };

        self.record(tool_name, &result);
        result
    }

    /// Picks the primary handler, or the cross-platform fallback when the
    /// host lacks a required capability.
    fn select_handler(&self, resolved: &ResolvedTool) -> Result<Arc<dyn ToolHandler>, ErrorKind> {
        let missing: Vec<HostCapability> = resolved
            .spec
            .requires
            .iter()
            .filter(|cap| !self.host.contains(*cap))
            .copied()
            .collect();
        if missing.is_empty() {
            return Ok(Arc::clone(&resolved.handler));
        }
        resolved.fallback.clone().ok_or_else(|| {
            ErrorKind::Unsupported(format!(
                "{} requires {}",
                resolved.spec.name,
                missing
                    .iter()
                    .map(|cap| cap.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }

    fn record(&self, tool_name: &str, result: &InvocationResult) {
        if let Some(telemetry) = &self.telemetry {
            let level = if result.ok { LogLevel::Info } else { LogLevel::Warn };
            let record = LogRecord::new("executor", level, "tool.executed").with_metadata(json!({
                "tool": tool_name,
                "ok": result.ok,
                "elapsed_ms": result.elapsed_ms,
                "error": result.error.as_ref().map(ErrorKind::label),
            }));
            let _ = telemetry.log(&record);
        }
    }
}
