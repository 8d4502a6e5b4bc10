use std::{sync::Arc, time::Duration};

use rand::Rng;
use serde_json::json;
use tokio::time::sleep;

use aura_tools::{
    executor::{ExecPolicy, ToolExecutor},
    spec::ArgMap,
    ErrorKind, InvocationResult,
};

/// Retry budget for transient failures.
const MAX_RETRIES: u32 = 2;
/// Base backoff before the first retry.
const BASE_DELAY: Duration = Duration::from_millis(150);

/// Layer 3 recovery engine.
///
/// The executor never retries; this loop owns the recovery matrix. Transient
/// failures get bounded exponential backoff, missing dependencies get one
/// installation round through the constrained installer tool, and everything
/// else surfaces untouched.
pub struct SelfHealing {
    executor: Arc<ToolExecutor>,
    max_retries: u32,
    base_delay: Duration,
}

impl SelfHealing {
    /// Builds the loop over the single execution authority.
    #[must_use]
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self {
            executor,
            max_retries: MAX_RETRIES,
            base_delay: BASE_DELAY,
        }
    }

    /// Shrinks delays for tests.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Whether a failed LLM call may be retried once.
    #[must_use]
    pub const fn llm_retry_allowed(kind: &ErrorKind) -> bool {
        matches!(kind, ErrorKind::LlmNetwork(_) | ErrorKind::LlmRateLimit)
    }

    /// Applies the recovery matrix to a failed invocation.
    ///
    /// Returns the original result when the failure class is not
    /// recoverable; otherwise the result of the last attempt with
    /// `retries_used` filled in.
    pub async fn recover(
        &self,
        tool_name: &str,
        args: &ArgMap,
        policy: &ExecPolicy,
        failed: InvocationResult,
    ) -> InvocationResult {
        match &failed.error {
            Some(kind) if kind.is_transient() => self.retry(tool_name, args, policy, failed).await,
            Some(ErrorKind::MissingDependency(package)) => {
                let package = package.clone();
                self.repair_dependency(tool_name, args, policy, &package, failed)
                    .await
            }
            _ => failed,
        }
    }

    /// Bounded exponential backoff for `Timeout` and `Unavailable`.
    async fn retry(
        &self,
        tool_name: &str,
        args: &ArgMap,
        policy: &ExecPolicy,
        mut last: InvocationResult,
    ) -> InvocationResult {
        for attempt in 0..self.max_retries {
            sleep(self.backoff(attempt)).await;
            let mut result = self.executor.execute(tool_name, args, policy).await;
            result.retries_used = attempt + 1;
            if result.ok || !result.error.as_ref().is_some_and(ErrorKind::is_transient) {
                return result;
            }
            last = result;
        }
        last
    }

    /// Installs the missing package through the installer tool, then re-runs
    /// the original invocation once.
    async fn repair_dependency(
        &self,
        tool_name: &str,
        args: &ArgMap,
        policy: &ExecPolicy,
        package: &str,
        failed: InvocationResult,
    ) -> InvocationResult {
        let mut install_args = ArgMap::new();
        install_args.insert("package".into(), json!(package));
        let install = self
            .executor
            .execute("install_dependency", &install_args, &ExecPolicy::default())
            .await;
        if !install.ok {
            return failed;
        }
        let mut result = self.executor.execute(tool_name, args, policy).await;
        result.retries_used = 1;
        result
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay * 2u32.saturating_pow(attempt);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..50));
        exponential + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aura_tools::{
        registry::{ToolHandler, ToolRegistry},
        spec::{ArgSpec, ToolSpec},
    };
    use indexmap::IndexSet;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyHandler {
        failures: AtomicU32,
    }

    #[async_trait]
    impl ToolHandler for FlakyHandler {
        async fn invoke(&self, _args: &ArgMap) -> Result<Value, ErrorKind> {
            if self.failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(ErrorKind::Unavailable("mixer busy".into()))
            } else {
                Ok(json!({ "done": true }))
            }
        }
    }

    struct NeedsPackage {
        installed: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ToolHandler for NeedsPackage {
        async fn invoke(&self, _args: &ArgMap) -> Result<Value, ErrorKind> {
            if self.installed.load(Ordering::SeqCst) == 0 {
                Err(ErrorKind::MissingDependency("qrcode".into()))
            } else {
                Ok(json!({ "rendered": true }))
            }
        }
    }

    struct Installer {
        installed: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ToolHandler for Installer {
        async fn invoke(&self, args: &ArgMap) -> Result<Value, ErrorKind> {
            assert_eq!(args["package"], json!("qrcode"));
            self.installed.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "installed": "qrcode" }))
        }
    }

    fn healing_over(registry: Arc<ToolRegistry>) -> SelfHealing {
        let executor = Arc::new(ToolExecutor::new(registry, IndexSet::new()));
        SelfHealing::new(executor).with_base_delay(Duration::from_millis(1))
    }

    async fn fail_then_recover(registry: Arc<ToolRegistry>, tool: &str) -> InvocationResult {
        let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), IndexSet::new()));
        let failed = executor.execute(tool, &ArgMap::new(), &ExecPolicy::default()).await;
        assert!(!failed.ok);
        healing_over(registry)
            .recover(tool, &ArgMap::new(), &ExecPolicy::default(), failed)
            .await
    }

    #[tokio::test]
    async fn transient_failures_retry_with_budget() {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(
                ToolSpec::builder("flaky", "Fails twice", "test.flaky").build(),
                Arc::new(FlakyHandler {
                    failures: AtomicU32::new(2),
                }),
            )
            .unwrap();
        let result = fail_then_recover(registry, "flaky").await;
        assert!(result.ok);
        assert_eq!(result.retries_used, 2);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(
                ToolSpec::builder("always_down", "Never succeeds", "test.down").build(),
                Arc::new(FlakyHandler {
                    failures: AtomicU32::new(u32::MAX),
                }),
            )
            .unwrap();
        let result = fail_then_recover(registry, "always_down").await;
        assert!(!result.ok);
        assert_eq!(result.retries_used, MAX_RETRIES);
    }

    #[tokio::test]
    async fn missing_dependency_installs_and_reruns_once() {
        let installed = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(
                ToolSpec::builder("make_qr", "Render a QR code", "test.qr").build(),
                Arc::new(NeedsPackage {
                    installed: Arc::clone(&installed),
                }),
            )
            .unwrap();
        registry
            .register(
                ToolSpec::builder("install_dependency", "Install a package", "test.install")
                    .arg("package", ArgSpec::string().required())
                    .build(),
                Arc::new(Installer {
                    installed: Arc::clone(&installed),
                }),
            )
            .unwrap();
        let result = fail_then_recover(registry, "make_qr").await;
        assert!(result.ok);
        assert_eq!(result.retries_used, 1);
        assert_eq!(installed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_recoverable_failures_surface_unchanged() {
        let registry = Arc::new(ToolRegistry::new());
        let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), IndexSet::new()));
        let failed = executor
            .execute("missing_tool", &ArgMap::new(), &ExecPolicy::default())
            .await;
        let healing = healing_over(registry);
        let result = healing
            .recover("missing_tool", &ArgMap::new(), &ExecPolicy::default(), failed.clone())
            .await;
        assert_eq!(result, failed);
    }

    #[test]
    fn llm_retry_matrix() {
        assert!(SelfHealing::llm_retry_allowed(&ErrorKind::LlmRateLimit));
        assert!(SelfHealing::llm_retry_allowed(&ErrorKind::LlmNetwork("down".into())));
        assert!(!SelfHealing::llm_retry_allowed(&ErrorKind::LlmAuth));
        assert!(!SelfHealing::llm_retry_allowed(&ErrorKind::NoCredentials));
    }
}
