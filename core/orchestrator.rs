use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::time::Instant;

use aura_brain::{
    client::LlmClient,
    codegen::{sandbox_error_kind, CodeGenFallback},
    planner::{self, Planner},
    prompts,
};
use aura_healing::{SelfHealing, SkillPromoter};
use aura_osgate::OsBoundary;
use aura_routing::{
    rules::builtin_rules, CapabilityStore, IntentMatch, IntentRouter, PromotionOutcome, RouteRule,
    CONFIDENCE_HIGH, CONFIDENCE_LOW,
};
use aura_sandbox::ProgramSandbox;
use aura_tools::{
    builtin::register_builtin_tools,
    cancel::CancelToken,
    executor::{ExecPolicy, ToolExecutor},
    registry::{ToolHandler, ToolRegistry},
    spec::{ArgMap, ArgSpec, ToolSpec},
    ErrorKind,
};
use shared_telemetry::{JsonLogger, SessionStats, UtteranceTrace};

use crate::{
    config::AuraConfig,
    response::{self, Layer, Response},
    session::{PendingAction, SessionContext},
};

/// Follow-up phrases that satisfy a parked confirmation.
const CONFIRM_PHRASES: &[&str] = &["confirm", "confirmed", "yes", "yes do it", "do it"];

/// Handler bridging the `run_program` tool into the sandbox.
///
/// Registered in the core so promoted capabilities have a reachable tool;
/// the sandbox stays the only evaluator of synthesized source.
struct RunProgramHandler {
    sandbox: Arc<ProgramSandbox>,
}

#[async_trait]
impl ToolHandler for RunProgramHandler {
    async fn invoke(&self, args: &ArgMap) -> Result<Value, ErrorKind> {
        let source = args
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::Internal("coerced argument 'source' missing".into()))?;
        let outcome = self.sandbox.run_program(source, &json!({}), None).await;
        if outcome.ok {
            Ok(json!({ "stdout": outcome.stdout, "value": outcome.value }))
        } else {
            let failure = outcome
                .failure
                .unwrap_or(aura_sandbox::SandboxFailure::Runtime("unknown".into()));
            Err(sandbox_error_kind(&failure))
        }
    }
}

/// Where an utterance was routed.
#[derive(Debug)]
enum Decision {
    Conversation,
    Local(IntentMatch),
    CodeGen,
    Agentic,
}

struct Handled {
    response: Response,
    tool: Option<String>,
    healed: bool,
}

impl Handled {
    fn plain(response: Response) -> Self {
        Self {
            response,
            tool: None,
            healed: false,
        }
    }
}

/// Builder wiring the orchestrator's collaborators.
pub struct OrchestratorBuilder {
    config: AuraConfig,
    boundary: Arc<dyn OsBoundary>,
    llm: Option<Arc<dyn LlmClient>>,
    sandbox: Arc<ProgramSandbox>,
}

impl OrchestratorBuilder {
    /// Starts a builder over a boundary.
    #[must_use]
    pub fn new(config: AuraConfig, boundary: Arc<dyn OsBoundary>) -> Self {
        Self {
            config,
            boundary,
            llm: None,
            sandbox: Arc::new(ProgramSandbox::new()),
        }
    }

    /// Supplies the model client enabling Layers 1.5, 2, and conversation.
    #[must_use]
    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Overrides the sandbox.
    #[must_use]
    pub fn sandbox(mut self, sandbox: ProgramSandbox) -> Self {
        self.sandbox = Arc::new(sandbox);
        self
    }

    /// Loads persisted state and assembles the orchestrator.
    pub fn build(self) -> Result<HybridOrchestrator> {
        self.config.ensure_dirs()?;

        let registry = Arc::new(ToolRegistry::new());
        register_builtin_tools(&registry, &self.boundary).context("registering builtin tools")?;
        registry
            .register(
                ToolSpec::builder(
                    "run_program",
                    "Run a previously generated program in the sandbox",
                    "sandbox.run_program",
                )
                .arg("source", ArgSpec::string().required())
                .build(),
                Arc::new(RunProgramHandler {
                    sandbox: Arc::clone(&self.sandbox),
                }),
            )
            .context("registering run_program")?;

        let diagnostics = Arc::new(JsonLogger::new(
            self.config.logs_dir().join("diagnostics.jsonl"),
        )?);
        let executor = Arc::new(
            ToolExecutor::new(Arc::clone(&registry), self.boundary.capabilities())
                .with_telemetry(diagnostics),
        );

        let builtin = builtin_rules();
        let store = Arc::new(
            CapabilityStore::load(self.config.capabilities_path(), builtin.clone())
                .context("loading capability store")?,
        );
        let router = IntentRouter::new(&builtin, &store.snapshot())?;

        let codegen = self
            .llm
            .as_ref()
            .map(|llm| CodeGenFallback::new(Arc::clone(llm), Arc::clone(&self.sandbox)));
        let planner = self.llm.as_ref().map(|llm| Planner::new(Arc::clone(llm)));

        let mut session =
            SessionContext::new(&self.config.user_name, &self.config.assistant_name);
        session.stats = SessionStats::load(self.config.stats_path())?;

        let trace = Arc::new(JsonLogger::new(
            self.config.logs_dir().join("utterances.jsonl"),
        )?);

        Ok(HybridOrchestrator {
            router: RwLock::new(router),
            builtin,
            registry,
            executor: Arc::clone(&executor),
            healing: SelfHealing::new(executor),
            promoter: SkillPromoter::new(Arc::clone(&store)),
            store,
            llm: self.llm,
            codegen,
            planner,
            session: Mutex::new(session),
            trace,
            config: self.config,
            next_id: AtomicU64::new(1),
        })
    }
}

/// The single decision maker.
///
/// Routes every utterance through exactly one layer and returns the uniform
/// [`Response`]. No other component re-routes.
pub struct HybridOrchestrator {
    router: RwLock<IntentRouter>,
    builtin: Vec<RouteRule>,
    registry: Arc<ToolRegistry>,
    executor: Arc<ToolExecutor>,
    healing: SelfHealing,
    promoter: SkillPromoter,
    store: Arc<CapabilityStore>,
    llm: Option<Arc<dyn LlmClient>>,
    codegen: Option<CodeGenFallback>,
    planner: Option<Planner>,
    session: Mutex<SessionContext>,
    trace: Arc<JsonLogger>,
    config: AuraConfig,
    next_id: AtomicU64,
}

impl HybridOrchestrator {
    /// Starts a builder.
    #[must_use]
    pub fn builder(config: AuraConfig, boundary: Arc<dyn OsBoundary>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config, boundary)
    }

    /// Whether the model-backed layers are available.
    #[must_use]
    pub const fn llm_available(&self) -> bool {
        self.llm.is_some()
    }

    /// Capability store handle (read-only outside promotion).
    #[must_use]
    pub fn capability_store(&self) -> Arc<CapabilityStore> {
        Arc::clone(&self.store)
    }

    /// Current session counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.session.lock().stats.clone()
    }

    /// Processes one utterance with a fresh cancellation token.
    pub async fn process(&self, utterance: &str) -> Response {
        self.process_with_cancel(utterance, &CancelToken::new()).await
    }

    /// Processes one utterance under the given cancellation token.
    pub async fn process_with_cancel(&self, utterance: &str, cancel: &CancelToken) -> Response {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let trimmed = utterance.trim();
        if trimmed.is_empty() {
            return Response::failed("I didn't catch that.", false, Layer::Local);
        }
        self.session.lock().record_utterance(trimmed);

        if let Some(handled) = self.try_confirmation(trimmed).await {
            return self.finish(id, trimmed, &started, Layer::Local, handled);
        }

        let intent = self.router.read().classify(trimmed);
        let decision = self.decide(trimmed, intent);
        let layer = match &decision {
            Decision::Conversation => Layer::Conversation,
            Decision::Local(_) => Layer::Local,
            Decision::CodeGen => Layer::CodeGen,
            Decision::Agentic => Layer::Agentic,
        };

        let handled = tokio::select! {
            biased;
            () = cancel.cancelled() => Handled::plain(Response::failed(
                "Cancelled; completed steps were not rolled back.",
                !matches!(layer, Layer::Local),
                layer,
            )),
            handled = self.dispatch(trimmed, decision, cancel) => handled,
        };
        self.finish(id, trimmed, &started, layer, handled)
    }

    /// Assigns exactly one layer.
    ///
    /// Conversation wins first. Multi-step markers force the agentic layer
    /// even at high confidence, which is what makes compound utterances
    /// plan instead of firing their first matching pattern. Otherwise the
    /// pinned thresholds apply, with the twice-failed-codegen escape hatch.
    fn decide(&self, utterance: &str, intent: IntentMatch) -> Decision {
        if intent.is_conversation() {
            return Decision::Conversation;
        }
        if planner::needs_plan(utterance) {
            return Decision::Agentic;
        }
        if intent.confidence >= CONFIDENCE_HIGH {
            if let Some(tool) = &intent.tool_name {
                if self.registry.lookup(tool).is_some() {
                    return Decision::Local(intent);
                }
            }
        }
        if self.session.lock().codegen_failures(utterance) >= 2 {
            return Decision::Agentic;
        }
        if intent.confidence >= CONFIDENCE_LOW {
            // Mid confidence without multi-step markers prefers the cheaper
            // single-shot layer.
            return Decision::CodeGen;
        }
        Decision::CodeGen
    }

    async fn dispatch(&self, utterance: &str, decision: Decision, cancel: &CancelToken) -> Handled {
        match decision {
            Decision::Conversation => self.layer_conversation(utterance).await,
            Decision::Local(intent) => self.layer_local(&intent).await,
            Decision::CodeGen => self.layer_codegen(utterance).await,
            Decision::Agentic => self.layer_agentic(utterance, cancel).await,
        }
    }

    /// Replays a parked confirmation when the follow-up arrives.
    async fn try_confirmation(&self, trimmed: &str) -> Option<Handled> {
        let lowered = trimmed.to_lowercase();
        if !CONFIRM_PHRASES.contains(&lowered.as_str()) {
            return None;
        }
        let pending = self.session.lock().take_confirmation()?;
        let result = self
            .executor
            .execute(&pending.tool_name, &pending.args, &ExecPolicy::confirmed())
            .await;
        let response = if result.ok {
            Response::ok(
                response::confirmation(&pending.tool_name, &result.value),
                false,
                Layer::Local,
            )
        } else {
            let kind = result.error.unwrap_or(ErrorKind::Internal("unknown".into()));
            Response::failed(response::failure(Layer::Local, &kind), false, Layer::Local)
        };
        Some(Handled {
            response,
            tool: Some(pending.tool_name),
            healed: false,
        })
    }

    /// Layer 1: the fast path through the single execution authority.
    async fn layer_local(&self, intent: &IntentMatch) -> Handled {
        let tool = intent
            .tool_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let policy = ExecPolicy::default();
        let mut result = self.executor.execute(&tool, &intent.args, &policy).await;
        let mut healed = false;
        if !result.ok {
            let recovered = self
                .healing
                .recover(&tool, &intent.args, &policy, result)
                .await;
            healed = recovered.ok && recovered.retries_used > 0;
            result = recovered;
        }
        let response = if result.ok {
            Response::ok(
                response::confirmation(&tool, &result.value),
                false,
                Layer::Local,
            )
        } else {
            let kind = result.error.unwrap_or(ErrorKind::Internal("unknown".into()));
            if let ErrorKind::ConfirmationRequired(description) = &kind {
                self.session.lock().park_confirmation(PendingAction {
                    tool_name: tool.clone(),
                    args: intent.args.clone(),
                    description: description.clone(),
                });
            }
            Response::failed(response::failure(Layer::Local, &kind), false, Layer::Local)
        };
        Handled {
            response,
            tool: Some(tool),
            healed,
        }
    }

    /// Conversation layer: a chat reply, no execution.
    async fn layer_conversation(&self, utterance: &str) -> Handled {
        let Some(llm) = &self.llm else {
            return Handled::plain(Response::failed(
                response::failure(Layer::Conversation, &ErrorKind::NoCredentials),
                false,
                Layer::Conversation,
            ));
        };
        let (assistant, user, recent) = {
            let session = self.session.lock();
            (
                session.assistant_name.clone(),
                session.user_name.clone(),
                session.recent(),
            )
        };
        let prompt = prompts::chat_prompt(utterance, &assistant, &user, &recent);
        let options = aura_brain::client::LlmOptions {
            temperature: 0.6,
            max_tokens: 256,
            ..aura_brain::client::LlmOptions::default()
        };
        let mut attempt = llm.complete(&prompt, &options).await;
        if let Err(err) = &attempt {
            let kind: ErrorKind = err.clone().into();
            if SelfHealing::llm_retry_allowed(&kind) {
                attempt = llm.complete(&prompt, &options).await;
            }
        }
        match attempt {
            Ok(completion) => Handled::plain(Response::ok(
                completion.text.trim().to_string(),
                true,
                Layer::Conversation,
            )),
            Err(err) => Handled::plain(Response::failed(
                response::failure(Layer::Conversation, &err.into()),
                true,
                Layer::Conversation,
            )),
        }
    }

    /// Layer 1.5: single-shot program synthesis.
    async fn layer_codegen(&self, utterance: &str) -> Handled {
        let Some(codegen) = &self.codegen else {
            return Handled::plain(Response::failed(
                response::failure(Layer::CodeGen, &ErrorKind::NoCredentials),
                false,
                Layer::CodeGen,
            ));
        };
        let snapshot = self.registry.snapshot();
        let mut outcome = codegen.run(utterance, &snapshot).await;
        if let Some(error) = &outcome.error {
            if SelfHealing::llm_retry_allowed(error) {
                outcome = codegen.run(utterance, &snapshot).await;
            }
        }
        if outcome.ok {
            if outcome.reusable {
                if let Some(program) = &outcome.program {
                    self.try_promote(utterance, program);
                }
            }
            Handled::plain(Response::ok(outcome.response_text, true, Layer::CodeGen))
        } else {
            self.session.lock().note_codegen_failure(utterance);
            let kind = outcome.error.unwrap_or(ErrorKind::Internal("unknown".into()));
            Handled::plain(Response::failed(
                response::failure(Layer::CodeGen, &kind),
                true,
                Layer::CodeGen,
            ))
        }
    }

    /// Layer 2: plan and execute sequentially.
    async fn layer_agentic(&self, utterance: &str, cancel: &CancelToken) -> Handled {
        let Some(planner) = &self.planner else {
            return Handled::plain(Response::failed(
                response::failure(Layer::Agentic, &ErrorKind::NoCredentials),
                false,
                Layer::Agentic,
            ));
        };
        let snapshot = self.registry.snapshot();
        let mut plan = planner.plan(utterance, &snapshot).await;
        if let Err(kind) = &plan {
            if SelfHealing::llm_retry_allowed(kind) {
                plan = planner.plan(utterance, &snapshot).await;
            }
        }
        let plan = match plan {
            Ok(plan) => plan,
            Err(kind) => {
                return Handled::plain(Response::failed(
                    response::failure(Layer::Agentic, &kind),
                    true,
                    Layer::Agentic,
                ));
            }
        };
        let first_tool = plan.steps.first().map(|s| s.tool_name.clone());
        let report =
            planner::execute_plan(&plan, &self.executor, &ExecPolicy::default(), cancel).await;
        let ok = report.status == aura_brain::planner::PlanStatus::Success;
        let text = response::plan_summary(&report);
        Handled {
            response: Response {
                text,
                ok,
                used_llm: true,
                source_layer: Layer::Agentic,
            },
            tool: first_tool,
            healed: false,
        }
    }

    /// Proposes a successful program for promotion; on success the router
    /// recompiles with the new capability appended after the built-ins.
    fn try_promote(&self, utterance: &str, program: &str) {
        if let Ok(Some(PromotionOutcome::Promoted(_))) =
            self.promoter.promote_program(utterance, program)
        {
            self.session.lock().stats.skills_promoted += 1;
            if let Ok(router) = IntentRouter::new(&self.builtin, &self.store.snapshot()) {
                *self.router.write() = router;
            }
        }
    }

    /// Updates stats, remembers the result, and writes the utterance trace.
    fn finish(
        &self,
        id: u64,
        utterance: &str,
        started: &Instant,
        layer: Layer,
        handled: Handled,
    ) -> Response {
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let error_label = (!handled.response.ok).then(|| handled.response.text.clone());
        {
            let mut session = self.session.lock();
            match layer {
                Layer::Local => session.stats.record_local(),
                Layer::CodeGen => {
                    session.stats.record_llm();
                    session.stats.layer1_codegen += 1;
                }
                Layer::Agentic => {
                    session.stats.record_llm();
                    session.stats.layer2_agentic += 1;
                }
                Layer::Conversation => {
                    session.stats.record_llm();
                    session.stats.conversations += 1;
                }
            }
            if handled.healed {
                session.stats.layer3_healing += 1;
            }
            session.remember_result(&handled.response.text);
            let _ = session.stats.save(self.config.stats_path());
        }
        let _ = self.trace.trace(&UtteranceTrace {
            id,
            utterance: utterance.to_string(),
            layer: layer.label().to_string(),
            tool: handled.tool,
            ok: handled.response.ok,
            elapsed_ms,
            error: error_label,
        });
        handled.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_brain::client::ScriptedLlmClient;
    use aura_osgate::LoopbackBoundary;
    use aura_routing::MatchReason;
    use std::fs;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        loopback: Arc<LoopbackBoundary>,
        llm: Arc<ScriptedLlmClient>,
        orchestrator: HybridOrchestrator,
    }

    fn fixture() -> Fixture {
        fixture_with(true)
    }

    fn fixture_with(with_llm: bool) -> Fixture {
        let dir = tempdir().unwrap();
        let config = AuraConfig::rooted_at(dir.path());
        let loopback = Arc::new(LoopbackBoundary::new());
        let boundary: Arc<dyn OsBoundary> = Arc::new((*loopback).clone());
        let llm = Arc::new(ScriptedLlmClient::new());
        let mut builder = HybridOrchestrator::builder(config, boundary);
        if with_llm {
            builder = builder.llm(Arc::clone(&llm) as Arc<dyn LlmClient>);
        }
        Fixture {
            _dir: dir,
            loopback,
            llm,
            orchestrator: builder.build().unwrap(),
        }
    }

    fn effect_ops(fixture: &Fixture) -> Vec<String> {
        fixture
            .loopback
            .effects()
            .into_iter()
            .map(|e| e.operation)
            .collect()
    }

    #[tokio::test]
    async fn volume_command_takes_the_fast_path() {
        let f = fixture();
        let response = f.orchestrator.process("Set volume to 50").await;
        assert!(response.ok);
        assert_eq!(response.text, "Volume set to 50%.");
        assert!(!response.used_llm);
        assert_eq!(response.source_layer, Layer::Local);
        assert_eq!(f.loopback.volume(), 50);
        assert!(f.llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn mute_is_local_and_fast() {
        let f = fixture();
        let started = std::time::Instant::now();
        let response = f.orchestrator.process("Mute").await;
        assert!(started.elapsed().as_millis() < 50);
        assert_eq!(response.text, "Muted.");
        assert_eq!(effect_ops(&f), vec!["audio.mute"]);
    }

    #[tokio::test]
    async fn media_controls_take_the_fast_path() {
        let f = fixture();
        let response = f.orchestrator.process("next track").await;
        assert!(response.ok, "response: {response:?}");
        assert_eq!(response.text, "Skipped to the next track.");
        assert!(!response.used_llm);
        assert_eq!(effect_ops(&f), vec!["audio.media_next"]);
    }

    #[tokio::test]
    async fn conversation_gets_a_verbatim_reply_without_execution() {
        let f = fixture();
        f.llm.push_response("The meaning of life is 42.");
        let response = f.orchestrator.process("What's the meaning of life?").await;
        assert!(response.ok);
        assert_eq!(response.text, "The meaning of life is 42.");
        assert!(response.used_llm);
        assert_eq!(response.source_layer, Layer::Conversation);
        assert!(effect_ops(&f).is_empty());
    }

    #[tokio::test]
    async fn unknown_utterance_generates_runs_and_promotes() {
        let f = fixture();
        f.llm
            .push_response("```python\nimport math\nprint(math.sqrt(5293))\n```");
        let response = f
            .orchestrator
            .process("calculate the square root of 5293")
            .await;
        assert!(response.ok, "response: {response:?}");
        assert!(response.text.contains("72.75"));
        assert!(response.used_llm);
        assert_eq!(response.source_layer, Layer::CodeGen);
        assert_eq!(f.orchestrator.capability_store().len(), 1);

        // The promoted skill now routes locally, generalized over the number.
        let response = f
            .orchestrator
            .process("calculate the square root of 81")
            .await;
        assert!(response.ok, "response: {response:?}");
        assert_eq!(response.source_layer, Layer::Local);
        assert!(!response.used_llm);
        assert!(response.text.contains("9.0"));
    }

    #[tokio::test]
    async fn multi_step_utterance_plans_and_executes_in_order() {
        let f = fixture();
        f.llm.push_response(
            r#"[{"tool_name": "open_app", "args": {"name": "Spotify"}},
                {"tool_name": "set_volume", "args": {"level": 30}}]"#,
        );
        let response = f.orchestrator.process("Open Spotify and set volume to 30").await;
        assert!(response.ok, "response: {response:?}");
        assert_eq!(response.source_layer, Layer::Agentic);
        assert!(response.text.contains("Opened Spotify."));
        assert!(response.text.contains("Volume set to 30%."));
        assert_eq!(effect_ops(&f), vec!["apps.open", "audio.set_volume"]);
    }

    #[tokio::test]
    async fn folder_and_file_plan_reports_both_actions() {
        let f = fixture();
        f.llm.push_response(
            r#"[{"tool_name": "create_dir", "args": {"path": "Desktop/notes"}},
                {"tool_name": "write_file", "args": {"path": "Desktop/notes/hello.txt", "contents": "Hi"}}]"#,
        );
        let response = f
            .orchestrator
            .process("Create a folder on Desktop named notes and save a file hello.txt with Hi inside")
            .await;
        assert!(response.ok, "response: {response:?}");
        assert!(response.text.contains("Created"));
        assert!(response.text.contains("Saved"));
        assert_eq!(effect_ops(&f), vec!["files.create", "files.write"]);
    }

    #[tokio::test]
    async fn threshold_is_inclusive_for_the_fast_path() {
        let f = fixture();
        // Keyword confidence caps at exactly 0.85, which still executes
        // locally; the missing argument surfaces as a typed failure.
        let response = f.orchestrator.process("volume level please").await;
        assert_eq!(response.source_layer, Layer::Local);
        assert!(!response.used_llm);
        assert!(!response.ok);
    }

    #[test]
    fn confidence_boundary_pins_085_and_08499() {
        let f = fixture();
        let classified = |confidence: f64| IntentMatch {
            tool_name: Some("mute".into()),
            args: ArgMap::new(),
            confidence,
            reason: MatchReason::Keyword,
        };
        assert!(
            matches!(
                f.orchestrator.decide("mute please", classified(0.85)),
                Decision::Local(_)
            ),
            "exactly 0.85 takes the fast path"
        );
        assert!(
            matches!(
                f.orchestrator.decide("mute please", classified(0.8499)),
                Decision::CodeGen
            ),
            "0.8499 escalates"
        );
    }

    #[tokio::test]
    async fn failing_plan_step_aborts_and_names_the_step() {
        let f = fixture();
        f.loopback.fail_operation("apps.open");
        f.llm.push_response(
            r#"[{"tool_name": "open_app", "args": {"name": "Spotify"}},
                {"tool_name": "set_volume", "args": {"level": 30}}]"#,
        );
        let response = f.orchestrator.process("Open Spotify and set volume to 30").await;
        assert!(!response.ok);
        assert!(response.text.contains("open_app"));
        assert_eq!(f.loopback.volume(), 40, "second step never ran");
    }

    #[tokio::test]
    async fn near_threshold_confidence_escalates() {
        let f = fixture();
        f.llm.push_response("print('turned it up')\n");
        let response = f.orchestrator.process("make it loudr").await;
        assert_eq!(response.source_layer, Layer::CodeGen);
        assert!(response.used_llm);
        assert!(effect_ops(&f).is_empty(), "no direct execution below 0.85");
    }

    #[tokio::test]
    async fn missing_credentials_surface_typed() {
        let f = fixture_with(false);
        let response = f.orchestrator.process("calculate the square root of 2").await;
        assert!(!response.ok);
        assert!(!f.orchestrator.llm_available());
        assert!(response.text.contains("credentials"));
    }

    #[tokio::test]
    async fn confirmation_round_trip() {
        let f = fixture();
        let response = f.orchestrator.process("delete the file notes.txt").await;
        assert!(!response.ok);
        assert!(response.text.contains("confirm"));
        assert!(effect_ops(&f).is_empty());

        let response = f.orchestrator.process("confirm").await;
        assert!(response.ok, "response: {response:?}");
        assert_eq!(effect_ops(&f), vec!["files.delete"]);
    }

    #[tokio::test]
    async fn cancelled_utterance_reports_partial() {
        let f = fixture();
        let cancel = CancelToken::new();
        cancel.cancel();
        let response = f
            .orchestrator
            .process_with_cancel("Set volume to 50", &cancel)
            .await;
        assert!(!response.ok);
        assert!(response.text.contains("Cancelled"));
    }

    #[tokio::test]
    async fn every_utterance_is_traced_once() {
        let f = fixture();
        f.llm.push_response("Hello there.");
        let _ = f.orchestrator.process("Mute").await;
        let _ = f.orchestrator.process("what do you think about rust").await;
        let trace = fs::read_to_string(f._dir.path().join("logs/utterances.jsonl")).unwrap();
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: UtteranceTrace = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.layer, "local");
        assert_eq!(first.tool.as_deref(), Some("mute"));
        let second: UtteranceTrace = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.layer, "conversation");
    }

    #[tokio::test]
    async fn stats_accumulate_and_persist() {
        let f = fixture();
        let _ = f.orchestrator.process("Mute").await;
        let _ = f.orchestrator.process("Set volume to 20").await;
        let stats = f.orchestrator.stats();
        assert_eq!(stats.local_commands, 2);
        assert_eq!(stats.llm_commands, 0);
        assert!(stats.tokens_saved_estimate >= 1000);
        let persisted = SessionStats::load(f._dir.path().join("stats.json")).unwrap();
        assert_eq!(persisted, stats);
    }
}
