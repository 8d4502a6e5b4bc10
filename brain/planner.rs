use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use aura_tools::{
    cancel::CancelToken,
    executor::{ExecPolicy, ToolExecutor},
    plan::{OnFailure, Plan, PlanStep},
    registry::RegistrySnapshot,
    spec::ArgMap,
    ErrorKind,
};

use crate::{
    client::{LlmClient, LlmOptions},
    parse::extract_json_array,
    prompts::{plan_prompt, replan_prompt},
};

/// Imperative verbs counted by the decomposition gate.
const ACTION_VERBS: &[&str] = &[
    "open", "close", "launch", "start", "quit", "set", "create", "make", "write", "save", "type",
    "press", "click", "play", "search", "mute", "unmute", "take", "capture", "lock", "delete",
    "move", "send", "increase", "decrease", "turn", "adjust", "install", "read", "show", "pause",
    "resume", "skip", "restart", "reboot", "empty", "run",
];

/// Sequencing conjunctions that force the agentic layer.
const SEQUENCE_TOKENS: &[&str] = &["then", "after", "afterwards"];

/// Decomposition gate: does this utterance need a multi-step plan?
///
/// Deterministic so it works without credentials: explicit sequencing
/// conjunctions always gate to a plan; "and" gates only when at least two
/// imperative verbs are present.
#[must_use]
pub fn needs_plan(utterance: &str) -> bool {
    let lowered = utterance.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.iter().any(|t| SEQUENCE_TOKENS.contains(t)) {
        return true;
    }
    if !tokens.iter().any(|t| *t == "and") {
        return false;
    }
    let verbs = tokens
        .iter()
        .filter(|t| ACTION_VERBS.contains(*t))
        .count();
    verbs >= 2
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(alias = "tool")]
    tool_name: String,
    #[serde(default)]
    args: ArgMap,
}

/// Layer 2 planner: asks the model for a plan constrained to the registry.
pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    /// Builds a planner over a model client.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Produces a validated plan, re-asking once on an invalid one.
    pub async fn plan(
        &self,
        utterance: &str,
        snapshot: &RegistrySnapshot,
    ) -> Result<Plan, ErrorKind> {
        let options = LlmOptions::json(512);
        let first = self
            .llm
            .complete(&plan_prompt(utterance, snapshot), &options)
            .await
            .map_err(ErrorKind::from)?;
        match parse_plan(&first.text).and_then(|plan| {
            plan.validate(snapshot)?;
            Ok(plan)
        }) {
            Ok(plan) => Ok(plan),
            Err(err) => {
                let second = self
                    .llm
                    .complete(&replan_prompt(utterance, snapshot, &err.to_string()), &options)
                    .await
                    .map_err(ErrorKind::from)?;
                let plan = parse_plan(&second.text)?;
                plan.validate(snapshot)?;
                Ok(plan)
            }
        }
    }
}

fn parse_plan(text: &str) -> Result<Plan, ErrorKind> {
    let slice = extract_json_array(text)
        .ok_or_else(|| ErrorKind::LlmBadResponse("no JSON array in plan response".into()))?;
    let raw: Vec<RawStep> = serde_json::from_str(slice)
        .map_err(|err| ErrorKind::LlmBadResponse(format!("unparsable plan: {err}")))?;
    Ok(Plan::new(
        raw.into_iter()
            .map(|step| PlanStep::new(step.tool_name, step.args))
            .collect(),
    ))
}

/// Terminal status of a plan run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Every step succeeded.
    Success,
    /// Some steps succeeded before an abort, cancellation, or skip.
    Partial,
    /// No step succeeded.
    Failure,
}

/// Outcome of one executed (or attempted) step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepReport {
    /// Tool invoked.
    pub tool_name: String,
    /// Whether the step succeeded.
    pub ok: bool,
    /// Handler value on success.
    pub value: Value,
    /// Failure classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// Full report of a plan run; partial progress is always visible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanReport {
    /// Reports for executed steps, in order.
    pub steps: Vec<StepReport>,
    /// Terminal status.
    pub status: PlanStatus,
    /// Whether cancellation stopped the run.
    pub cancelled: bool,
}

/// Executes a plan sequentially through the single execution authority.
///
/// Side effects occur in declared step order. The default `Abort` policy
/// stops at the first failure; `Retry(n)` re-invokes the executor for that
/// step. The cancel token is checked before every step.
pub async fn execute_plan(
    plan: &Plan,
    executor: &ToolExecutor,
    policy: &ExecPolicy,
    cancel: &CancelToken,
) -> PlanReport {
    let mut steps = Vec::with_capacity(plan.len());
    let mut cancelled = false;

    for step in &plan.steps {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let attempts = match step.on_failure {
            OnFailure::Retry(extra) => extra + 1,
            _ => 1,
        };
        let mut result = executor.execute(&step.tool_name, &step.args, policy).await;
        let mut used = 1;
        while !result.ok && used < attempts && !cancel.is_cancelled() {
            result = executor.execute(&step.tool_name, &step.args, policy).await;
            used += 1;
        }
        let ok = result.ok;
        steps.push(StepReport {
            tool_name: step.tool_name.clone(),
            ok,
            value: result.value,
            error: result.error,
        });
        if !ok && step.on_failure != OnFailure::Continue {
            break;
        }
    }

    let succeeded = steps.iter().filter(|s| s.ok).count();
    let status = if succeeded == plan.len() && !cancelled {
        PlanStatus::Success
    } else if succeeded == 0 {
        PlanStatus::Failure
    } else {
        PlanStatus::Partial
    };
    PlanReport {
        steps,
        status,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScriptedLlmClient;
    use aura_osgate::{LoopbackBoundary, OsBoundary};
    use aura_tools::{builtin::register_builtin_tools, ToolRegistry};
    use serde_json::json;

    fn executor_with_loopback() -> (Arc<LoopbackBoundary>, ToolExecutor) {
        let loopback = Arc::new(LoopbackBoundary::new());
        let boundary: Arc<dyn OsBoundary> = Arc::new((*loopback).clone());
        let registry = Arc::new(ToolRegistry::new());
        register_builtin_tools(&registry, &boundary).unwrap();
        let executor = ToolExecutor::new(registry, boundary.capabilities());
        (loopback, executor)
    }

    #[test]
    fn gate_detects_sequencing() {
        assert!(needs_plan("Open Spotify and set volume to 30"));
        assert!(needs_plan(
            "Create a folder on Desktop named notes and save a file hello.txt with Hi inside"
        ));
        assert!(needs_plan("open notepad then type hello"));
        assert!(!needs_plan("Set volume to 50"));
        assert!(!needs_plan("turn up the volume"));
        assert!(!needs_plan("write hello and goodbye into notes.txt"));
    }

    #[tokio::test]
    async fn invalid_plan_is_reasked_once() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_response(r#"[{"tool_name": "warp_drive", "args": {}}]"#);
        llm.push_response(r#"[{"tool_name": "mute", "args": {}}]"#);
        let (_loopback, executor) = executor_with_loopback();
        let planner = Planner::new(Arc::clone(&llm) as Arc<dyn LlmClient>);
        let plan = planner
            .plan("mute the audio", &executor.registry().snapshot())
            .await
            .unwrap();
        assert_eq!(plan.steps[0].tool_name, "mute");
        assert_eq!(llm.prompts().len(), 2);
    }

    #[tokio::test]
    async fn second_invalid_plan_fails() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_response("no json here");
        llm.push_response("still no json");
        let (_loopback, executor) = executor_with_loopback();
        let planner = Planner::new(llm as Arc<dyn LlmClient>);
        let err = planner
            .plan("mute", &executor.registry().snapshot())
            .await
            .unwrap_err();
        assert!(matches!(err, ErrorKind::LlmBadResponse(_)));
    }

    #[tokio::test]
    async fn plan_steps_execute_in_order() {
        let (loopback, executor) = executor_with_loopback();
        let mut open_args = ArgMap::new();
        open_args.insert("name".into(), json!("Spotify"));
        let mut volume_args = ArgMap::new();
        volume_args.insert("level".into(), json!(30));
        let plan = Plan::new(vec![
            PlanStep::new("open_app", open_args),
            PlanStep::new("set_volume", volume_args),
        ]);
        let report = execute_plan(&plan, &executor, &ExecPolicy::default(), &CancelToken::new()).await;
        assert_eq!(report.status, PlanStatus::Success);
        let ops: Vec<String> = loopback.effects().into_iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec!["apps.open", "audio.set_volume"]);
    }

    #[tokio::test]
    async fn abort_stops_at_failing_step() {
        let (loopback, executor) = executor_with_loopback();
        loopback.fail_operation("apps.open");
        let mut open_args = ArgMap::new();
        open_args.insert("name".into(), json!("Spotify"));
        let mut volume_args = ArgMap::new();
        volume_args.insert("level".into(), json!(30));
        let plan = Plan::new(vec![
            PlanStep::new("open_app", open_args),
            PlanStep::new("set_volume", volume_args),
        ]);
        let report = execute_plan(&plan, &executor, &ExecPolicy::default(), &CancelToken::new()).await;
        assert_eq!(report.status, PlanStatus::Failure);
        assert_eq!(report.steps.len(), 1, "volume step never ran");
        assert_eq!(loopback.volume(), 40, "untouched default");
    }

    #[tokio::test]
    async fn cancellation_reports_partial() {
        let (_loopback, executor) = executor_with_loopback();
        let cancel = CancelToken::new();
        let mut volume_args = ArgMap::new();
        volume_args.insert("level".into(), json!(30));
        let plan = Plan::new(vec![
            PlanStep::new("mute", ArgMap::new()),
            PlanStep::new("set_volume", volume_args),
        ]);
        cancel.cancel();
        let report = execute_plan(&plan, &executor, &ExecPolicy::default(), &cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.status, PlanStatus::Failure);
        assert!(report.steps.is_empty());
    }
}
