use serde::{Deserialize, Serialize};

use crate::{registry::RegistrySnapshot, spec::ArgMap, ErrorKind};

/// Behavior when a plan step fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Stop the plan and report the failing step.
    #[default]
    Abort,
    /// Record the failure and continue with the next step.
    Continue,
    /// Re-invoke the step up to the given number of extra attempts.
    Retry(u32),
}

/// One tool invocation inside a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    /// Tool to invoke.
    pub tool_name: String,
    /// Arguments passed to the executor.
    #[serde(default)]
    pub args: ArgMap,
    /// Failure policy for this step.
    #[serde(default)]
    pub on_failure: OnFailure,
}

impl PlanStep {
    /// Creates a step with the default abort-on-failure policy.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, args: ArgMap) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            on_failure: OnFailure::default(),
        }
    }
}

/// Finite, acyclic, ordered list of tool calls.
///
/// Steps execute in declared order; plans are not resumed across process
/// restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Plan {
    /// Ordered steps.
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Creates a plan from steps.
    #[must_use]
    pub const fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// Creates a single-step plan.
    #[must_use]
    pub fn single(tool_name: impl Into<String>, args: ArgMap) -> Self {
        Self {
            steps: vec![PlanStep::new(tool_name, args)],
        }
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks every step against a registry snapshot.
    ///
    /// Rejects plans referencing unknown tools or failing schema coercion so
    /// the planner can re-ask before anything executes.
    pub fn validate(&self, snapshot: &RegistrySnapshot) -> Result<(), ErrorKind> {
        if self.steps.is_empty() {
            return Err(ErrorKind::BadArgs("plan has no steps".into()));
        }
        for step in &self.steps {
            let spec = snapshot
                .get(&step.tool_name)
                .ok_or_else(|| ErrorKind::UnknownTool(step.tool_name.clone()))?;
            spec.coerce_args(&step.args)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serde_round_trip_preserves_step_order() {
        let mut args = ArgMap::new();
        args.insert("level".into(), json!(30));
        let plan = Plan::new(vec![
            PlanStep::new("open_app", ArgMap::new()),
            PlanStep {
                tool_name: "set_volume".into(),
                args,
                on_failure: OnFailure::Retry(2),
            },
        ]);
        let raw = serde_json::to_string(&plan).unwrap();
        let back: Plan = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, plan);
        let tools: Vec<&str> = back.steps.iter().map(|s| s.tool_name.as_str()).collect();
        assert_eq!(tools, vec!["open_app", "set_volume"]);
    }

    #[test]
    fn default_failure_policy_is_abort() {
        let step: PlanStep = serde_json::from_value(json!({ "tool_name": "mute" })).unwrap();
        assert_eq!(step.on_failure, OnFailure::Abort);
    }
}
