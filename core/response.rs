use serde::{Deserialize, Serialize};
use serde_json::Value;

use aura_brain::planner::{PlanReport, PlanStatus};
use aura_tools::ErrorKind;

/// Layer that produced a response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Layer 1: local reflex through the executor.
    Local,
    /// Layer 1.5: single-shot generated program.
    CodeGen,
    /// Layer 2: agentic plan.
    Agentic,
    /// Chat reply, no execution.
    Conversation,
}

impl Layer {
    /// Stable label used in traces.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::CodeGen => "codegen",
            Self::Agentic => "agentic",
            Self::Conversation => "conversation",
        }
    }
}

/// Uniform result returned for every utterance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    /// User-visible text.
    pub text: String,
    /// Whether the utterance succeeded.
    pub ok: bool,
    /// Whether any LLM call was made.
    pub used_llm: bool,
    /// Layer that handled the utterance.
    pub source_layer: Layer,
}

impl Response {
    /// Successful response.
    #[must_use]
    pub fn ok(text: impl Into<String>, used_llm: bool, source_layer: Layer) -> Self {
        Self {
            text: text.into(),
            ok: true,
            used_llm,
            source_layer,
        }
    }

    /// Failed response.
    #[must_use]
    pub fn failed(text: impl Into<String>, used_llm: bool, source_layer: Layer) -> Self {
        Self {
            text: text.into(),
            ok: false,
            used_llm,
            source_layer,
        }
    }
}

/// Confirmation message for a successful tool invocation.
#[must_use]
pub fn confirmation(tool_name: &str, value: &Value) -> String {
    let level = value.get("level").and_then(Value::as_i64);
    match tool_name {
        "set_volume" | "adjust_volume" => {
            level.map_or_else(|| "Volume updated.".to_string(), |l| format!("Volume set to {l}%."))
        }
        "get_volume" => level.map_or_else(
            || "Volume read.".to_string(),
            |l| format!("Volume is at {l}%."),
        ),
        "mute" => "Muted.".to_string(),
        "unmute" => "Unmuted.".to_string(),
        "media_play_pause" => "Toggled playback.".to_string(),
        "media_next" => "Skipped to the next track.".to_string(),
        "media_previous" => "Back to the previous track.".to_string(),
        "set_brightness" | "adjust_brightness" => level.map_or_else(
            || "Brightness updated.".to_string(),
            |l| format!("Brightness set to {l}%."),
        ),
        "open_app" => field(value, "opened").map_or_else(|| "Opened.".to_string(), |n| format!("Opened {n}.")),
        "close_app" => field(value, "closed").map_or_else(|| "Closed.".to_string(), |n| format!("Closed {n}.")),
        "focus_app" => field(value, "focused")
            .map_or_else(|| "Focused.".to_string(), |n| format!("Focused {n}.")),
        "open_file_explorer" => "Opened the file explorer.".to_string(),
        "open_website" => field(value, "opened")
            .map_or_else(|| "Opened.".to_string(), |u| format!("Opened {u}.")),
        "web_search" => field(value, "query")
            .map_or_else(|| "Searching.".to_string(), |q| format!("Searching for {q}.")),
        "take_screenshot" => field(value, "path")
            .map_or_else(|| "Screenshot taken.".to_string(), |p| format!("Screenshot saved to {p}.")),
        "create_dir" => field(value, "path")
            .map_or_else(|| "Folder created.".to_string(), |p| format!("Created {p}.")),
        "write_file" => field(value, "path")
            .map_or_else(|| "File saved.".to_string(), |p| format!("Saved {p}.")),
        "read_file" => field(value, "contents").unwrap_or_else(|| "Read.".to_string()),
        "delete_path" => field(value, "deleted")
            .map_or_else(|| "Deleted.".to_string(), |p| format!("Deleted {p}.")),
        "take_note" => "Noted.".to_string(),
        "empty_recycle_bin" => "Recycle bin emptied.".to_string(),
        "move_path" => "Moved.".to_string(),
        "clipboard_write" => "Copied to clipboard.".to_string(),
        "clipboard_read" => field(value, "text").unwrap_or_else(|| "Clipboard is empty.".to_string()),
        "lock_computer" => "Locked.".to_string(),
        "sleep_computer" => "Going to sleep.".to_string(),
        "shutdown_computer" => "Shutting down.".to_string(),
        "restart_computer" => "Restarting.".to_string(),
        "current_time" => field(value, "friendly")
            .map_or_else(|| "Time read.".to_string(), |t| format!("It's {t}.")),
        "install_dependency" => field(value, "installed")
            .map_or_else(|| "Installed.".to_string(), |p| format!("Installed {p}.")),
        "run_program" | "run_terminal_command" => field(value, "stdout")
            .map(|out| out.trim().to_string())
            .filter(|out| !out.is_empty())
            .unwrap_or_else(|| "Done.".to_string()),
        _ => "Done.".to_string(),
    }
}

/// User-visible failure message: the layer and a short cause, never a trace.
#[must_use]
pub fn failure(layer: Layer, kind: &ErrorKind) -> String {
    let cause = match kind {
        ErrorKind::UnknownTool(name) => format!("I don't have a tool called '{name}'"),
        ErrorKind::BadArgs(detail) => format!("the arguments were invalid ({detail})"),
        ErrorKind::Unsupported(detail) => format!("this host can't do that ({detail})"),
        ErrorKind::ConfirmationRequired(what) => {
            return format!("That would run {what}. Say 'confirm' to proceed.");
        }
        ErrorKind::Timeout(ms) => format!("it timed out after {ms} ms"),
        ErrorKind::Unavailable(detail) => format!("a required service was unavailable ({detail})"),
        ErrorKind::MissingDependency(package) => {
            format!("a dependency is missing ({package}) and could not be installed")
        }
        ErrorKind::SandboxViolation(detail) => {
            format!("the generated program was blocked ({detail})")
        }
        ErrorKind::LlmNetwork(_) => "I couldn't reach the language model".to_string(),
        ErrorKind::LlmRateLimit => "the language model is rate-limiting us".to_string(),
        ErrorKind::LlmAuth => "the language model rejected my credentials".to_string(),
        ErrorKind::LlmBadResponse(_) => "the language model answer was unusable".to_string(),
        ErrorKind::NoCredentials => {
            "no LLM credentials are configured, so I can only run direct commands".to_string()
        }
        ErrorKind::Internal(detail) => format!("something went wrong ({detail})"),
    };
    format!("Sorry, the {} layer failed: {cause}.", layer.label())
}

/// Summary of a plan run, always naming partial progress.
#[must_use]
pub fn plan_summary(report: &PlanReport) -> String {
    let mut lines: Vec<String> = report
        .steps
        .iter()
        .map(|step| {
            if step.ok {
                confirmation(&step.tool_name, &step.value)
            } else {
                let cause = step
                    .error
                    .as_ref()
                    .map_or_else(|| "failed".to_string(), ToString::to_string);
                format!("Step '{}' failed: {cause}.", step.tool_name)
            }
        })
        .collect();
    match report.status {
        PlanStatus::Success => {}
        PlanStatus::Partial | PlanStatus::Failure => {
            let done = report.steps.iter().filter(|s| s.ok).count();
            if report.cancelled {
                lines.push(format!("Cancelled after {done} completed step(s)."));
            } else {
                lines.push(format!("Stopped with {done} completed step(s)."));
            }
        }
    }
    lines.join(" ")
}

fn field(value: &Value, key: &str) -> Option<String> {
    value.get(key).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn volume_confirmation_matches_contract() {
        assert_eq!(confirmation("set_volume", &json!({ "level": 50 })), "Volume set to 50%.");
        assert_eq!(confirmation("mute", &json!({})), "Muted.");
    }

    #[test]
    fn failures_name_the_layer_without_traces() {
        let text = failure(Layer::Local, &ErrorKind::UnknownTool("warp".into()));
        assert!(text.contains("local layer"));
        assert!(text.contains("warp"));
        assert!(!text.contains("backtrace"));
    }

    #[test]
    fn confirmation_required_offers_the_follow_up() {
        let text = failure(
            Layer::Local,
            &ErrorKind::ConfirmationRequired("'delete_path'".into()),
        );
        assert!(text.contains("confirm"));
    }
}
