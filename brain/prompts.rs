use std::fmt::Write;

use aura_sandbox::SandboxLimits;
use aura_tools::{registry::RegistrySnapshot, spec::ArgType};

/// Compact one-line-per-tool listing for prompts.
#[must_use]
pub fn tool_listing(snapshot: &RegistrySnapshot) -> String {
    let mut listing = String::new();
    for spec in snapshot.iter() {
        let args: Vec<String> = spec
            .args
            .iter()
            .map(|(name, schema)| {
                let ty = match schema.arg_type {
                    ArgType::String => "string",
                    ArgType::Integer => "int",
                    ArgType::Float => "float",
                    ArgType::Boolean => "bool",
                };
                if schema.required {
                    format!("{name}: {ty}")
                } else {
                    format!("{name}?: {ty}")
                }
            })
            .collect();
        let _ = writeln!(
            listing,
            "- {}({}): {}",
            spec.name,
            args.join(", "),
            spec.description
        );
    }
    listing
}

/// Prompt for the single-shot Layer 1.5 program.
#[must_use]
pub fn codegen_prompt(utterance: &str, snapshot: &RegistrySnapshot, limits: &SandboxLimits) -> String {
    let modules: Vec<&str> = limits
        .allowed_imports
        .iter()
        .map(String::as_str)
        .collect();
    format!(
        "You are the code layer of a desktop assistant. Write one short Python \
         program that fulfils the request below. Print the final answer on the \
         last line. Only these modules may be imported: {}. A file `inputs.json` \
         in the working directory holds request parameters, if any. Do not read \
         user input, do not access the network or the filesystem outside the \
         working directory. Desktop actions are not available to this program; \
         they belong to these registered tools:\n{}\nRequest: {utterance}\n\
         Respond with only the program.",
        modules.join(", "),
        tool_listing(snapshot),
    )
}

/// Repair prompt after a typed sandbox failure; the second and last LLM call.
#[must_use]
pub fn repair_prompt(utterance: &str, source: &str, failure: &str) -> String {
    format!(
        "The program below failed. Fix it and respond with only the corrected \
         program.\nRequest: {utterance}\nFailure: {failure}\nProgram:\n{source}",
    )
}

/// Prompt for a Layer 2 plan constrained to the registered tools.
#[must_use]
pub fn plan_prompt(utterance: &str, snapshot: &RegistrySnapshot) -> String {
    format!(
        "Decompose the request into an ordered list of tool calls. Use only \
         these tools and argument names:\n{}\nRespond with a JSON array like \
         [{{\"tool_name\": \"...\", \"args\": {{...}}}}]. No prose.\n\
         Request: {utterance}",
        tool_listing(snapshot),
    )
}

/// Re-ask after an invalid plan, carrying the validation error.
#[must_use]
pub fn replan_prompt(utterance: &str, snapshot: &RegistrySnapshot, error: &str) -> String {
    format!(
        "{}\nYour previous plan was rejected: {error}. Respond again with a \
         valid JSON array only.",
        plan_prompt(utterance, snapshot),
    )
}

/// Conversation-layer prompt.
#[must_use]
pub fn chat_prompt(
    utterance: &str,
    assistant_name: &str,
    user_name: &str,
    recent: &[String],
) -> String {
    let mut history = String::new();
    for line in recent.iter().rev().take(5).rev() {
        let _ = writeln!(history, "- {line}");
    }
    format!(
        "You are {assistant_name}, a concise desktop voice assistant talking to \
         {user_name}. Recent commands:\n{history}Reply to the message in at most \
         three sentences, no markdown.\nMessage: {utterance}",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_tools::{spec::ArgSpec, ToolRegistry, ToolSpec};
    use std::sync::Arc;

    fn snapshot() -> RegistrySnapshot {
        let registry = Arc::new(ToolRegistry::new());
        struct Noop;
        #[async_trait::async_trait]
        impl aura_tools::ToolHandler for Noop {
            async fn invoke(
                &self,
                _args: &aura_tools::ArgMap,
            ) -> Result<serde_json::Value, aura_tools::ErrorKind> {
                Ok(serde_json::Value::Null)
            }
        }
        registry
            .register(
                ToolSpec::builder("set_volume", "Set master volume", "audio.set_volume")
                    .arg("level", ArgSpec::integer().required())
                    .build(),
                Arc::new(Noop),
            )
            .unwrap();
        registry.snapshot()
    }

    #[test]
    fn listing_carries_names_types_and_descriptions() {
        let listing = tool_listing(&snapshot());
        assert!(listing.contains("set_volume(level: int)"));
        assert!(listing.contains("Set master volume"));
    }

    #[test]
    fn codegen_prompt_names_the_allowlist() {
        let prompt = codegen_prompt("square root of 9", &snapshot(), &SandboxLimits::default());
        assert!(prompt.contains("math"));
        assert!(prompt.contains("square root of 9"));
    }
}
