use std::sync::Arc;

use serde_json::{json, Value};

use aura_sandbox::{ProgramSandbox, SandboxFailure};
use aura_tools::{registry::RegistrySnapshot, ErrorKind};

use crate::{
    client::{LlmClient, LlmOptions},
    parse::extract_code,
    prompts::{codegen_prompt, repair_prompt},
};

/// Programs longer than this are not worth promoting.
const REUSABLE_MAX_LINES: usize = 30;

/// Maps a sandbox failure into the invocation taxonomy.
#[must_use]
pub fn sandbox_error_kind(failure: &SandboxFailure) -> ErrorKind {
    match failure {
        SandboxFailure::Parse(detail) => ErrorKind::LlmBadResponse(format!("program: {detail}")),
        SandboxFailure::Runtime(detail) | SandboxFailure::Io(detail) => {
            ErrorKind::Internal(detail.clone())
        }
        SandboxFailure::Timeout(ms) => ErrorKind::Timeout(*ms),
        SandboxFailure::MemoryExceeded => ErrorKind::Unavailable("memory limit exceeded".into()),
        SandboxFailure::ForbiddenImport(module) => {
            ErrorKind::SandboxViolation(format!("import {module}"))
        }
    }
}

/// Result of one Layer 1.5 attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeGenOutcome {
    /// Whether a program ran to completion.
    pub ok: bool,
    /// Text surfaced to the user (program output or error summary).
    pub response_text: String,
    /// The program that ran, kept for promotion.
    pub program: Option<String>,
    /// Whether the program looks worth promoting.
    pub reusable: bool,
    /// Failure classification when `ok` is false.
    pub error: Option<ErrorKind>,
}

impl CodeGenOutcome {
    fn failed(error: ErrorKind) -> Self {
        Self {
            ok: false,
            response_text: String::new(),
            program: None,
            reusable: false,
            error: Some(error),
        }
    }
}

/// Layer 1.5: one generated program, one sandbox run, one repair round.
///
/// The LLM is called at most twice per utterance: once to generate and once
/// to repair after a typed failure.
pub struct CodeGenFallback {
    llm: Arc<dyn LlmClient>,
    sandbox: Arc<ProgramSandbox>,
}

impl CodeGenFallback {
    /// Builds the fallback over a model client and the sandbox.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, sandbox: Arc<ProgramSandbox>) -> Self {
        Self { llm, sandbox }
    }

    /// Generates and runs a program for the utterance.
    pub async fn run(&self, utterance: &str, snapshot: &RegistrySnapshot) -> CodeGenOutcome {
        let prompt = codegen_prompt(utterance, snapshot, self.sandbox.limits());
        let options = LlmOptions {
            temperature: 0.15,
            max_tokens: 768,
            ..LlmOptions::default()
        };
        let completion = match self.llm.complete(&prompt, &options).await {
            Ok(completion) => completion,
            Err(err) => return CodeGenOutcome::failed(err.into()),
        };
        let program = extract_code(&completion.text);
        if program.is_empty() {
            return CodeGenOutcome::failed(ErrorKind::LlmBadResponse("empty program".into()));
        }

        let outcome = self
            .sandbox
            .run_program(&program, &json!({}), None)
            .await;
        if outcome.ok {
            return self.finish(program, outcome.stdout, outcome.value);
        }

        // One repair round for failures the model can plausibly fix.
        let failure = outcome
            .failure
            .unwrap_or(SandboxFailure::Runtime("unknown".into()));
        if !matches!(failure, SandboxFailure::Parse(_) | SandboxFailure::Runtime(_)) {
            return CodeGenOutcome::failed(sandbox_error_kind(&failure));
        }
        let prompt = repair_prompt(utterance, &program, &failure.to_string());
        let completion = match self.llm.complete(&prompt, &options).await {
            Ok(completion) => completion,
            Err(err) => return CodeGenOutcome::failed(err.into()),
        };
        let repaired = extract_code(&completion.text);
        if repaired.is_empty() {
            return CodeGenOutcome::failed(sandbox_error_kind(&failure));
        }
        let outcome = self
            .sandbox
            .run_program(&repaired, &json!({}), None)
            .await;
        if outcome.ok {
            self.finish(repaired, outcome.stdout, outcome.value)
        } else {
            let failure = outcome
                .failure
                .unwrap_or(SandboxFailure::Runtime("unknown".into()));
            CodeGenOutcome::failed(sandbox_error_kind(&failure))
        }
    }

    #[allow(clippy::unused_self)]
    fn finish(&self, program: String, stdout: String, value: Option<Value>) -> CodeGenOutcome {
        let response_text = match (&stdout, &value) {
            (out, _) if !out.trim().is_empty() => out.trim().to_string(),
            (_, Some(value)) => value.to_string(),
            _ => "Done.".to_string(),
        };
        let reusable = is_reusable(&program);
        CodeGenOutcome {
            ok: true,
            response_text,
            program: Some(program),
            reusable,
            error: None,
        }
    }
}

/// Whether a successful program is a promotion candidate.
///
/// Short deterministic programs only; anything reading input or longer than
/// the cap stays one-shot.
fn is_reusable(program: &str) -> bool {
    program.lines().count() <= REUSABLE_MAX_LINES && !program.contains("input(")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScriptedLlmClient;
    use aura_tools::ToolRegistry;

    fn snapshot() -> RegistrySnapshot {
        ToolRegistry::new().snapshot()
    }

    fn fallback(llm: Arc<ScriptedLlmClient>) -> CodeGenFallback {
        CodeGenFallback::new(llm, Arc::new(ProgramSandbox::new()))
    }

    #[tokio::test]
    async fn successful_program_reports_output() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_response("```python\nimport math\nprint(math.sqrt(5293))\n```");
        let outcome = fallback(Arc::clone(&llm)).run("square root of 5293", &snapshot()).await;
        assert!(outcome.ok);
        assert!(outcome.response_text.starts_with("72.75"));
        assert!(outcome.reusable);
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn runtime_failure_gets_one_repair() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_response("print(undefined_name)\n");
        llm.push_response("print(42)\n");
        let outcome = fallback(Arc::clone(&llm)).run("print the answer", &snapshot()).await;
        assert!(outcome.ok);
        assert_eq!(outcome.response_text, "42");
        assert_eq!(llm.prompts().len(), 2, "generation plus one repair");
    }

    #[tokio::test]
    async fn forbidden_import_is_not_repaired() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_response("import os\nprint(os.getcwd())\n");
        let outcome = fallback(Arc::clone(&llm)).run("where am i", &snapshot()).await;
        assert!(!outcome.ok);
        assert!(matches!(outcome.error, Some(ErrorKind::SandboxViolation(_))));
        assert_eq!(llm.prompts().len(), 1, "violations are never repaired");
    }

    #[tokio::test]
    async fn llm_failure_surfaces_typed() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_error(crate::client::LlmError::RateLimit);
        let outcome = fallback(llm).run("anything", &snapshot()).await;
        assert_eq!(outcome.error, Some(ErrorKind::LlmRateLimit));
    }
}
