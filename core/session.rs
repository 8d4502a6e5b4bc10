use std::collections::{HashMap, VecDeque};

use aura_tools::spec::ArgMap;
use shared_telemetry::SessionStats;

/// Ring-buffer depth for recent utterances.
const RECENT_CAPACITY: usize = 20;

/// A confirmation-gated action awaiting a follow-up utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    /// Tool awaiting confirmation.
    pub tool_name: String,
    /// Arguments captured from the original utterance.
    pub args: ArgMap,
    /// Description surfaced to the user.
    pub description: String,
}

/// Per-process session context.
///
/// Single writer: the orchestrator. Readers snapshot what they need before
/// any LLM call so the context stays consistent for one utterance.
#[derive(Debug)]
pub struct SessionContext {
    /// Name the assistant addresses the user by.
    pub user_name: String,
    /// Display name of the assistant.
    pub assistant_name: String,
    recent: VecDeque<String>,
    last_result: Option<String>,
    pending: Option<PendingAction>,
    codegen_failures: HashMap<String, u32>,
    /// Running counters, persisted across restarts.
    pub stats: SessionStats,
}

impl SessionContext {
    /// Fresh session for the given identities.
    #[must_use]
    pub fn new(user_name: impl Into<String>, assistant_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            assistant_name: assistant_name.into(),
            recent: VecDeque::with_capacity(RECENT_CAPACITY),
            last_result: None,
            pending: None,
            codegen_failures: HashMap::new(),
            stats: SessionStats::default(),
        }
    }

    /// Records an utterance in the ring buffer.
    pub fn record_utterance(&mut self, utterance: &str) {
        if self.recent.len() == RECENT_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(utterance.to_string());
    }

    /// Stores the latest result text.
    pub fn remember_result(&mut self, result: impl Into<String>) {
        self.last_result = Some(result.into());
    }

    /// Latest result text, if any.
    #[must_use]
    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    /// Snapshot of recent utterances, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<String> {
        self.recent.iter().cloned().collect()
    }

    /// Parks an action behind a confirmation.
    pub fn park_confirmation(&mut self, pending: PendingAction) {
        self.pending = Some(pending);
    }

    /// Takes the parked action, clearing it.
    pub fn take_confirmation(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }

    /// Counts a Layer 1.5 failure for this utterance and returns the total.
    pub fn note_codegen_failure(&mut self, utterance: &str) -> u32 {
        let count = self
            .codegen_failures
            .entry(utterance.to_lowercase())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// How often Layer 1.5 failed for this utterance already.
    #[must_use]
    pub fn codegen_failures(&self, utterance: &str) -> u32 {
        self.codegen_failures
            .get(&utterance.to_lowercase())
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_caps_at_twenty() {
        let mut session = SessionContext::new("Sir", "AURA");
        for i in 0..25 {
            session.record_utterance(&format!("utterance {i}"));
        }
        let recent = session.recent();
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent.first().unwrap(), "utterance 5");
        assert_eq!(recent.last().unwrap(), "utterance 24");
    }

    #[test]
    fn codegen_failures_accumulate_per_utterance() {
        let mut session = SessionContext::new("Sir", "AURA");
        assert_eq!(session.note_codegen_failure("Fix It"), 1);
        assert_eq!(session.note_codegen_failure("fix it"), 2);
        assert_eq!(session.codegen_failures("FIX IT"), 2);
        assert_eq!(session.codegen_failures("other"), 0);
    }

    #[test]
    fn confirmation_is_taken_once() {
        let mut session = SessionContext::new("Sir", "AURA");
        session.park_confirmation(PendingAction {
            tool_name: "delete_path".into(),
            args: ArgMap::new(),
            description: "delete notes.txt".into(),
        });
        assert!(session.take_confirmation().is_some());
        assert!(session.take_confirmation().is_none());
    }
}
