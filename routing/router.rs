use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use aura_tools::spec::ArgMap;

use crate::{
    capabilities::{instantiate_args, Capability},
    fuzzy::similarity,
    rules::RouteRule,
};

/// Confidence at or above which Layer 1 executes directly.
pub const CONFIDENCE_HIGH: f64 = 0.85;
/// Confidence at or above which the mid layers handle the utterance.
pub const CONFIDENCE_LOW: f64 = 0.50;

/// Keyword-phase acceptance gate.
const KEYWORD_GATE: f64 = 0.60;
/// Fuzzy-phase acceptance gate.
const FUZZY_GATE: f64 = 0.75;
/// Fuzzy confidence ceiling; fuzzy matches never reach the fast path.
const FUZZY_CEILING: f64 = 0.84;

/// Single-token conversational markers.
const MARKER_TOKENS: &[&str] = &[
    "what", "whats", "who", "whos", "why", "how", "when", "where", "which", "whose", "explain",
    "describe", "chat", "discuss", "compare",
];

/// Multi-word conversational markers.
const MARKER_PHRASES: &[&str] = &[
    "tell me",
    "can you",
    "could you",
    "would you",
    "teach me",
    "difference between",
    "do you know",
    "show me how",
    "your opinion",
    "what do you think",
    "help me understand",
];

/// How a classification was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// A compiled regex matched.
    Pattern,
    /// Token-overlap keyword scoring matched.
    Keyword,
    /// Edit-distance similarity against a canonical phrase matched.
    Fuzzy,
    /// Conversational markers dominated.
    Conversation,
    /// Nothing matched.
    Unknown,
}

/// Classification of one utterance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentMatch {
    /// Tool to invoke; `None` for conversation and unknown.
    pub tool_name: Option<String>,
    /// Extracted arguments.
    pub args: ArgMap,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Phase that produced the match.
    pub reason: MatchReason,
}

impl IntentMatch {
    /// The no-match classification.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            tool_name: None,
            args: ArgMap::new(),
            confidence: 0.0,
            reason: MatchReason::Unknown,
        }
    }

    /// Whether this utterance should get a chat reply.
    #[must_use]
    pub const fn is_conversation(&self) -> bool {
        matches!(self.reason, MatchReason::Conversation)
    }
}

struct CompiledRule {
    name: String,
    tool_name: String,
    regexes: Vec<Regex>,
    keywords: Vec<String>,
    canonical: Vec<String>,
    args: ArgMap,
    /// Promoted capabilities instantiate `{capture}` placeholders.
    templated: bool,
}

/// The deterministic Layer 1 classifier.
///
/// Pure function of the utterance and the rule tables compiled at
/// construction; no I/O, no blocking. Patterns compile once here so that
/// classification stays inside the fast-path latency contract. Promoted
/// capabilities are appended after built-ins, preserving precedence.
pub struct IntentRouter {
    rules: Vec<CompiledRule>,
}

impl IntentRouter {
    /// Compiles builtin rules plus promoted capabilities.
    pub fn new(builtin: &[RouteRule], promoted: &[Capability]) -> Result<Self> {
        let mut rules = Vec::with_capacity(builtin.len() + promoted.len());
        for rule in builtin {
            rules.push(CompiledRule {
                name: rule.name.clone(),
                tool_name: rule.tool_name.clone(),
                regexes: compile_all(&rule.name, &rule.patterns)?,
                keywords: rule.keywords.clone(),
                canonical: rule.canonical.clone(),
                args: rule.fixed_args.clone(),
                templated: false,
            });
        }
        for capability in promoted {
            let patterns: Vec<String> = capability
                .triggers
                .iter()
                .filter_map(|t| t.pattern.clone())
                .collect();
            let keywords: Vec<String> = capability
                .triggers
                .iter()
                .flat_map(|t| t.keywords.iter().cloned())
                .collect();
            rules.push(CompiledRule {
                name: capability.name.clone(),
                tool_name: capability.tool_name.clone(),
                regexes: compile_all(&capability.name, &patterns)?,
                keywords,
                canonical: Vec::new(),
                args: capability.args_template.clone(),
                templated: true,
            });
        }
        Ok(Self { rules })
    }

    /// Classifies one utterance.
    #[must_use]
    pub fn classify(&self, utterance: &str) -> IntentMatch {
        let lowered = utterance.trim().to_lowercase();
        if lowered.is_empty() {
            return IntentMatch::unknown();
        }
        let tokens = tokenize(&lowered);

        let pattern_hit = self.pattern_phase(&lowered);
        if pattern_hit.is_none() && is_conversational(&lowered, &tokens) {
            return IntentMatch {
                tool_name: None,
                args: ArgMap::new(),
                confidence: 0.95,
                reason: MatchReason::Conversation,
            };
        }
        if let Some(hit) = pattern_hit {
            return hit;
        }
        if let Some(hit) = self.keyword_phase(&tokens) {
            return hit;
        }
        if let Some(hit) = self.fuzzy_phase(&lowered) {
            return hit;
        }
        IntentMatch::unknown()
    }

    /// First pattern match in declared rule order wins.
    fn pattern_phase(&self, lowered: &str) -> Option<IntentMatch> {
        for rule in &self.rules {
            for regex in &rule.regexes {
                if let Some(found) = regex.captures(lowered) {
                    let mut captures = IndexMap::new();
                    for name in regex.capture_names().flatten() {
                        if let Some(value) = found.name(name) {
                            captures.insert(name.to_string(), value.as_str().trim().to_string());
                        }
                    }
                    let args = if rule.templated {
                        instantiate_args(&rule.args, &captures)
                    } else {
                        let mut args = rule.args.clone();
                        for (name, value) in captures {
                            args.insert(name, type_capture(&value));
                        }
                        args
                    };
                    return Some(IntentMatch {
                        tool_name: Some(rule.tool_name.clone()),
                        args,
                        confidence: 0.95,
                        reason: MatchReason::Pattern,
                    });
                }
            }
        }
        None
    }

    /// Token-overlap scoring: `|tokens ∩ keywords| / |keywords|`, gated at
    /// 0.60, confidence `min(0.85, score + 0.20)`.
    fn keyword_phase(&self, tokens: &[String]) -> Option<IntentMatch> {
        let mut best: Option<(&CompiledRule, f64)> = None;
        for rule in &self.rules {
            if rule.keywords.is_empty() {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let score = rule
                .keywords
                .iter()
                .filter(|k| tokens.iter().any(|t| t == *k))
                .count() as f64
                / rule.keywords.len() as f64;
            if score > KEYWORD_GATE && best.map_or(true, |(_, s)| score > s) {
                best = Some((rule, score));
            }
        }
        best.map(|(rule, score)| IntentMatch {
            tool_name: Some(rule.tool_name.clone()),
            args: if rule.templated {
                instantiate_args(&rule.args, &IndexMap::new())
            } else {
                rule.args.clone()
            },
            confidence: (score + 0.20).min(CONFIDENCE_HIGH),
            reason: MatchReason::Keyword,
        })
    }

    /// Edit-distance similarity against canonical phrasings, gated at 0.75;
    /// confidence stays below the fast-path threshold.
    fn fuzzy_phase(&self, lowered: &str) -> Option<IntentMatch> {
        let mut best: Option<(&CompiledRule, f64)> = None;
        for rule in &self.rules {
            for phrase in &rule.canonical {
                let score = similarity(lowered, phrase);
                if score > FUZZY_GATE && best.map_or(true, |(_, s)| score > s) {
                    best = Some((rule, score));
                }
            }
        }
        best.map(|(rule, score)| IntentMatch {
            tool_name: Some(rule.tool_name.clone()),
            args: rule.args.clone(),
            confidence: score.min(FUZZY_CEILING),
            reason: MatchReason::Fuzzy,
        })
    }

    /// Number of compiled rules (builtin plus promoted).
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn compile_all(rule: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("compiling pattern for rule '{rule}'")))
        .collect()
}

fn tokenize(lowered: &str) -> Vec<String> {
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn type_capture(raw: &str) -> Value {
    raw.parse::<i64>()
        .map_or_else(|_| Value::String(raw.to_string()), Value::from)
}

fn is_conversational(lowered: &str, tokens: &[String]) -> bool {
    if tokens.iter().any(|t| MARKER_TOKENS.contains(&t.as_str())) {
        return true;
    }
    MARKER_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilitySource, Trigger};
    use crate::rules::builtin_rules;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Instant;

    fn router() -> IntentRouter {
        IntentRouter::new(&builtin_rules(), &[]).unwrap()
    }

    #[test]
    fn set_volume_pattern_extracts_level() {
        let m = router().classify("Set volume to 50");
        assert_eq!(m.tool_name.as_deref(), Some("set_volume"));
        assert_eq!(m.args["level"], json!(50));
        assert!((m.confidence - 0.95).abs() < f64::EPSILON);
        assert_eq!(m.reason, MatchReason::Pattern);
    }

    #[test]
    fn bare_mute_is_a_pattern_match() {
        let m = router().classify("Mute");
        assert_eq!(m.tool_name.as_deref(), Some("mute"));
        assert_eq!(m.reason, MatchReason::Pattern);
    }

    #[test]
    fn conversational_markers_win_without_patterns() {
        let m = router().classify("What's the meaning of life?");
        assert!(m.is_conversation());
        assert!((m.confidence - 0.95).abs() < f64::EPSILON);
        assert!(m.tool_name.is_none());
    }

    #[test]
    fn imperative_pattern_beats_marker() {
        // "what's the time" carries a marker but matches a pattern.
        let m = router().classify("what's the time");
        assert_eq!(m.tool_name.as_deref(), Some("current_time"));
        assert_eq!(m.reason, MatchReason::Pattern);
    }

    #[test]
    fn keyword_phase_caps_at_fast_path_threshold() {
        let m = router().classify("volume level please");
        assert_eq!(m.tool_name.as_deref(), Some("set_volume"));
        assert_eq!(m.reason, MatchReason::Keyword);
        assert!((m.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn fuzzy_phase_stays_below_fast_path() {
        let m = router().classify("make it loudr");
        assert_eq!(m.tool_name.as_deref(), Some("adjust_volume"));
        assert_eq!(m.reason, MatchReason::Fuzzy);
        assert!(m.confidence >= CONFIDENCE_LOW && m.confidence <= 0.84);
        assert_eq!(m.args["delta"], json!(10));
    }

    #[test]
    fn original_command_surface_routes_locally() {
        let r = router();
        for (utterance, tool) in [
            ("pause", "media_play_pause"),
            ("next track", "media_next"),
            ("previous song", "media_previous"),
            ("open the file explorer", "open_file_explorer"),
            ("empty the recycle bin", "empty_recycle_bin"),
            ("restart the computer", "restart_computer"),
        ] {
            let m = r.classify(utterance);
            assert_eq!(m.tool_name.as_deref(), Some(tool), "utterance: {utterance}");
            assert_eq!(m.reason, MatchReason::Pattern, "utterance: {utterance}");
        }
    }

    #[test]
    fn note_and_command_patterns_capture_arguments() {
        let r = router();
        let m = r.classify("take a note buy milk");
        assert_eq!(m.tool_name.as_deref(), Some("take_note"));
        assert_eq!(m.args["content"], json!("buy milk"));

        let m = r.classify("run the command ls -la");
        assert_eq!(m.tool_name.as_deref(), Some("run_terminal_command"));
        assert_eq!(m.args["command"], json!("ls -la"));
    }

    #[test]
    fn unmatched_utterances_are_unknown() {
        let m = router().classify("calculate the square root of 5293");
        assert_eq!(m, IntentMatch::unknown());
    }

    #[test]
    fn classification_is_deterministic() {
        let r = router();
        for utterance in ["Set volume to 50", "mute", "open notepad", "gibberish xyz"] {
            assert_eq!(r.classify(utterance), r.classify(utterance));
        }
    }

    #[test]
    fn promoted_capabilities_compile_after_builtins() {
        let mut template = ArgMap::new();
        template.insert("source".into(), json!("import math\nprint(math.sqrt(int('{n}')))"));
        template.insert("n".into(), json!("{n}"));
        let capability = Capability {
            name: "square_root".into(),
            triggers: vec![Trigger {
                pattern: Some(r"square\s+root\s+of\s+(?P<n>\d+)".into()),
                keywords: Vec::new(),
            }],
            tool_name: "run_program".into(),
            args_template: template,
            source: CapabilitySource::Promoted,
            created_at: Utc::now(),
        };
        let router = IntentRouter::new(&builtin_rules(), &[capability]).unwrap();
        let m = router.classify("calculate the square root of 5293");
        assert_eq!(m.tool_name.as_deref(), Some("run_program"));
        assert_eq!(m.args["n"], json!(5293));
        // Builtins keep precedence.
        let m = router.classify("Set volume to 50");
        assert_eq!(m.tool_name.as_deref(), Some("set_volume"));
    }

    #[test]
    fn classification_latency_is_bounded() {
        let r = router();
        let utterances = [
            "Set volume to 50",
            "open spotify",
            "completely unrelated gibberish with many words in it",
            "what's the weather like in paris today",
        ];
        let started = Instant::now();
        let iterations = 200u32;
        for _ in 0..iterations {
            for utterance in &utterances {
                let _ = r.classify(utterance);
            }
        }
        let per_call = started.elapsed() / (iterations * u32::try_from(utterances.len()).unwrap());
        assert!(
            per_call.as_millis() < 15,
            "classification took {per_call:?} per call"
        );
    }
}
