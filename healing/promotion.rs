use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use serde_json::json;

use aura_routing::{Capability, CapabilitySource, CapabilityStore, PromotionOutcome, Trigger};
use aura_tools::spec::ArgMap;

/// Promotes successful Layer 1.5 programs into router capabilities.
///
/// Promotion is the only path that mutates the capability store at runtime.
/// Integer literals in the utterance become named captures, and the same
/// literals in the program body become placeholders, so one successful run
/// generalizes to the whole family of utterances.
pub struct SkillPromoter {
    store: Arc<CapabilityStore>,
}

/// A generalized trigger derived from one concrete utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralizedSkill {
    /// Capability name slug.
    pub name: String,
    /// Trigger pattern with named captures.
    pub pattern: String,
    /// Program source with `{capture}` placeholders.
    pub source: String,
}

impl SkillPromoter {
    /// Builds a promoter over the store.
    #[must_use]
    pub fn new(store: Arc<CapabilityStore>) -> Self {
        Self { store }
    }

    /// Attempts to promote a successful program for an utterance.
    ///
    /// Returns `Ok(None)` when the utterance does not generalize.
    pub fn promote_program(
        &self,
        utterance: &str,
        program: &str,
    ) -> Result<Option<PromotionOutcome>> {
        let Some(skill) = generalize(utterance, program) else {
            return Ok(None);
        };
        let mut args_template = ArgMap::new();
        args_template.insert("source".into(), json!(skill.source));
        let capability = Capability {
            name: skill.name,
            triggers: vec![Trigger {
                pattern: Some(skill.pattern),
                keywords: Vec::new(),
            }],
            tool_name: "run_program".into(),
            args_template,
            source: CapabilitySource::Promoted,
            created_at: Utc::now(),
        };
        self.store.promote(capability).map(Some)
    }
}

/// Turns one concrete utterance and program into a generalized skill.
///
/// Utterances that are too short to be meaningful triggers do not
/// generalize.
#[must_use]
pub fn generalize(utterance: &str, program: &str) -> Option<GeneralizedSkill> {
    let lowered = utterance.trim().to_lowercase();
    if lowered.split_whitespace().count() < 2 {
        return None;
    }
    let number = Regex::new(r"\d+").expect("static regex");

    let mut pattern = String::from("^");
    let mut source = program.to_string();
    let mut last = 0;
    for (index, found) in number.find_iter(&lowered).enumerate() {
        let capture = format!("n{}", index + 1);
        pattern.push_str(&regex::escape(&lowered[last..found.start()]));
        pattern.push_str(&format!(r"(?P<{capture}>\d+)"));
        source = source.replace(found.as_str(), &format!("{{{capture}}}"));
        last = found.end();
    }
    pattern.push_str(&regex::escape(&lowered[last..]));
    pattern.push('$');

    Some(GeneralizedSkill {
        name: slug(&lowered),
        pattern,
        source,
    })
}

fn slug(lowered: &str) -> String {
    let mut slug: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    slug.truncate(48);
    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_routing::{rules::builtin_rules, IntentRouter};
    use serde_json::json;
    use tempfile::tempdir;

    const SQRT_UTTERANCE: &str = "calculate the square root of 5293";
    const SQRT_PROGRAM: &str = "import math\nprint(math.sqrt(5293))\n";

    fn promoter(dir: &std::path::Path) -> SkillPromoter {
        let store =
            CapabilityStore::load(dir.join("capabilities.json"), builtin_rules()).unwrap();
        SkillPromoter::new(Arc::new(store))
    }

    #[test]
    fn numbers_generalize_to_captures() {
        let skill = generalize(SQRT_UTTERANCE, SQRT_PROGRAM).unwrap();
        assert!(skill.pattern.contains(r"(?P<n1>\d+)"));
        assert!(skill.source.contains("math.sqrt({n1})"));
        assert_eq!(skill.name, "calculate_the_square_root_of_5293");
    }

    #[test]
    fn single_word_utterances_do_not_generalize() {
        assert!(generalize("mute", "print(1)").is_none());
    }

    #[test]
    fn promoted_skill_routes_future_utterances() {
        let dir = tempdir().unwrap();
        let promoter = promoter(dir.path());
        let outcome = promoter
            .promote_program(SQRT_UTTERANCE, SQRT_PROGRAM)
            .unwrap()
            .unwrap();
        let PromotionOutcome::Promoted(capability) = outcome else {
            panic!("expected promotion, got {outcome:?}");
        };

        let router = IntentRouter::new(&builtin_rules(), &[capability]).unwrap();
        let m = router.classify("calculate the square root of 81");
        assert_eq!(m.tool_name.as_deref(), Some("run_program"));
        assert_eq!(
            m.args["source"],
            json!("import math\nprint(math.sqrt(81))\n")
        );
    }

    #[test]
    fn repeated_promotion_grows_store_at_most_once() {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            CapabilityStore::load(dir.path().join("capabilities.json"), builtin_rules()).unwrap(),
        );
        let promoter = SkillPromoter::new(Arc::clone(&store));
        for _ in 0..3 {
            promoter
                .promote_program(SQRT_UTTERANCE, SQRT_PROGRAM)
                .unwrap();
        }
        assert_eq!(store.len(), 1);
    }
}
