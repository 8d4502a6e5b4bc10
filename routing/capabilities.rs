use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use aura_tools::spec::ArgMap;

use crate::rules::RouteRule;

/// Where a routing rule came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CapabilitySource {
    /// Compiled into the binary.
    Builtin,
    /// Promoted at runtime by the self-healing loop.
    Promoted,
}

/// One trigger of a promotable capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trigger {
    /// Regex with named captures, when pattern-triggered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Keyword tokens, when keyword-triggered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// A promotable routing rule that reaches a tool without the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capability {
    /// Unique capability name.
    pub name: String,
    /// Triggers evaluated by the router.
    pub triggers: Vec<Trigger>,
    /// Tool executed on a match.
    pub tool_name: String,
    /// Argument template; `{capture}` placeholders fill from the match.
    pub args_template: ArgMap,
    /// Provenance.
    pub source: CapabilitySource,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Substitutes `{name}` placeholders in a template with captured values.
///
/// A string value that is exactly one placeholder takes the capture's type
/// (digit-only captures become JSON numbers); placeholders embedded in a
/// longer string, such as promoted program source, substitute textually.
#[must_use]
pub fn instantiate_args(template: &ArgMap, captures: &IndexMap<String, String>) -> ArgMap {
    let mut args = ArgMap::new();
    for (key, value) in template {
        let resolved = match value.as_str() {
            Some(s) if s.starts_with('{') && s.ends_with('}') && !s[1..s.len() - 1].contains('{') => {
                let placeholder = &s[1..s.len() - 1];
                captures.get(placeholder).map_or(Value::Null, |captured| {
                    captured
                        .parse::<i64>()
                        .map_or_else(|_| Value::String(captured.clone()), Value::from)
                })
            }
            Some(s) => {
                let mut rendered = s.to_string();
                for (name, captured) in captures {
                    rendered = rendered.replace(&format!("{{{name}}}"), captured);
                }
                Value::String(rendered)
            }
            _ => value.clone(),
        };
        if !resolved.is_null() {
            args.insert(key.clone(), resolved);
        }
    }
    args
}

/// Audit record for a rejected or applied promotion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromotionAudit {
    /// Audit id.
    pub id: Uuid,
    /// Capability under consideration.
    pub capability_name: String,
    /// Human-readable reason.
    pub reason: String,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
}

/// Result of attempting a promotion.
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionOutcome {
    /// The capability entered the store and was persisted.
    Promoted(Capability),
    /// An identical capability was already present; store unchanged.
    AlreadyPresent,
    /// The capability conflicts with a builtin or existing rule.
    Rejected(PromotionAudit),
}

/// Persisted store of promoted capabilities.
///
/// Single writer (the self-healing loop); every reader works against a
/// snapshot taken at the start of an utterance. Loading fails loudly when a
/// persisted capability conflicts with a builtin rule.
pub struct CapabilityStore {
    path: PathBuf,
    inner: RwLock<IndexMap<String, Capability>>,
    audits: RwLock<Vec<PromotionAudit>>,
    builtin: Arc<Vec<RouteRule>>,
}

impl CapabilityStore {
    /// Loads the store from `path`, validating against the builtin rules.
    pub fn load(path: impl Into<PathBuf>, builtin: Vec<RouteRule>) -> Result<Self> {
        let path = path.into();
        let builtin = Arc::new(builtin);
        let mut inner = IndexMap::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading capability store {}", path.display()))?;
            let capabilities: Vec<Capability> =
                serde_json::from_str(&raw).context("parsing capability store")?;
            for capability in capabilities {
                if let Some(reason) = conflict_reason(&capability, &builtin) {
                    anyhow::bail!(
                        "capability '{}' conflicts with builtin routing: {reason}",
                        capability.name
                    );
                }
                inner.insert(capability.name.clone(), capability);
            }
        }
        Ok(Self {
            path,
            inner: RwLock::new(inner),
            audits: RwLock::new(Vec::new()),
            builtin,
        })
    }

    /// Attempts to promote a capability. Idempotent.
    pub fn promote(&self, capability: Capability) -> Result<PromotionOutcome> {
        if let Some(reason) = conflict_reason(&capability, &self.builtin) {
            return Ok(self.reject(&capability, reason));
        }
        {
            let inner = self.inner.read();
            if let Some(existing) = inner.get(&capability.name) {
                if existing.triggers == capability.triggers
                    && existing.args_template == capability.args_template
                    && existing.tool_name == capability.tool_name
                {
                    return Ok(PromotionOutcome::AlreadyPresent);
                }
                drop(inner);
                return Ok(self.reject(
                    &capability,
                    format!("name '{}' already promoted with different triggers", capability.name),
                ));
            }
        }
        self.inner
            .write()
            .insert(capability.name.clone(), capability.clone());
        self.persist()?;
        Ok(PromotionOutcome::Promoted(capability))
    }

    /// Snapshot of promoted capabilities in promotion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Capability> {
        self.inner.read().values().cloned().collect()
    }

    /// Number of promoted capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Audit records accumulated this process.
    #[must_use]
    pub fn audits(&self) -> Vec<PromotionAudit> {
        self.audits.read().clone()
    }

    /// Store file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reject(&self, capability: &Capability, reason: String) -> PromotionOutcome {
        let audit = PromotionAudit {
            id: Uuid::new_v4(),
            capability_name: capability.name.clone(),
            reason,
            created_at: Utc::now(),
        };
        self.audits.write().push(audit.clone());
        PromotionOutcome::Rejected(audit)
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let capabilities = self.snapshot();
        fs::write(&self.path, serde_json::to_string_pretty(&capabilities)?)
            .with_context(|| format!("writing capability store {}", self.path.display()))?;
        Ok(())
    }
}

/// Returns why a capability may not shadow builtin routing, if it would.
fn conflict_reason(capability: &Capability, builtin: &[RouteRule]) -> Option<String> {
    for trigger in &capability.triggers {
        for rule in builtin {
            if let Some(pattern) = &trigger.pattern {
                if rule.patterns.iter().any(|p| p == pattern) {
                    return Some(format!("pattern '{pattern}' shadows rule '{}'", rule.name));
                }
            }
            for keyword in &trigger.keywords {
                if rule.keywords.iter().any(|k| k == keyword) {
                    return Some(format!(
                        "keyword '{keyword}' shadows rule '{}'",
                        rule.name
                    ));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::builtin_rules;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_capability(name: &str) -> Capability {
        let mut template = ArgMap::new();
        template.insert("source".into(), json!("print(6 * 7)"));
        template.insert("n".into(), json!("{n}"));
        Capability {
            name: name.into(),
            triggers: vec![Trigger {
                pattern: Some(r"answer\s+to\s+(?P<n>\d+)".into()),
                keywords: Vec::new(),
            }],
            tool_name: "run_program".into(),
            args_template: template,
            source: CapabilitySource::Promoted,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn promotion_is_idempotent() {
        let dir = tempdir().unwrap();
        let store =
            CapabilityStore::load(dir.path().join("capabilities.json"), builtin_rules()).unwrap();
        let capability = sample_capability("answer");
        assert!(matches!(
            store.promote(capability.clone()).unwrap(),
            PromotionOutcome::Promoted(_)
        ));
        assert_eq!(
            store.promote(capability).unwrap(),
            PromotionOutcome::AlreadyPresent
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn builtin_shadowing_is_rejected_with_audit() {
        let dir = tempdir().unwrap();
        let store =
            CapabilityStore::load(dir.path().join("capabilities.json"), builtin_rules()).unwrap();
        let mut capability = sample_capability("shadow");
        capability.triggers = vec![Trigger {
            pattern: None,
            keywords: vec!["mute".into()],
        }];
        let outcome = store.promote(capability).unwrap();
        assert!(matches!(outcome, PromotionOutcome::Rejected(_)));
        assert_eq!(store.audits().len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn persisted_store_reloads_bit_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capabilities.json");
        let store = CapabilityStore::load(&path, builtin_rules()).unwrap();
        store.promote(sample_capability("answer")).unwrap();
        let first = fs::read(&path).unwrap();

        let reloaded = CapabilityStore::load(&path, builtin_rules()).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
        reloaded.promote(sample_capability("answer")).unwrap();
        let second = fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn template_instantiation_types_numbers() {
        let mut captures = IndexMap::new();
        captures.insert("n".to_string(), "5293".to_string());
        let args = instantiate_args(&sample_capability("answer").args_template, &captures);
        assert_eq!(args["n"], json!(5293));
        assert_eq!(args["source"], json!("print(6 * 7)"));
    }
}
