use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use aura_osgate::HostCapability;

use crate::error::ErrorKind;

/// Ordered argument map passed to handlers.
pub type ArgMap = IndexMap<String, Value>;

/// Risk classification controlling confirmation requirements.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    /// Freely executable.
    Low,
    /// Executable, surfaced prominently in traces.
    Medium,
    /// Executable, but never promoted into capabilities.
    High,
    /// Requires an explicit confirmation flag in the policy.
    Confirm,
}

/// Primitive argument types accepted by tool schemas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    /// UTF-8 text.
    String,
    /// Signed integer.
    Integer,
    /// Floating point number.
    Float,
    /// Boolean flag.
    Boolean,
}

/// Value constraint applied after type coercion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ArgConstraint {
    /// Inclusive numeric range.
    Range {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Closed set of permitted strings.
    OneOf(Vec<String>),
    /// Regex the full string value must match.
    Matches(String),
}

/// Schema for one named argument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgSpec {
    /// Expected primitive type.
    pub arg_type: ArgType,
    /// Whether the argument must be provided (or defaulted).
    pub required: bool,
    /// Default applied when the caller omits the argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Optional value constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<ArgConstraint>,
}

impl ArgSpec {
    /// Starts an optional argument of the given type.
    #[must_use]
    pub const fn of(arg_type: ArgType) -> Self {
        Self {
            arg_type,
            required: false,
            default: None,
            constraint: None,
        }
    }

    /// Starts an optional string argument.
    #[must_use]
    pub const fn string() -> Self {
        Self::of(ArgType::String)
    }

    /// Starts an optional integer argument.
    #[must_use]
    pub const fn integer() -> Self {
        Self::of(ArgType::Integer)
    }

    /// Starts an optional float argument.
    #[must_use]
    pub const fn float() -> Self {
        Self::of(ArgType::Float)
    }

    /// Starts an optional boolean argument.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::of(ArgType::Boolean)
    }

    /// Marks the argument required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Supplies a default value.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Restricts numeric values to an inclusive range.
    #[must_use]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.constraint = Some(ArgConstraint::Range { min, max });
        self
    }

    /// Restricts string values to a closed set.
    #[must_use]
    pub fn one_of(mut self, options: &[&str]) -> Self {
        self.constraint = Some(ArgConstraint::OneOf(
            options.iter().map(|s| (*s).to_string()).collect(),
        ));
        self
    }

    /// Restricts string values to a regex.
    #[must_use]
    pub fn matches(mut self, pattern: impl Into<String>) -> Self {
        self.constraint = Some(ArgConstraint::Matches(pattern.into()));
        self
    }
}

/// Declarative description of one invokable tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    /// Globally unique tool name.
    pub name: String,
    /// One-line description surfaced to the planner prompt.
    pub description: String,
    /// Argument schema in declared order.
    pub args: IndexMap<String, ArgSpec>,
    /// Risk classification.
    pub risk: Risk,
    /// Host capabilities the handler needs.
    pub requires: IndexSet<HostCapability>,
    /// Identifier resolved to a handler at registration.
    pub handler_id: String,
    /// Optional cross-platform fallback handler identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_handler_id: Option<String>,
    /// Per-tool timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ToolSpec {
    /// Starts a builder for a low-risk tool handled by `handler_id`.
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        description: impl Into<String>,
        handler_id: impl Into<String>,
    ) -> ToolSpecBuilder {
        ToolSpecBuilder {
            spec: Self {
                name: name.into(),
                description: description.into(),
                args: IndexMap::new(),
                risk: Risk::Low,
                requires: IndexSet::new(),
                handler_id: handler_id.into(),
                fallback_handler_id: None,
                timeout_ms: None,
            },
        }
    }

    /// Coerces and validates caller arguments against this schema.
    ///
    /// Applies defaults, converts strings to numbers and booleans, and
    /// enforces constraints. Returns [`ErrorKind::BadArgs`] before any
    /// handler could run.
    pub fn coerce_args(&self, provided: &ArgMap) -> Result<ArgMap, ErrorKind> {
        for key in provided.keys() {
            if !self.args.contains_key(key) {
                return Err(ErrorKind::BadArgs(format!(
                    "{}: unexpected argument '{key}'",
                    self.name
                )));
            }
        }
        let mut coerced = ArgMap::new();
        for (name, schema) in &self.args {
            let raw = provided.get(name).cloned().or_else(|| schema.default.clone());
            match raw {
                Some(value) => {
                    let value = coerce_value(&self.name, name, schema.arg_type, value)?;
                    check_constraint(&self.name, name, schema.constraint.as_ref(), &value)?;
                    coerced.insert(name.clone(), value);
                }
                None if schema.required => {
                    return Err(ErrorKind::BadArgs(format!(
                        "{}: missing required argument '{name}'",
                        self.name
                    )));
                }
                None => {}
            }
        }
        Ok(coerced)
    }
}

/// Fluent builder for [`ToolSpec`].
#[derive(Debug)]
pub struct ToolSpecBuilder {
    spec: ToolSpec,
}

impl ToolSpecBuilder {
    /// Declares an argument.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, schema: ArgSpec) -> Self {
        self.spec.args.insert(name.into(), schema);
        self
    }

    /// Sets the risk level.
    #[must_use]
    pub fn risk(mut self, risk: Risk) -> Self {
        self.spec.risk = risk;
        self
    }

    /// Adds a required host capability.
    #[must_use]
    pub fn requires(mut self, capability: HostCapability) -> Self {
        self.spec.requires.insert(capability);
        self
    }

    /// Names a cross-platform fallback handler.
    #[must_use]
    pub fn fallback(mut self, handler_id: impl Into<String>) -> Self {
        self.spec.fallback_handler_id = Some(handler_id.into());
        self
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub const fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.spec.timeout_ms = Some(timeout_ms);
        self
    }

    /// Finalizes the spec.
    #[must_use]
    pub fn build(self) -> ToolSpec {
        self.spec
    }
}

fn coerce_value(tool: &str, arg: &str, expected: ArgType, value: Value) -> Result<Value, ErrorKind> {
    let bad = |detail: &str| ErrorKind::BadArgs(format!("{tool}: argument '{arg}' {detail}"));
    match expected {
        ArgType::Integer => match value {
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    Ok(Value::Number(n))
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| Value::from(f as i64))
                        .ok_or_else(|| bad("is not an integer"))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| bad("is not an integer")),
            _ => Err(bad("is not an integer")),
        },
        ArgType::Float => match value {
            Value::Number(_) => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| bad("is not a number")),
            _ => Err(bad("is not a number")),
        },
        ArgType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(bad("is not a boolean")),
            },
            _ => Err(bad("is not a boolean")),
        },
        ArgType::String => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(bad("is not a string")),
        },
    }
}

fn check_constraint(
    tool: &str,
    arg: &str,
    constraint: Option<&ArgConstraint>,
    value: &Value,
) -> Result<(), ErrorKind> {
    let bad = |detail: String| ErrorKind::BadArgs(format!("{tool}: argument '{arg}' {detail}"));
    match constraint {
        None => Ok(()),
        Some(ArgConstraint::Range { min, max }) => {
            let n = value
                .as_f64()
                .ok_or_else(|| bad("is not numeric".to_string()))?;
            if n < *min || n > *max {
                Err(bad(format!("must be between {min} and {max}")))
            } else {
                Ok(())
            }
        }
        Some(ArgConstraint::OneOf(options)) => {
            let s = value
                .as_str()
                .ok_or_else(|| bad("is not a string".to_string()))?;
            if options.iter().any(|o| o == s) {
                Ok(())
            } else {
                Err(bad(format!("must be one of {options:?}")))
            }
        }
        Some(ArgConstraint::Matches(pattern)) => {
            let s = value
                .as_str()
                .ok_or_else(|| bad("is not a string".to_string()))?;
            let re = Regex::new(pattern)
                .map_err(|err| ErrorKind::Internal(format!("bad constraint regex: {err}")))?;
            if re.is_match(s) {
                Ok(())
            } else {
                Err(bad(format!("does not match {pattern}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn volume_spec() -> ToolSpec {
        ToolSpec::builder("set_volume", "Set master volume", "audio.set_volume")
            .arg("level", ArgSpec::integer().required().range(0.0, 100.0))
            .requires(HostCapability::Audio)
            .build()
    }

    #[test]
    fn coerces_string_numbers() {
        let spec = volume_spec();
        let mut args = ArgMap::new();
        args.insert("level".into(), json!("50"));
        let coerced = spec.coerce_args(&args).unwrap();
        assert_eq!(coerced["level"], json!(50));
    }

    #[test]
    fn rejects_out_of_range() {
        let spec = volume_spec();
        let mut args = ArgMap::new();
        args.insert("level".into(), json!(250));
        let err = spec.coerce_args(&args).unwrap_err();
        assert!(matches!(err, ErrorKind::BadArgs(_)));
    }

    #[test]
    fn rejects_missing_required() {
        let spec = volume_spec();
        let err = spec.coerce_args(&ArgMap::new()).unwrap_err();
        assert!(matches!(err, ErrorKind::BadArgs(_)));
    }

    #[test]
    fn rejects_unexpected_argument() {
        let spec = volume_spec();
        let mut args = ArgMap::new();
        args.insert("level".into(), json!(10));
        args.insert("channel".into(), json!("left"));
        assert!(spec.coerce_args(&args).is_err());
    }

    #[test]
    fn applies_defaults() {
        let spec = ToolSpec::builder("adjust_volume", "Adjust volume", "audio.adjust_volume")
            .arg(
                "delta",
                ArgSpec::integer().default_value(json!(10)).range(-100.0, 100.0),
            )
            .build();
        let coerced = spec.coerce_args(&ArgMap::new()).unwrap();
        assert_eq!(coerced["delta"], json!(10));
    }

    #[test]
    fn enum_constraint_enforced() {
        let spec = ToolSpec::builder("media_control", "Media transport", "media.control")
            .arg(
                "action",
                ArgSpec::string()
                    .required()
                    .one_of(&["play_pause", "next", "previous"]),
            )
            .build();
        let mut args = ArgMap::new();
        args.insert("action".into(), json!("rewind"));
        assert!(spec.coerce_args(&args).is_err());
    }
}
