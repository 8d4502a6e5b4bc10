use std::time::Duration;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Resource and surface limits for one sandboxed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Wall-clock deadline.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Address-space cap in bytes (enforced via rlimits on unix).
    pub max_memory_bytes: u64,
    /// Captured output is truncated past this size.
    pub max_output_bytes: usize,
    /// Modules the program may import.
    pub allowed_imports: IndexSet<String>,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_memory_bytes: 256 * 1024 * 1024,
            max_output_bytes: 64 * 1024,
            allowed_imports: [
                "math",
                "json",
                "datetime",
                "random",
                "re",
                "statistics",
                "itertools",
                "functools",
                "collections",
                "string",
                "textwrap",
                "decimal",
                "fractions",
            ]
            .into_iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

mod duration_ms {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(value.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_math_but_not_os() {
        let limits = SandboxLimits::default();
        assert!(limits.allowed_imports.contains("math"));
        assert!(!limits.allowed_imports.contains("os"));
        assert_eq!(limits.timeout, Duration::from_secs(10));
    }
}
