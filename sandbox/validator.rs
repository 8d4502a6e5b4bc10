use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed failure modes of a sandboxed run.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SandboxFailure {
    /// The program did not parse.
    #[error("parse error: {0}")]
    Parse(String),
    /// The program raised at runtime.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// The wall-clock deadline elapsed.
    #[error("timed out after {0} ms")]
    Timeout(u64),
    /// The address-space cap was exceeded.
    #[error("memory limit exceeded")]
    MemoryExceeded,
    /// The program imported outside the allowlist; it never ran.
    #[error("forbidden import: {0}")]
    ForbiddenImport(String),
    /// The sandbox itself failed to launch the program.
    #[error("sandbox io: {0}")]
    Io(String),
}

/// Scans source for imports outside the allowlist.
///
/// Runs before the interpreter is spawned, so a rejected program has no
/// partial side effects.
pub fn check_imports(source: &str, allowed: &IndexSet<String>) -> Result<(), SandboxFailure> {
    // Both `import x` and `from x import y`, including `import x as z`.
    let import_line =
        Regex::new(r"(?m)^\s*(?:import|from)\s+([A-Za-z_][A-Za-z0-9_.]*)").expect("static regex");
    for captures in import_line.captures_iter(source) {
        let module = captures[1].split('.').next().unwrap_or("");
        if !allowed.contains(module) {
            return Err(SandboxFailure::ForbiddenImport(module.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::SandboxLimits;

    #[test]
    fn allows_listed_modules() {
        let limits = SandboxLimits::default();
        let source = "import math\nfrom json import dumps\nprint(math.pi)\n";
        assert!(check_imports(source, &limits.allowed_imports).is_ok());
    }

    #[test]
    fn rejects_os_import() {
        let limits = SandboxLimits::default();
        let err = check_imports("import os\nos.remove('x')\n", &limits.allowed_imports).unwrap_err();
        assert_eq!(err, SandboxFailure::ForbiddenImport("os".into()));
    }

    #[test]
    fn rejects_dotted_submodule_of_forbidden_root() {
        let limits = SandboxLimits::default();
        let err =
            check_imports("from subprocess.popen import x\n", &limits.allowed_imports).unwrap_err();
        assert_eq!(err, SandboxFailure::ForbiddenImport("subprocess".into()));
    }

    #[test]
    fn indented_imports_are_caught() {
        let limits = SandboxLimits::default();
        let source = "def f():\n    import socket\n";
        assert!(check_imports(source, &limits.allowed_imports).is_err());
    }
}
