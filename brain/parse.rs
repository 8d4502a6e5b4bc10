//! Extraction helpers for model output that wraps JSON or code in prose.

/// Returns the outermost `{ ... }` slice, if any.
#[must_use]
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

/// Returns the outermost `[ ... ]` slice, if any.
#[must_use]
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end >= start).then(|| &text[start..=end])
}

/// Strips a fenced code block, returning its body; otherwise the whole text.
#[must_use]
pub fn extract_code(text: &str) -> String {
    let trimmed = text.trim();
    let Some(fence_start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_fence = &trimmed[fence_start + 3..];
    // Skip a language tag on the fence line.
    let body_start = after_fence.find('\n').map_or(0, |idx| idx + 1);
    let body = &after_fence[body_start..];
    let body_end = body.find("```").unwrap_or(body.len());
    body[..body_end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_embedded_object() {
        let text = "Sure, here's the plan:\n{\"tool\": \"mute\"}\nDone.";
        assert_eq!(extract_json_block(text), Some("{\"tool\": \"mute\"}"));
    }

    #[test]
    fn finds_embedded_array() {
        let text = "steps: [1, 2, 3] trailing";
        assert_eq!(extract_json_array(text), Some("[1, 2, 3]"));
    }

    #[test]
    fn strips_python_fence() {
        let text = "Here you go:\n```python\nimport math\nprint(math.pi)\n```";
        assert_eq!(extract_code(text), "import math\nprint(math.pi)");
    }

    #[test]
    fn plain_code_passes_through() {
        assert_eq!(extract_code("print(1)\n"), "print(1)");
    }
}
