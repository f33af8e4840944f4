//! Fenced code-block extraction from model output.

use regex::Regex;
use std::sync::LazyLock;

/// Matches a fenced block: optional language tag, body up to the closing fence.
static FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[^\n]*\n(.*?)```") {
        Ok(regex) => regex,
        Err(err) => panic!("Fence regex is invalid: {err}"),
    }
});

/// A fenced block found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Lower-cased language tag, `None` when the fence is untagged
    pub language: Option<String>,
    /// Block body without the fences
    pub code: String,
}

impl CodeBlock {
    /// Python or untagged blocks are submitted to the executor.
    pub fn is_executable(&self) -> bool {
        matches!(
            self.language.as_deref(),
            None | Some("python" | "py" | "python3")
        )
    }

    /// Blocks tagged `json`.
    pub fn is_json(&self) -> bool {
        self.language.as_deref() == Some("json")
    }
}

/// All fenced blocks in order of appearance.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    FENCE_REGEX
        .captures_iter(text)
        .filter_map(|caps| {
            let language = caps
                .get(1)
                .map(|tag| tag.as_str().to_ascii_lowercase())
                .filter(|tag| !tag.is_empty());
            let code = caps.get(2)?.as_str().trim_end().to_owned();
            (!code.trim().is_empty()).then_some(CodeBlock { language, code })
        })
        .collect()
}

/// Blocks that should be run by the executor, in order.
pub fn executable_blocks(text: &str) -> Vec<String> {
    extract_code_blocks(text)
        .into_iter()
        .filter(CodeBlock::is_executable)
        .map(|block| block.code)
        .collect()
}
