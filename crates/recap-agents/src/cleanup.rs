use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("think block regex"));
static THINK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?think>").expect("think tag regex"));
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").expect("blank run regex"));

/// Remove `<think>` reasoning blocks and stray tags some models emit, then
/// collapse the blank lines they leave behind.
pub fn strip_think_tags(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let without_blocks = THINK_BLOCK.replace_all(content, "");
    let without_tags = THINK_TAG.replace_all(&without_blocks, "");
    BLANK_RUN
        .replace_all(&without_tags, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_complete_block() {
        let input = "Intro.\n\n<think>\nlots of\nreasoning\n</think>\n\nAnswer.";
        assert_eq!(strip_think_tags(input), "Intro.\n\nAnswer.");
    }

    #[test]
    fn removes_unpaired_tags() {
        assert_eq!(strip_think_tags("reasoning</think>Answer"), "reasoningAnswer");
        assert_eq!(strip_think_tags("<think>Answer"), "Answer");
    }

    #[test]
    fn removes_multiple_blocks_lazily() {
        let input = "<think>a</think>keep<think>b</think> me";
        assert_eq!(strip_think_tags(input), "keep me");
    }

    #[test]
    fn plain_text_is_only_trimmed() {
        assert_eq!(strip_think_tags("  ## Summary\n- item  "), "## Summary\n- item");
        assert_eq!(strip_think_tags(""), "");
    }
}
