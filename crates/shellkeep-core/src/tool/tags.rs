//! Extraction of tagged sections from model output.
//!
//! Models answer with `<THINK>`, `<TOOL>`, `<RESULT>` and `<NOTE>` blocks.
//! Tags are matched case-insensitively and block bodies are trimmed.

use std::sync::LazyLock;

use regex::Regex;

static THINK_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("THINK"));
static TOOL_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("TOOL"));
static RESULT_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("RESULT"));
static NOTE_RE: LazyLock<Regex> = LazyLock::new(|| tag_regex("NOTE"));

fn tag_regex(tag: &str) -> Regex {
    Regex::new(&format!(r"(?is)<{tag}>\s*(.*?)\s*</{tag}>")).expect("static regex is valid")
}

/// Sections found in one model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSections {
    pub think: Option<String>,
    /// Shell commands, in order of appearance. Blank blocks are skipped.
    pub tools: Vec<String>,
    pub result: Option<String>,
    pub note: Option<String>,
}

fn first(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| caps[1].to_string())
}

/// Split a model reply into its tagged sections.
pub fn extract_sections(text: &str) -> ModelSections {
    ModelSections {
        think: first(&THINK_RE, text),
        tools: extract_tool_commands(text),
        result: first(&RESULT_RE, text),
        note: first(&NOTE_RE, text),
    }
}

/// Every non-blank `<TOOL>` body in `text`.
pub fn extract_tool_commands(text: &str) -> Vec<String> {
    TOOL_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .filter(|cmd| !cmd.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"<THINK>
rename then write
</THINK>
<TOOL>mv "/c/tmp/1.txt" "/c/tmp/test.py"</TOOL>
<tool>
echo "print('Hello')" > /c/tmp/test.py
</tool>
<NOTE>Renamed and wrote the file.</NOTE>"#;

    #[test]
    fn extracts_all_sections() {
        let sections = extract_sections(REPLY);
        assert_eq!(sections.think.as_deref(), Some("rename then write"));
        assert_eq!(
            sections.tools,
            vec![
                r#"mv "/c/tmp/1.txt" "/c/tmp/test.py""#.to_string(),
                r#"echo "print('Hello')" > /c/tmp/test.py"#.to_string(),
            ]
        );
        assert_eq!(sections.result, None);
        assert_eq!(sections.note.as_deref(), Some("Renamed and wrote the file."));
    }

    #[test]
    fn multiline_tool_body_kept_intact() {
        let cmds = extract_tool_commands("<TOOL>\ncd /tmp\nls -la\n</TOOL>");
        assert_eq!(cmds, vec!["cd /tmp\nls -la".to_string()]);
    }

    #[test]
    fn blank_and_unclosed_blocks_ignored() {
        assert!(extract_tool_commands("<TOOL>   </TOOL> <TOOL>echo x").is_empty());
        assert_eq!(extract_sections("plain text"), ModelSections::default());
    }
}
