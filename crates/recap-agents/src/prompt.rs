use std::path::Path;

use chrono::{DateTime, Local};
use recap_common::{Error, Result, SummaryDocument};
use tracing::info;

pub const SYSTEM_PROMPT_FILE: &str = "system_prompt.md";
pub const USER_TEMPLATE_FILE: &str = "user_message_template.md";

const BUILTIN_SYSTEM_PROMPT: &str = include_str!("../prompts/system_prompt.md");
const BUILTIN_USER_TEMPLATE: &str = include_str!("../prompts/user_message_template.md");

/// Joins the system prompt and the rendered user message.
pub const PROMPT_SEPARATOR: &str = "\n\n";

/// Format used for `{date}`.
pub const PROMPT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    StatusDescription,
    CurrentSummary,
    Date,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "status_description" => Some(Self::StatusDescription),
            "cur_summary" => Some(Self::CurrentSummary),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A user-message template parsed once up front.
///
/// Supported placeholders are `{status_description}`, `{cur_summary}` and
/// `{date}`. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(Error::Template(format!(
                            "unclosed '{{' at byte {pos}"
                        )));
                    }
                    let slot = Placeholder::from_name(&name).ok_or_else(|| {
                        Error::Template(format!("unknown placeholder {{{name}}}"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(slot));
                }
                '}' => {
                    return Err(Error::Template(format!(
                        "single '}}' at byte {pos}; use '}}}}' for a literal brace"
                    )));
                }
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, description: &str, current_summary: &str, date: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(Placeholder::StatusDescription) => out.push_str(description),
                Segment::Slot(Placeholder::CurrentSummary) => out.push_str(current_summary),
                Segment::Slot(Placeholder::Date) => out.push_str(date),
            }
        }
        out
    }
}

/// Builds the single prompt sent upstream.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    system_prompt: String,
    template: PromptTemplate,
}

impl PromptComposer {
    pub fn new(system_prompt: impl Into<String>, template: &str) -> Result<Self> {
        Ok(Self {
            system_prompt: system_prompt.into(),
            template: PromptTemplate::parse(template)?,
        })
    }

    /// Prompts compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::new(BUILTIN_SYSTEM_PROMPT.trim(), BUILTIN_USER_TEMPLATE.trim())
    }

    /// Load prompts from `dir`, or fall back to the built-in ones when no
    /// directory is configured. Both files must exist in `dir`.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let Some(dir) = dir else {
            return Self::builtin();
        };
        let system_prompt = read_prompt(&dir.join(SYSTEM_PROMPT_FILE))?;
        let template = read_prompt(&dir.join(USER_TEMPLATE_FILE))?;
        let composer = Self::new(system_prompt, &template)?;
        info!("loaded prompts from {}", dir.display());
        Ok(composer)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn render_user_message(
        &self,
        description: &str,
        summary: &SummaryDocument,
        now: DateTime<Local>,
    ) -> String {
        let date = now.format(PROMPT_DATE_FORMAT).to_string();
        self.template.render(description, &summary.text, &date)
    }

    /// `system prompt + separator + rendered user message`.
    pub fn compose(&self, user_message: &str) -> String {
        format!("{}{PROMPT_SEPARATOR}{user_message}", self.system_prompt)
    }
}

fn read_prompt(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|content| content.trim().to_string())
        .map_err(|e| Error::Template(format!("cannot read {}: {e}", path.display())))
}
