use recap_common::{StatusKind, StatusRecord};

use crate::description::display_title;

/// Pseudo model id reported when the local summarizer produced the text.
pub const LOCAL_FALLBACK_MODEL: &str = "local-fallback";

const FOOTNOTE: &str = "*Note: this summary was generated locally because the AI service is unavailable.*";

/// Offline summary used once every upstream attempt has failed.
///
/// Output depends only on the records, never on the clock or the network, so
/// the same input always yields the same text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFallbackSummarizer;

impl LocalFallbackSummarizer {
    pub fn summarize(&self, records: &[StatusRecord]) -> String {
        let ongoing: Vec<&StatusRecord> = of_kind(records, StatusKind::Ongoing);
        let planned: Vec<&StatusRecord> = of_kind(records, StatusKind::Planned);
        let completed: Vec<&StatusRecord> = of_kind(records, StatusKind::Completed);

        let mut out = String::from("## Work status summary\n\n");

        if !ongoing.is_empty() {
            out.push_str("### Current progress\n");
            for record in &ongoing {
                let state = if record.completed { "done" } else { "in progress, stay focused" };
                out.push_str(&format!("- Working on: {} ({state})\n", display_title(record)));
            }
            out.push('\n');
        }

        if !planned.is_empty() {
            out.push_str("### Plan\n");
            for record in &planned {
                out.push_str(&format!("- Planned: {}\n", display_title(record)));
            }
            out.push_str("- Suggestion: break the plan into concrete steps with dates\n\n");
        }

        if !completed.is_empty() {
            out.push_str("### Completed\n");
            for record in &completed {
                out.push_str(&format!("- Done: {}\n", display_title(record)));
            }
            out.push('\n');
        }

        out.push_str("### Suggestions\n");
        let advice: [&str; 2] = match (ongoing.is_empty(), planned.is_empty()) {
            (false, false) => [
                "Finish the current work before starting on the plan",
                "Keep the work continuous and systematic",
            ],
            (false, true) => [
                "Focus on the current work until it is fully understood",
                "Start sketching what comes next",
            ],
            (true, false) => [
                "Get ready to start the planned work",
                "Cover the fundamentals before going deep",
            ],
            (true, true) => [
                "Set a clear, concrete goal for the next stretch of work",
                "Start from the fundamentals and build up gradually",
            ],
        };
        for line in advice {
            out.push_str("- ");
            out.push_str(line);
            out.push('\n');
        }

        out.push('\n');
        out.push_str(FOOTNOTE);
        out.push('\n');
        out
    }
}

fn of_kind(records: &[StatusRecord], kind: StatusKind) -> Vec<&StatusRecord> {
    records.iter().filter(|r| r.kind == kind).collect()
}
