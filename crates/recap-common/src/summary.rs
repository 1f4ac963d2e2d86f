use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used in the separator between appended summaries.
pub const SEPARATOR_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// The persisted, append-only summary log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDocument {
    #[serde(rename = "summary")]
    pub text: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl SummaryDocument {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Merge newly generated text into this document.
    ///
    /// A blank prior document is replaced wholesale. Otherwise the new text is
    /// appended after a separator carrying `now` in local time.
    pub fn appended(&self, generated: &str, now: DateTime<Local>) -> SummaryDocument {
        let text = if self.is_blank() {
            generated.to_string()
        } else {
            format!("{}{}{}", self.text, separator(now), generated)
        };

        SummaryDocument {
            text,
            last_updated: Some(now.with_timezone(&Utc)),
        }
    }
}

/// The block inserted between the prior summary and a new entry.
pub fn separator(now: DateTime<Local>) -> String {
    format!("\n\n---\n**{}**\n\n", now.format(SEPARATOR_TIME_FORMAT))
}
