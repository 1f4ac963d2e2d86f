use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which section of the status description a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    #[default]
    Ongoing,
    Planned,
    Completed,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Ongoing => "ongoing",
            StatusKind::Planned => "planned",
            StatusKind::Completed => "completed",
        }
    }

    /// Parse a stored kind, treating unknown values as ongoing work.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "planned" => StatusKind::Planned,
            "completed" => StatusKind::Completed,
            _ => StatusKind::Ongoing,
        }
    }
}

/// A single piece of tracked work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: StatusKind,
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "aiProcessed", default)]
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        kind: StatusKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            kind,
            completed: false,
            processed: false,
            created_at: now,
            updated_at: now,
        }
    }
}
