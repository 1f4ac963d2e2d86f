pub mod error;
pub mod message;
pub mod record;
pub mod redaction;
pub mod summary;

pub use error::{Error, Result};
pub use message::{ChatRole, HistoryEntry};
pub use record::{StatusKind, StatusRecord};
pub use redaction::{RedactingWriter, redact_secrets};
pub use summary::{SEPARATOR_TIME_FORMAT, SummaryDocument, separator};
