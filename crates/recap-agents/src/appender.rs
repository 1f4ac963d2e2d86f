use std::sync::Arc;

use chrono::{DateTime, Local};
use recap_common::{Result, SummaryDocument};
use recap_db::SummaryStore;
use tracing::{info, warn};

/// Commits generated text to the summary log and retires the records that
/// fed it.
#[derive(Clone)]
pub struct SummaryAppender {
    store: Arc<dyn SummaryStore>,
}

impl SummaryAppender {
    pub fn new(store: Arc<dyn SummaryStore>) -> Self {
        Self { store }
    }

    /// The document `prior` becomes once `generated` is appended at `now`.
    pub fn apply(
        prior: &SummaryDocument,
        generated: &str,
        now: DateTime<Local>,
    ) -> SummaryDocument {
        prior.appended(generated, now)
    }

    /// Append `generated` and mark `consumed` processed in one store
    /// transaction. Nothing is visible if this returns an error.
    pub fn commit(
        &self,
        generated: &str,
        consumed: &[String],
        now: DateTime<Local>,
    ) -> Result<SummaryDocument> {
        match self.store.commit_generation(generated, consumed, now) {
            Ok(doc) => {
                info!(
                    appended_chars = generated.chars().count(),
                    records = consumed.len(),
                    "summary committed"
                );
                Ok(doc)
            }
            Err(e) => {
                warn!("summary commit rolled back: {e}");
                Err(e)
            }
        }
    }
}
