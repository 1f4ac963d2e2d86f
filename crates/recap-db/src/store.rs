use chrono::{DateTime, Local};
use recap_common::{HistoryEntry, Result, StatusRecord, SummaryDocument};

/// Persistence boundary used by the summary pipeline.
///
/// Implementations must make [`SummaryStore::commit_generation`] atomic: the
/// summary write and the processed flips are visible together or not at all.
pub trait SummaryStore: Send + Sync {
    /// All status records in insertion order.
    fn list_records(&self) -> Result<Vec<StatusRecord>>;

    /// Flag the given records as processed and bump their `updated_at`.
    fn mark_processed(&self, ids: &[String]) -> Result<usize>;

    /// The current summary document (empty when none has been written).
    fn get_summary(&self) -> Result<SummaryDocument>;

    /// Replace the summary document wholesale.
    fn put_summary(&self, doc: &SummaryDocument) -> Result<()>;

    /// Append `generated` to the stored summary and mark `consumed` as
    /// processed in one transaction, returning the new document.
    fn commit_generation(
        &self,
        generated: &str,
        consumed: &[String],
        now: DateTime<Local>,
    ) -> Result<SummaryDocument>;

    /// The newest `limit` history entries, oldest first.
    fn load_history(&self, limit: usize) -> Result<Vec<HistoryEntry>>;

    /// Append `entries` and drop everything but the newest `capacity`.
    fn append_history(&self, entries: &[HistoryEntry], capacity: usize) -> Result<()>;

    fn clear_history(&self) -> Result<()>;
}
