pub mod sqlite_store;
pub mod store;

pub use sqlite_store::SqliteStore;
pub use store::SummaryStore;
