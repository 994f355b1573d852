pub mod batch;
pub mod engine;
pub mod entry;
pub mod report;

pub use batch::ChecksumBatch;
pub use engine::{SyncConfig, SyncEngine, SyncOptions};
pub use entry::{EntryOutcome, SkipReason};
pub use report::{format_size, SyncReport};
