//! Persistence seams. Implementations rewrite whole objects and assume a
//! single writer per output directory; concurrent runs against the same
//! directory would race on the ledger's read-modify-write.

use std::path::PathBuf;

use crate::error::BenchResult;
use crate::ledger::WrongAnswersCollection;
use crate::result::{Snapshot, SnapshotMetadata};

pub trait ResultStore {
    /// The last incremental snapshot for this scope, if one exists.
    fn load_checkpoint(&self) -> BenchResult<Option<Snapshot>>;

    /// Overwrite the fixed-name "latest" snapshot.
    fn save_incremental(&self, snapshot: &Snapshot) -> BenchResult<()>;

    /// Write a new timestamped snapshot and return its location. Never overwrites.
    fn save_final(&self, snapshot: &Snapshot) -> BenchResult<PathBuf>;
}

pub trait LedgerStore {
    /// The persisted ledger, or an empty one when none exists yet.
    fn load(&self) -> BenchResult<WrongAnswersCollection>;
    fn save(&self, ledger: &WrongAnswersCollection) -> BenchResult<()>;
}

/// Best-effort sink for run summaries (report documents, history files).
pub trait DocumentationSink {
    fn record_run(
        &self,
        command: &str,
        metadata: &SnapshotMetadata,
        provider_summary: &str,
        details_link: &str,
    ) -> BenchResult<()>;
}
