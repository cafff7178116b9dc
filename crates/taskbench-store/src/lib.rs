pub mod json;
pub mod snapshots;

pub use json::{scope_name, JsonLedgerStore, JsonResultStore, LEDGER_FILE};
pub use snapshots::{analysis_path_for, list_snapshots, load_snapshot, write_json, SnapshotEntry};
